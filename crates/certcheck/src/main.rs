use certcheck::{CheckResult, Checker, CheckerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

/// Exit code for any check that ended in an error
const EXIT_ERROR: i32 = 3;
const EXIT_INTERRUPTED: i32 = 130;

/// Certcheck - OCSP revocation checker for PKCS#12 client certificates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "certcheck")]
struct Cli {
    /// PKCS#12 container to check, or "-" to read it from stdin
    #[arg(value_name = "CONTAINER", required_unless_present = "validate_config")]
    container: Option<String>,

    /// Container password (default: empty)
    #[arg(short, long, conflicts_with = "password_env")]
    password: Option<String>,

    /// Read the container password from this environment variable
    #[arg(long, value_name = "VAR")]
    password_env: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,

    /// Validate configuration and exit (doesn't run a check)
    #[arg(long)]
    validate_config: bool,
}

fn load_config(cli: &Cli) -> Result<CheckerConfig, certcheck::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => CheckerConfig::from_file(path)?,
        None => CheckerConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn password(cli: &Cli) -> Result<Zeroizing<String>, String> {
    if let Some(var) = &cli.password_env {
        return std::env::var(var)
            .map(Zeroizing::new)
            .map_err(|_| format!("environment variable {} is not set", var));
    }
    Ok(Zeroizing::new(cli.password.clone().unwrap_or_default()))
}

async fn run(checker: &Checker, container: &str, password: &str) -> Result<CheckResult, String> {
    if container == "-" {
        return Ok(checker.check_reader(tokio::io::stdin(), password).await);
    }
    let file = tokio::fs::File::open(container)
        .await
        .map_err(|e| format!("cannot open {}: {}", container, e))?;
    Ok(checker.check_reader(file, password).await)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            if cli.validate_config {
                eprintln!("❌ Configuration validation failed!");
                eprintln!("   Error: {}", e);
            } else {
                eprintln!("Configuration error: {}", e);
            }
            process::exit(EXIT_ERROR);
        }
    };

    // If validate-only mode, validate and exit
    if cli.validate_config {
        println!("✓ Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Fetch timeout: {} ms", config.fetch_timeout_ms);
        println!("  Max container size: {} bytes", config.max_container_size_bytes);
        println!("  Max response size: {} bytes", config.max_response_size_bytes);
        println!(
            "  Retries: {} (backoff {} ms)",
            config.max_retries, config.retry_backoff_ms
        );
        println!("  CertID hash: {:?}", config.hash_algorithm);
        println!("  OCSP method: {:?}", config.ocsp_method);
        println!("  Nonce: {}", config.enable_nonce);
        println!("  Clock skew: {} s", config.clock_skew_secs);
        println!("  Log level: {}", config.log_level);
        process::exit(0);
    }

    // Logs go to stderr, stdout carries only the result
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(container) = cli.container.as_deref() else {
        error!("no container given");
        process::exit(EXIT_ERROR);
    };

    let password = match password(&cli) {
        Ok(password) => password,
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_ERROR);
        }
    };

    let checker = match Checker::new(config) {
        Ok(checker) => checker,
        Err(e) => {
            error!("Failed to create checker: {}", e);
            process::exit(EXIT_ERROR);
        }
    };

    info!("Certcheck v{}", env!("CARGO_PKG_VERSION"));

    // Dropping the check future on Ctrl+C cancels any in-flight request
    let outcome = tokio::select! {
        outcome = run(&checker, container, &password) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, check abandoned");
            process::exit(EXIT_INTERRUPTED);
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_ERROR);
        }
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to render result: {}", e);
            process::exit(EXIT_ERROR);
        }
    }

    process::exit(result.exit_code());
}
