use std::path::PathBuf;

use certcheck_proto::ocsp::{validate_response, CertId, HashAlgorithm, OcspRequest, OcspResponse, ValidationOptions};
use certcheck_proto::{pkcs12, Certificate};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn fixture(path: &str) -> Vec<u8> {
    let full = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/pki").join(path);
    std::fs::read(&full).expect("Failed to read fixture")
}

fn cert(name: &str) -> Certificate {
    Certificate::from_der(&fixture(&format!("certs/{}.der", name))).expect("Failed to parse certificate")
}

fn bench_container_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_decode");

    for name in ["alice-aes.p12", "alice-3des.p12", "alice-plain.p12"] {
        let bytes = fixture(&format!("containers/{}", name));
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| {
                pkcs12::decode(black_box(bytes), "correct horse battery").expect("Failed to decode container")
            });
        });
    }

    group.finish();
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");
    let alice = cert("alice");
    let ca = cert("ca");

    for algorithm in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", algorithm)),
            &algorithm,
            |b, &algorithm| {
                b.iter(|| OcspRequest::new(CertId::new(&alice, &ca, algorithm)).encode());
            },
        );
    }

    group.finish();
}

fn bench_response(c: &mut Criterion) {
    let alice = cert("alice");
    let ca = cert("ca");
    let good = fixture("ocsp/good.der");
    let delegated = fixture("ocsp/delegated.der");

    c.bench_function("response_parse", |b| {
        b.iter(|| OcspResponse::parse(black_box(&good)).expect("Failed to parse response"));
    });

    let mut group = c.benchmark_group("response_validate");
    for (name, bytes) in [("issuer", &good), ("delegated", &delegated)] {
        let response = OcspResponse::parse(bytes).expect("Failed to parse response");
        let options = ValidationOptions::at(Utc::now());
        group.bench_function(name, |b| {
            b.iter(|| {
                validate_response(black_box(&response), &alice, &ca, &options)
                    .expect("Failed to validate response")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_container_decode, bench_request_encode, bench_response);
criterion_main!(benches);
