//! Per-check storage for an uploaded container
//!
//! Each check spools its upload into its own temporary file. The file is
//! removed when the [`ScopedUpload`] is dropped, whichever way the check ends.

use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload exceeds {0} bytes")]
    TooLarge(usize),
    #[error("upload not complete within {0:?}")]
    TimedOut(Duration),
}

/// A spooled upload, exclusively owned by one check
#[derive(Debug)]
pub struct ScopedUpload {
    file: NamedTempFile,
    len: usize,
}

impl ScopedUpload {
    /// Copy `reader` into a fresh temporary file, refusing more than
    /// `max_size` bytes
    pub async fn spool<R>(mut reader: R, max_size: usize) -> Result<Self, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let file = tempfile::Builder::new()
            .prefix("certcheck-")
            .suffix(".p12")
            .tempfile()?;
        let mut out = tokio::fs::File::from_std(file.reopen()?);

        let mut buf = vec![0u8; 16 * 1024];
        let mut len = 0usize;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            len += n;
            if len > max_size {
                debug!(max_size, "upload rejected");
                return Err(UploadError::TooLarge(max_size));
            }
            out.write_all(&buf[..n]).await?;
        }
        out.flush().await?;

        debug!(path = %file.path().display(), size = len, "upload spooled");
        Ok(Self { file, len })
    }

    /// [`spool`](Self::spool) with a deadline on the whole upload. A partly
    /// written file is removed when the deadline passes.
    pub async fn spool_within<R>(
        reader: R,
        max_size: usize,
        deadline: Duration,
    ) -> Result<Self, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        match tokio::time::timeout(deadline, Self::spool(reader, max_size)).await {
            Ok(spooled) => spooled,
            Err(_) => {
                debug!(?deadline, "upload timed out");
                Err(UploadError::TimedOut(deadline))
            }
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the spooled bytes back
    pub async fn read(&self) -> Result<Vec<u8>, UploadError> {
        Ok(tokio::fs::read(self.file.path()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spool_and_read() {
        let data = vec![0x30u8; 5000];
        let upload = ScopedUpload::spool(data.as_slice(), 10_000).await.unwrap();
        assert_eq!(upload.len(), 5000);
        assert!(upload.path().exists());
        assert_eq!(upload.read().await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_file_removed_on_drop() {
        let upload = ScopedUpload::spool(&b"container"[..], 1024).await.unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_size_limit() {
        let data = vec![0u8; 4096];
        let err = ScopedUpload::spool(data.as_slice(), 4095).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge(4095)));

        let upload = ScopedUpload::spool(data.as_slice(), 4096).await.unwrap();
        assert_eq!(upload.len(), 4096);
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(&[0x30, 0x82]).await.unwrap();

        let err = ScopedUpload::spool_within(reader, 1024, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TimedOut(d) if d == Duration::from_millis(50)));
        drop(writer);
    }

    #[tokio::test]
    async fn test_deadline_does_not_cut_short_a_complete_upload() {
        let upload = ScopedUpload::spool_within(&b"container"[..], 1024, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(upload.read().await.unwrap(), b"container");
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_isolated() {
        let first = ScopedUpload::spool(&b"first"[..], 64).await.unwrap();
        let second = ScopedUpload::spool(&b"second"[..], 64).await.unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(first.read().await.unwrap(), b"first");
        assert_eq!(second.read().await.unwrap(), b"second");
    }
}
