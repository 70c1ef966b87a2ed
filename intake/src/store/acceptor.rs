use std::path::Path;

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::StorageConfig;
use crate::errors::{Error, Result};

/// Descriptor of a fully persisted upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Sanitized filename the upload was stored under
    pub filename: String,
    /// Total bytes received and written
    pub bytes: u64,
}

impl StoredFile {
    /// Stored size in megabytes, rounded to 2 decimal places.
    pub fn size_mb(&self) -> f64 {
        to_megabytes(self.bytes)
    }
}

/// Convert a byte count to megabytes, rounded half-up to 2 decimal places.
pub fn to_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

/// Reduce a client-supplied filename to its final path segment.
///
/// Both `/` and `\` count as separators, so a traversal attempt like
/// `../../etc/passwd` or `C:\evil\f.csv` collapses to its basename. Names
/// that reduce to nothing (empty, `.`, `..`, trailing separator) are
/// rejected rather than guessed at.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::BadRequest {
            message: "Upload filename is empty or invalid".to_string(),
        });
    }

    Ok(name.to_string())
}

/// Create the storage directory if it does not already exist.
///
/// Called once at startup; [`accept`] assumes the directory is present.
pub async fn ensure_storage_dir(config: &StorageConfig) -> std::io::Result<()> {
    fs::create_dir_all(&config.dir).await
}

/// Accept one upload: validate the name, then stream the bytes to disk.
///
/// Gates run in order, each aborting with no later side effects:
///
/// 1. Sanitize the filename to its final path segment.
/// 2. Reject extensions outside the allowlist (no filesystem touch).
/// 3. Reject names whose destination already exists. The pre-check is a
///    fast path; the `create_new` open below is the authoritative check
///    and turns a lost race into the same [`Error::Conflict`].
/// 4. Copy the stream in `chunk_size` reads, counting received bytes
///    against `max_file_size` before each write. On any overrun or I/O
///    failure the partial file is deleted before the error surfaces.
///
/// The advertised request length is never consulted; only bytes actually
/// received count against the cap.
pub async fn accept<R>(reader: R, filename: &str, config: &StorageConfig) -> Result<StoredFile>
where
    R: AsyncRead,
{
    let filename = sanitize_filename(filename)?;

    let extension = Path::new(&filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    if !config.is_allowed(&extension) {
        return Err(Error::UnsupportedType { extension });
    }

    let path = config.dir.join(&filename);

    if fs::try_exists(&path).await? {
        return Err(Error::Conflict { filename });
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists => Error::Conflict {
                filename: filename.clone(),
            },
            _ => Error::Io(err),
        })?;

    tokio::pin!(reader);

    let bytes = match copy_bounded(reader, &mut file, config).await {
        Ok(bytes) => bytes,
        Err(err) => {
            drop(file);
            remove_partial(&path).await;
            if let Error::PayloadTooLarge { limit } = err {
                tracing::warn!(
                    filename = %filename,
                    limit = limit,
                    "upload exceeded size cap, partial file removed"
                );
            }
            return Err(err);
        }
    };

    let stored = StoredFile { filename, bytes };
    tracing::info!(filename = %stored.filename, size_mb = stored.size_mb(), "stored upload");
    Ok(stored)
}

/// Copy `reader` into `writer` in `chunk_size` reads, failing once the
/// received total passes `max_file_size`.
///
/// The cap is checked before the chunk is written, so at most one chunk
/// beyond the limit is ever read and none of it reaches the disk.
async fn copy_bounded<R, W>(mut reader: R, writer: &mut W, config: &StorageConfig) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.chunk_size];
    let mut total: u64 = 0;

    loop {
        let read = reader
            .read(&mut buf)
            .await
            .map_err(|source| Error::Stream { source })?;
        if read == 0 {
            break;
        }

        total += read as u64;
        if total > config.max_file_size {
            return Err(Error::PayloadTooLarge {
                limit: config.max_file_size,
            });
        }

        writer.write_all(&buf[..read]).await?;
    }

    writer.flush().await?;
    Ok(total)
}

/// Best-effort removal of a partially written upload. Absence is not an error.
async fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove partial upload");
    }
}
