//! Streaming SHA-256 over files.

use crate::error::ArtifactError;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read size per hashing step. Artifacts are never buffered whole.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Lowercase hex SHA-256 of the file at `path`.
pub async fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive comparison of two hex digests.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Hash `path` and compare against `expected`, returning the computed digest.
pub async fn verify_file(path: &Path, expected: &str) -> Result<String, ArtifactError> {
    let actual = match sha256_file(path).await {
        Ok(digest) => digest,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ArtifactError::ArtifactMissing {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(ArtifactError::Io(err)),
    };

    if !digests_match(expected, &actual) {
        return Err(ArtifactError::IntegrityMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        });
    }

    Ok(actual)
}
