//! Size and checksum verification of downloaded files

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Result of inspecting a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    HashMismatch { expected: String, actual: String },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => write!(f, "valid"),
            Verdict::Missing => write!(f, "file missing"),
            Verdict::SizeMismatch { expected, actual } => {
                write!(f, "size {} bytes, expected {}", actual, expected)
            }
            Verdict::HashMismatch { expected, actual } => {
                write!(f, "sha256 {}, expected {}", actual, expected)
            }
        }
    }
}

/// Checks files against an expected size and optional SHA256.
///
/// Never modifies the file; callers delete files that fail.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    tolerance_percent: u64,
}

impl IntegrityVerifier {
    pub fn new(tolerance_percent: u64) -> Self {
        Self { tolerance_percent }
    }

    /// Whether the file at `path` is acceptable
    pub async fn verify(&self, path: &Path, expected_size: u64, expected_sha256: Option<&str>) -> bool {
        match self.inspect(path, expected_size, expected_sha256).await {
            Ok(verdict) if verdict.is_valid() => true,
            Ok(verdict) => {
                debug!("{} failed verification: {}", path.display(), verdict);
                false
            }
            Err(e) => {
                warn!("Could not verify {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Inspect the file and report why it fails, if it does
    pub async fn inspect(
        &self,
        path: &Path,
        expected_size: u64,
        expected_sha256: Option<&str>,
    ) -> std::io::Result<Verdict> {
        let actual = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Verdict::Missing),
            Err(e) => return Err(e),
        };

        if !self.size_within_tolerance(actual, expected_size) {
            return Ok(Verdict::SizeMismatch {
                expected: expected_size,
                actual,
            });
        }

        if let Some(expected) = expected_sha256.filter(|h| !h.is_empty()) {
            let actual = sha256_file(path).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Ok(Verdict::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(Verdict::Valid)
    }

    /// `|actual - expected| <= expected * tolerance%`, in exact integer math.
    /// An expected size of 0 means unknown and only rejects empty files.
    pub fn size_within_tolerance(&self, actual: u64, expected: u64) -> bool {
        if expected == 0 {
            return actual > 0;
        }
        let diff = actual.abs_diff(expected) as u128;
        diff * 100 <= expected as u128 * self.tolerance_percent as u128
    }
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Compute SHA256 hash of a file, streaming with a fixed buffer
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tolerance_boundary() {
        let verifier = IntegrityVerifier::new(2);

        assert!(verifier.size_within_tolerance(1000, 1000));
        assert!(verifier.size_within_tolerance(1020, 1000));
        assert!(verifier.size_within_tolerance(980, 1000));
        assert!(!verifier.size_within_tolerance(1021, 1000));
        assert!(!verifier.size_within_tolerance(979, 1000));

        // 2% of 75 MiB is exactly 1572864 bytes
        let expected = 78_643_200;
        assert!(verifier.size_within_tolerance(expected + 1_572_864, expected));
        assert!(!verifier.size_within_tolerance(expected + 1_572_865, expected));
        assert!(!verifier.size_within_tolerance(expected / 2, expected));
    }

    #[test]
    fn test_unknown_size() {
        let verifier = IntegrityVerifier::default();
        assert!(verifier.size_within_tolerance(1, 0));
        assert!(!verifier.size_within_tolerance(0, 0));
    }

    #[tokio::test]
    async fn test_hash_checks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"hello world").await.unwrap();

        let good = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        let verifier = IntegrityVerifier::default();

        assert_eq!(sha256_file(&path).await.unwrap(), good);
        assert!(verifier.verify(&path, 11, Some(good)).await);
        assert!(verifier.verify(&path, 11, Some(good.to_uppercase().as_str())).await);

        let bad = "0".repeat(64);
        let verdict = verifier.inspect(&path, 11, Some(bad.as_str())).await.unwrap();
        assert!(matches!(verdict, Verdict::HashMismatch { .. }));
        assert_eq!(verdict.to_string(), format!("sha256 {}, expected {}", good, bad));
        assert!(!verifier.verify(&path, 11, Some(bad.as_str())).await);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let verifier = IntegrityVerifier::default();
        let verdict = verifier
            .inspect(&dir.path().join("absent.bin"), 10, None)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Missing);

        let short = dir.path().join("short.bin");
        fs::write(&short, vec![0u8; 50]).await.unwrap();
        let verdict = verifier.inspect(&short, 100, None).await.unwrap();
        assert_eq!(verdict, Verdict::SizeMismatch { expected: 100, actual: 50 });
        assert_eq!(verdict.to_string(), "size 50 bytes, expected 100");
    }
}
