//! Model catalog with download information

use serde::{Deserialize, Serialize};

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// File name on mirrors and on disk
    pub filename: String,
    /// Expected file size in bytes
    pub size_bytes: u64,
    /// SHA256 hash for verification
    pub sha256: Option<String>,
    /// Description
    pub description: String,
    /// Hardware recommendation
    pub recommended_for: String,
    /// Direct URL shown when every mirror fails
    pub manual_url: String,
}

impl ModelDescriptor {
    /// Get human-readable size string
    pub fn size_string(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.1} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.0} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.0} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}

const MIB: u64 = 1024 * 1024;
const MANUAL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/";

fn whisper(
    id: &str,
    name: &str,
    filename: &str,
    size_mb: u64,
    description: &str,
    recommended_for: &str,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        filename: filename.to_string(),
        size_bytes: size_mb * MIB,
        sha256: None,
        description: description.to_string(),
        recommended_for: recommended_for.to_string(),
        manual_url: format!("{}{}", MANUAL_BASE_URL, filename),
    }
}

/// Immutable set of downloadable models
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
}

impl Catalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    /// Quantized whisper models
    pub fn builtin() -> Self {
        Self::new(vec![
            whisper(
                "tiny",
                "Whisper Tiny",
                "ggml-tiny-q5_0.gguf",
                75,
                "Fastest, lowest accuracy - best for real-time dictation",
                "≤4 cores / <8 GB RAM",
            ),
            whisper(
                "base",
                "Whisper Base",
                "ggml-base-q5_0.gguf",
                145,
                "Balanced speed & accuracy - recommended for most users",
                "4–8 cores / 8–16 GB RAM",
            ),
            whisper(
                "small",
                "Whisper Small",
                "ggml-small-q5_0.gguf",
                480,
                "Slower but more accurate - good for high-quality transcription",
                "8–12 cores / ≥16 GB RAM",
            ),
            whisper(
                "medium",
                "Whisper Medium",
                "ggml-medium-q5_0.gguf",
                1536,
                "Best accuracy for CPU use - requires powerful system",
                ">12 cores / ≥32 GB RAM",
            ),
        ])
    }

    /// Get model info by ID
    pub fn lookup(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Models in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = Catalog::builtin();

        let tiny = catalog.lookup("tiny").unwrap();
        assert_eq!(tiny.filename, "ggml-tiny-q5_0.gguf");
        assert_eq!(tiny.size_bytes, 78_643_200);
        assert!(tiny.sha256.is_none());
        assert_eq!(
            tiny.manual_url,
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny-q5_0.gguf"
        );

        assert!(catalog.lookup("large").is_none());
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_size_string() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.lookup("tiny").unwrap().size_string(), "75 MB");
        assert_eq!(catalog.lookup("medium").unwrap().size_string(), "1.5 GB");
    }
}
