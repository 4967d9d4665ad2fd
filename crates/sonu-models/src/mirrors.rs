//! Download mirrors in fallback order

use serde::{Deserialize, Serialize};

/// One endpoint that can serve model files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Name used in progress messages and results
    pub name: String,
    /// Base URL the filename is appended to
    pub base_url: String,
    /// Query parameters, in order
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

impl Mirror {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            params: Vec::new(),
        }
    }

    /// Add a query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Request URL for a file on this mirror
    pub fn request_url(&self, filename: &str) -> String {
        let mut url = format!("{}{}", self.base_url, filename);
        if !self.params.is_empty() {
            let query = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

/// Ordered mirror list; earlier entries are tried first
#[derive(Debug, Clone, Default)]
pub struct MirrorList {
    mirrors: Vec<Mirror>,
}

impl MirrorList {
    pub fn new(mirrors: Vec<Mirror>) -> Self {
        Self { mirrors }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Mirror::new(
                "Hugging Face (Primary)",
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/",
            ),
            Mirror::new(
                "Hugging Face (Alternative)",
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/",
            )
            .with_param("download", "true"),
            Mirror::new(
                "Hugging Face (Raw)",
                "https://huggingface.co/ggerganov/whisper.cpp/raw/main/",
            ),
            Mirror::new(
                "GitHub Releases",
                "https://github.com/ggerganov/whisper.cpp/releases/download/v1.8.2/",
            ),
        ])
    }

    pub fn endpoints(&self) -> &[Mirror] {
        &self.mirrors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let plain = Mirror::new("a", "https://host/models/");
        assert_eq!(plain.request_url("m.bin"), "https://host/models/m.bin");

        let with_params = Mirror::new("b", "https://host/")
            .with_param("download", "true")
            .with_param("rev", "main");
        assert_eq!(
            with_params.request_url("m.bin"),
            "https://host/m.bin?download=true&rev=main"
        );
    }

    #[test]
    fn test_builtin_order() {
        let mirrors = MirrorList::builtin();
        let names: Vec<_> = mirrors.endpoints().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names[0], "Hugging Face (Primary)");
        assert_eq!(names[3], "GitHub Releases");
        assert_eq!(
            mirrors.endpoints()[1].request_url("ggml-tiny-q5_0.gguf"),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny-q5_0.gguf?download=true"
        );
    }
}
