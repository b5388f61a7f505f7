use std::fmt;

use {attache_media::mime, serde::{Deserialize, Serialize}};

/// Coarse attachment class driving every resolution decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Pdf,
    Text,
    Other,
}

impl FileType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a MIME type. Total: every string maps to exactly one class.
#[must_use]
pub fn classify(mime_type: &str) -> FileType {
    let essence = mime::essence(mime_type);
    if essence == "application/pdf" {
        return FileType::Pdf;
    }
    match essence.split_once('/') {
        Some(("image", _)) => FileType::Image,
        Some(("text", _)) => FileType::Text,
        _ => FileType::Other,
    }
}
