//! Transform definitions: what a representation is derived with.
//!
//! A definition's id is a content hash of its kind and parameters, so two
//! definitions with the same parameters share cache entries and changing any
//! parameter addresses a fresh set of entries.

use {
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
};

/// Thumbnail edge length.
pub const THUMBNAIL_SIZE_PX: u32 = 150;
pub const THUMBNAIL_QUALITY: u8 = 75;
/// Longest edge of images handed to a model.
pub const AI_IMAGE_SIZE_PX: u32 = 1024;
pub const AI_IMAGE_QUALITY: u8 = 85;
/// Page rasterization for PDFs.
pub const PDF_PAGE_SIZE_PX: u32 = 1024;
pub const PDF_PAGE_QUALITY: u8 = 85;
/// Pages kept in the cache per document.
pub const PDF_CACHE_MAX_PAGES: u32 = 50;

const ID_LEN: usize = 16;

/// The closed set of transforms the machine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Centre-crop to a square of `max_size_px`.
    CropToSquare { max_size_px: u32, quality_pct: u8 },
    /// Longest edge bounded by `max_size_px`.
    FitToSquare { max_size_px: u32, quality_pct: u8 },
    /// One raster per page, first `max_pages` pages.
    ExtractPages {
        max_size_px: u32,
        quality_pct: u8,
        max_pages: u32,
        maintain_aspect_ratio: bool,
    },
}

impl TransformKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CropToSquare { .. } => "crop_to_square",
            Self::FitToSquare { .. } => "fit_to_square",
            Self::ExtractPages { .. } => "extract_pages",
        }
    }

    /// Whether the output is a page sequence rather than a single artifact.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        matches!(self, Self::ExtractPages { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformDefinition {
    id: String,
    kind: TransformKind,
    /// Persisted definitions are written to disk; others live in memory for
    /// the lifetime of the process.
    persist: bool,
}

impl TransformDefinition {
    #[must_use]
    pub fn new(kind: TransformKind, persist: bool) -> Self {
        Self {
            id: content_id(&kind),
            kind,
            persist,
        }
    }

    /// `CropToSquare(150px, q75)`, the chat thumbnail.
    #[must_use]
    pub fn thumbnail() -> Self {
        Self::new(
            TransformKind::CropToSquare {
                max_size_px: THUMBNAIL_SIZE_PX,
                quality_pct: THUMBNAIL_QUALITY,
            },
            true,
        )
    }

    /// `FitToSquare(1024px, q85)`, the model-ready image.
    #[must_use]
    pub fn ai_image() -> Self {
        Self::new(
            TransformKind::FitToSquare {
                max_size_px: AI_IMAGE_SIZE_PX,
                quality_pct: AI_IMAGE_QUALITY,
            },
            true,
        )
    }

    /// `ExtractPages(1024px, 50 pages, q85, aspect-preserving)`.
    #[must_use]
    pub fn pdf_pages() -> Self {
        Self::new(
            TransformKind::ExtractPages {
                max_size_px: PDF_PAGE_SIZE_PX,
                quality_pct: PDF_PAGE_QUALITY,
                max_pages: PDF_CACHE_MAX_PAGES,
                maintain_aspect_ratio: true,
            },
            true,
        )
    }

    /// The built-in definitions with their short names.
    #[must_use]
    pub fn builtins() -> [(&'static str, Self); 3] {
        [
            ("thumbnail", Self::thumbnail()),
            ("ai-image", Self::ai_image()),
            ("pdf-pages", Self::pdf_pages()),
        ]
    }

    /// Look up a built-in definition by short name or id.
    #[must_use]
    pub fn builtin(name_or_id: &str) -> Option<Self> {
        Self::builtins()
            .into_iter()
            .find(|(name, def)| *name == name_or_id || def.id == name_or_id)
            .map(|(_, def)| def)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> &TransformKind {
        &self.kind
    }

    #[must_use]
    pub fn persist(&self) -> bool {
        self.persist
    }
}

/// First 16 hex chars of SHA-256 over the canonical JSON of `kind`.
fn content_id(kind: &TransformKind) -> String {
    // Field order is fixed by the type, so the JSON is canonical.
    let canonical = serde_json::to_vec(kind).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let hex = format!("{digest:x}");
    hex[..ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_parameter_sensitive() {
        assert_eq!(
            TransformDefinition::thumbnail().id(),
            TransformDefinition::thumbnail().id()
        );
        let bigger = TransformDefinition::new(
            TransformKind::CropToSquare {
                max_size_px: 300,
                quality_pct: THUMBNAIL_QUALITY,
            },
            true,
        );
        assert_ne!(bigger.id(), TransformDefinition::thumbnail().id());
        assert_eq!(bigger.id().len(), 16);
        assert!(bigger.id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn persist_flag_does_not_change_identity() {
        let kind = *TransformDefinition::ai_image().kind();
        assert_eq!(
            TransformDefinition::new(kind, false).id(),
            TransformDefinition::new(kind, true).id()
        );
    }

    #[test]
    fn builtins_resolve_by_name_and_id() {
        let pages = TransformDefinition::pdf_pages();
        assert_eq!(TransformDefinition::builtin("pdf-pages"), Some(pages.clone()));
        assert_eq!(TransformDefinition::builtin(pages.id()), Some(pages));
        assert!(TransformDefinition::builtin("sepia").is_none());
    }

    #[test]
    fn fixed_constants() {
        match TransformDefinition::pdf_pages().kind() {
            TransformKind::ExtractPages {
                max_size_px,
                quality_pct,
                max_pages,
                maintain_aspect_ratio,
            } => {
                assert_eq!(
                    (*max_size_px, *quality_pct, *max_pages, *maintain_aspect_ratio),
                    (1024, 85, 50, true)
                );
            },
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(TransformDefinition::pdf_pages().kind().is_paged());
        assert!(!TransformDefinition::thumbnail().kind().is_paged());
    }
}
