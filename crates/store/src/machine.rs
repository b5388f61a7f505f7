//! Runs a [`TransformKind`] against source bytes.

use std::sync::Arc;

use {
    async_trait::async_trait,
    attache_media::{image_ops, mime},
};

use crate::{
    Error, Result,
    rasterizer::{PageOptions, PageRasterizer},
    transform::TransformKind,
};

/// Raw output of a transform, before it is published to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    Single(Vec<u8>),
    Pages(Vec<Vec<u8>>),
}

/// Executes transforms. Must be idempotent: the same source and kind always
/// produce the same bytes.
#[async_trait]
pub trait TransformMachine: Send + Sync {
    async fn run(&self, source: Vec<u8>, mime_type: &str, kind: &TransformKind) -> Result<TransformOutput>;
}

/// Square transforms through `attache-media`, page extraction through a
/// [`PageRasterizer`].
pub struct DefaultTransformMachine {
    rasterizer: Arc<dyn PageRasterizer>,
}

impl DefaultTransformMachine {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self { rasterizer }
    }
}

#[async_trait]
impl TransformMachine for DefaultTransformMachine {
    async fn run(&self, source: Vec<u8>, mime_type: &str, kind: &TransformKind) -> Result<TransformOutput> {
        let essence = mime::essence(mime_type);
        match *kind {
            TransformKind::CropToSquare {
                max_size_px,
                quality_pct,
            } => {
                require_image(&essence)?;
                let out = tokio::task::spawn_blocking(move || {
                    image_ops::crop_to_square(&source, &essence, max_size_px, quality_pct)
                })
                .await??;
                Ok(TransformOutput::Single(out.data))
            },
            TransformKind::FitToSquare {
                max_size_px,
                quality_pct,
            } => {
                require_image(&essence)?;
                let out = tokio::task::spawn_blocking(move || {
                    image_ops::fit_to_square(&source, &essence, max_size_px, quality_pct)
                })
                .await??;
                Ok(TransformOutput::Single(out.data))
            },
            TransformKind::ExtractPages {
                max_size_px,
                quality_pct,
                max_pages,
                maintain_aspect_ratio,
            } => {
                let is_pdf = essence == "application/pdf"
                    || mime::sniff_content_type(&source) == Some("application/pdf");
                if !is_pdf {
                    return Err(Error::message(format!(
                        "page extraction needs a pdf, got {essence}"
                    )));
                }
                let options = PageOptions {
                    max_size_px,
                    quality_pct,
                    max_pages,
                    maintain_aspect_ratio,
                };
                let mut pages = self.rasterizer.rasterize(source, options).await?;
                pages.truncate(max_pages as usize);
                Ok(TransformOutput::Pages(pages))
            },
        }
    }
}

fn require_image(essence: &str) -> Result<()> {
    if essence.starts_with("image/") {
        Ok(())
    } else {
        Err(Error::message(format!("square transforms need an image, got {essence}")))
    }
}
