//! PDF pages as model-ready data URLs.

use std::sync::Arc;

use {
    attache_media::{ImageOptimizer, data_url, mime},
    attache_store::{Artifact, RepresentationCache, ResourceRef, TransformDefinition},
    tokio::io::AsyncReadExt,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use attache_metrics::{counter, resolver as resolver_metrics};

use crate::{
    error::{StageError, StageResult},
    strategy::optimize,
};

/// Pages handed to a model per document, independent of how many the cache
/// holds.
pub const MAX_AI_PAGES: usize = 20;

/// Turns the cached page extraction of a PDF into ordered data URLs.
pub struct PdfPageExtractor {
    cache: Arc<dyn RepresentationCache>,
    optimizer: Arc<dyn ImageOptimizer>,
    definition: TransformDefinition,
}

impl PdfPageExtractor {
    pub fn new(cache: Arc<dyn RepresentationCache>, optimizer: Arc<dyn ImageOptimizer>) -> Self {
        Self {
            cache,
            optimizer,
            definition: TransformDefinition::pdf_pages(),
        }
    }

    /// Up to [`MAX_AI_PAGES`] page data URLs in page order, or the single
    /// textual placeholder when no page could be produced. Never empty.
    pub async fn extract(&self, resource: &ResourceRef, title: &str) -> Vec<String> {
        let pages = self.encode_pages(resource).await;
        if !pages.is_empty() {
            return pages;
        }

        warn!(%resource, title, "no pdf pages available, using text placeholder");
        #[cfg(feature = "metrics")]
        counter!(resolver_metrics::PDF_TEXT_FALLBACKS_TOTAL).increment(1);
        vec![text_fallback(title)]
    }

    /// Encoded pages only; failing pages are skipped.
    pub async fn encode_pages(&self, resource: &ResourceRef) -> Vec<String> {
        self.cache.ensure(resource, &self.definition).await;
        let Some(representation) = self.cache.get(resource, &self.definition).await else {
            debug!(%resource, "no page representation");
            return Vec::new();
        };

        let total = representation.len();
        let mut pages = Vec::with_capacity(total.min(MAX_AI_PAGES));
        for (index, artifact) in representation.artifacts().iter().take(MAX_AI_PAGES).enumerate() {
            match self.encode_page(artifact).await {
                Ok(url) => pages.push(url),
                Err(e) => warn!(%resource, page = index + 1, error = %e, "skipping pdf page"),
            }
        }

        #[cfg(feature = "metrics")]
        counter!(resolver_metrics::PDF_PAGES_ENCODED_TOTAL).increment(pages.len() as u64);
        debug!(%resource, total, encoded = pages.len(), "pdf pages encoded");
        pages
    }

    async fn encode_page(&self, artifact: &Artifact) -> StageResult<String> {
        let mut stream = artifact.open().await?;

        let mut bytes = Vec::new();
        (&mut stream)
            .take(mime::SNIFF_PREFIX_LEN as u64)
            .read_to_end(&mut bytes)
            .await?;
        if bytes.is_empty() {
            return Err(StageError::transform_unavailable("empty page"));
        }
        let sniffed = mime::sniff_image_mime(&bytes);
        stream.read_to_end(&mut bytes).await?;

        let optimized = optimize(Arc::clone(&self.optimizer), bytes, sniffed.to_string()).await?;
        Ok(data_url::encode(&optimized.mime, &optimized.data))
    }
}

/// `data:text/plain;base64,` of `"PDF Document: <title>"`.
#[must_use]
pub fn text_fallback(title: &str) -> String {
    data_url::text_placeholder(&format!("PDF Document: {title}"))
}
