//! Display URLs and model payloads for chat attachments.

use std::{sync::Arc, time::Duration};

use {
    attache_media::ImageOptimizer,
    attache_store::{
        Located, RepresentationCache, ResourceLocator, ResourceStore, TransformDefinition,
        cache::DEFAULT_TRANSFORM_TIMEOUT,
    },
    futures::future::join_all,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use attache_metrics::{counter, labels, resolver as resolver_metrics};

use crate::{
    attachment::Attachment,
    classify::{FileType, classify},
    error::{StageError, StageResult},
    pdf::PdfPageExtractor,
    strategy::{IMAGE_STAGES, ImageChain, ImageStage, stage_timeout_for},
    urls::UrlPolicy,
    view::{AttachmentView, DisplayUrls},
};

/// Model-ready content for one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiPayload {
    Single(String),
    Pages(Vec<String>),
}

impl AiPayload {
    /// Uniform "sequence of content parts" view.
    #[must_use]
    pub fn into_parts(self) -> Vec<String> {
        match self {
            Self::Single(url) => vec![url],
            Self::Pages(pages) => pages,
        }
    }
}

/// Orchestrates locating, cached representations, and the fallback chains.
///
/// Neither entry point returns an error: every failure is absorbed at the
/// stage where it happens and logged.
pub struct ContentResolver {
    locator: ResourceLocator,
    cache: Arc<dyn RepresentationCache>,
    optimizer: Arc<dyn ImageOptimizer>,
    urls: UrlPolicy,
    pdf: PdfPageExtractor,
    thumbnail: TransformDefinition,
    ai_image: TransformDefinition,
    stages: Vec<ImageStage>,
    stage_timeout: Duration,
}

impl ContentResolver {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<dyn RepresentationCache>,
        optimizer: Arc<dyn ImageOptimizer>,
        urls: UrlPolicy,
    ) -> Self {
        Self {
            locator: ResourceLocator::new(store),
            pdf: PdfPageExtractor::new(Arc::clone(&cache), Arc::clone(&optimizer)),
            cache,
            optimizer,
            urls,
            thumbnail: TransformDefinition::thumbnail(),
            ai_image: TransformDefinition::ai_image(),
            stages: IMAGE_STAGES.to_vec(),
            stage_timeout: stage_timeout_for(DEFAULT_TRANSFORM_TIMEOUT),
        }
    }

    /// Bound on each stage of the image chain.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Replace the image strategy order.
    #[must_use]
    pub fn with_image_stages(mut self, stages: impl Into<Vec<ImageStage>>) -> Self {
        self.stages = stages.into();
        self
    }

    /// Download, preview, `src`, and inline data URLs for a UI.
    pub async fn resolve_for_display<A: Attachment + ?Sized>(&self, attachment: &A) -> DisplayUrls {
        let Ok(located) = self.locate(attachment).await else {
            return DisplayUrls::default();
        };
        let file_type = classify(effective_mime(attachment, Some(&located)));
        self.display_urls(&located, file_type).await
    }

    /// `None` for text and other files, a single data URL for images, and up
    /// to twenty page data URLs for PDFs.
    pub async fn resolve_for_ai<A: Attachment + ?Sized>(&self, attachment: &A) -> Option<AiPayload> {
        let located = self.locate(attachment).await.ok()?;
        match classify(effective_mime(attachment, Some(&located))) {
            FileType::Image => self.optimized_data_url(&located).await.map(AiPayload::Single),
            FileType::Pdf => {
                let title = display_title(attachment, Some(&located));
                Some(AiPayload::Pages(self.pdf.extract(&located.resource, title).await))
            },
            FileType::Text | FileType::Other => None,
        }
    }

    /// Resolve the attachments of one message concurrently; output order
    /// follows input order.
    pub async fn resolve_many_for_ai<A: Attachment>(&self, attachments: &[A]) -> Vec<Option<AiPayload>> {
        join_all(attachments.iter().map(|a| self.resolve_for_ai(a))).await
    }

    /// The JSON view a chat client renders.
    pub async fn view<A: Attachment + ?Sized>(&self, attachment: &A) -> AttachmentView {
        let located = self.locate(attachment).await.ok();
        let mime_type = effective_mime(attachment, located.as_ref());
        let file_type = classify(mime_type);
        let urls = match located {
            Some(ref located) => self.display_urls(located, file_type).await,
            None => DisplayUrls::default(),
        };
        let title = display_title(attachment, located.as_ref());
        AttachmentView::assemble(
            attachment.id(),
            title,
            attachment.filename().unwrap_or(title),
            attachment
                .size()
                .or_else(|| located.as_ref().map(|l| l.revision.size_bytes))
                .unwrap_or(0),
            mime_type,
            file_type,
            urls,
        )
    }

    /// The optimized-base64 chain: cached AI-sized representation, then the
    /// optimizer on the original bytes, then the original bytes as-is.
    pub async fn optimized_data_url(&self, located: &Located) -> Option<String> {
        ImageChain {
            store: self.locator.store().as_ref(),
            cache: self.cache.as_ref(),
            optimizer: &self.optimizer,
            definition: &self.ai_image,
            stages: &self.stages,
            timeout: self.stage_timeout,
        }
        .run(located)
        .await
    }

    async fn locate<A: Attachment + ?Sized>(&self, attachment: &A) -> StageResult<Located> {
        let Some(reference) = attachment.resource_ref() else {
            debug!(attachment = attachment.id(), "attachment has no resource reference");
            return Err(StageError::not_found(""));
        };
        self.locator
            .resolve(reference)
            .await
            .ok_or_else(|| StageError::not_found(reference))
    }

    async fn display_urls(&self, located: &Located, file_type: FileType) -> DisplayUrls {
        let download_url = Some(self.download_url(located).await);
        let (preview_url, data_url) = match file_type {
            FileType::Image => (
                self.preview_url(located).await,
                self.optimized_data_url(located).await,
            ),
            FileType::Pdf | FileType::Text | FileType::Other => (None, None),
        };

        let src = match file_type {
            FileType::Image => preview_url
                .clone()
                .or_else(|| data_url.clone())
                .or_else(|| download_url.clone()),
            FileType::Pdf => None,
            FileType::Text | FileType::Other => download_url.clone(),
        };

        DisplayUrls {
            download_url,
            preview_url,
            src,
            data_url,
        }
    }

    async fn download_url(&self, located: &Located) -> String {
        match self.locator.store().src(&located.resource).await {
            Ok(Some(url)) if self.urls.has_bad_path(&url) => {
                debug!(resource = %located.resource, url, "rewriting plugin-context download url");
                self.urls.repair(url)
            },
            Ok(Some(url)) => url,
            Ok(None) => self.urls.plugin_download(located.resource.as_str()),
            Err(e) => {
                debug!(resource = %located.resource, error = %e, "store has no download url");
                #[cfg(feature = "metrics")]
                counter!(resolver_metrics::STAGE_FALLBACKS_TOTAL, labels::STAGE => "download_url")
                    .increment(1);
                self.urls.plugin_download(located.resource.as_str())
            },
        }
    }

    async fn preview_url(&self, located: &Located) -> Option<String> {
        self.cache.ensure(&located.resource, &self.thumbnail).await;
        match self.cache.url(&located.resource, &self.thumbnail).await {
            Some(url) if self.urls.has_bad_path(&url) => {
                debug!(resource = %located.resource, url, "thumbnail url unusable, using delivery url");
                Some(self.urls.delivery(&located.resource))
            },
            Some(url) => Some(url),
            None => {
                warn!(resource = %located.resource, "no thumbnail available");
                #[cfg(feature = "metrics")]
                counter!(resolver_metrics::STAGE_FALLBACKS_TOTAL, labels::STAGE => "thumbnail")
                    .increment(1);
                None
            },
        }
    }
}

/// Declared MIME type, or the stored revision's when none was declared.
fn effective_mime<'a, A: Attachment + ?Sized>(attachment: &'a A, located: Option<&'a Located>) -> &'a str {
    let declared = attachment.mime_type().trim();
    if declared.is_empty() {
        located.map_or("", |l| l.revision.mime_type.as_str())
    } else {
        declared
    }
}

fn display_title<'a, A: Attachment + ?Sized>(attachment: &'a A, located: Option<&'a Located>) -> &'a str {
    let title = attachment.title();
    if title.is_empty() {
        located.map_or("", |l| l.revision.title.as_str())
    } else {
        title
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::attachment::AttachmentInput,
        async_trait::async_trait,
        attache_media::{BoundedImageOptimizer, data_url},
        attache_store::{MemoryResourceStore, Representation, ResourceRef},
    };

    /// A cache that never produces anything.
    struct EmptyCache;

    #[async_trait]
    impl RepresentationCache for EmptyCache {
        async fn ensure(&self, _: &ResourceRef, _: &TransformDefinition) {}

        async fn get(&self, _: &ResourceRef, _: &TransformDefinition) -> Option<Representation> {
            None
        }

        async fn url(&self, _: &ResourceRef, _: &TransformDefinition) -> Option<String> {
            None
        }
    }

    async fn resolver_with(store: MemoryResourceStore) -> (ContentResolver, Arc<MemoryResourceStore>) {
        let store = Arc::new(store);
        let resolver = ContentResolver::new(
            store.clone(),
            Arc::new(EmptyCache),
            Arc::new(BoundedImageOptimizer::default()),
            UrlPolicy::default(),
        );
        (resolver, store)
    }

    #[tokio::test]
    async fn text_is_not_sent_to_the_model() {
        let (resolver, store) = resolver_with(MemoryResourceStore::new()).await;
        let r = store.store(b"hello".to_vec(), "text/plain", "a.txt").await.unwrap();
        let input = AttachmentInput::new("a1", r.as_str(), "text/plain", "a.txt");
        assert_eq!(resolver.resolve_for_ai(&input).await, None);

        let urls = resolver.resolve_for_display(&input).await;
        assert_eq!(urls.preview_url, None);
        assert_eq!(urls.data_url, None);
        assert_eq!(urls.src, urls.download_url);
        assert_eq!(
            urls.download_url.unwrap(),
            format!("/plugins/attachments/download?ref={r}")
        );
    }

    #[tokio::test]
    async fn missing_reference_resolves_to_nothing() {
        let (resolver, _store) = resolver_with(MemoryResourceStore::new()).await;
        let input = AttachmentInput {
            id: "a1".into(),
            mime_hint: "image/png".into(),
            ..Default::default()
        };
        assert_eq!(resolver.resolve_for_ai(&input).await, None);
        assert_eq!(resolver.resolve_for_display(&input).await, DisplayUrls::default());
    }

    #[tokio::test]
    async fn undecodable_image_falls_back_to_raw_bytes() {
        let (resolver, store) = resolver_with(MemoryResourceStore::new()).await;
        let r = store.store(b"\x89PNG not really".to_vec(), "image/png", "x.png").await.unwrap();
        let input = AttachmentInput::new("a1", r.as_str(), "image/png", "x.png");
        let payload = resolver.resolve_for_ai(&input).await.unwrap();
        assert_eq!(
            payload,
            AiPayload::Single(data_url::encode("image/png", b"\x89PNG not really"))
        );
    }

    #[tokio::test]
    async fn declared_mime_falls_back_to_revision() {
        let (resolver, store) = resolver_with(MemoryResourceStore::new()).await;
        let r = store.store(b"%PDF-1.4".to_vec(), "application/pdf", "doc.pdf").await.unwrap();
        let input = AttachmentInput::new("a1", r.as_str(), "", "");
        let view = resolver.view(&input).await;
        assert_eq!(view.file_type, FileType::Pdf);
        assert_eq!(view.title, "doc.pdf");
        assert_eq!(view.filename, "doc.pdf");
        assert_eq!(view.size, 8);
        assert_eq!(view.src, None);
        assert!(view.download_url.is_some());
    }

    #[test]
    fn payload_parts_are_uniform() {
        assert_eq!(AiPayload::Single("a".into()).into_parts(), vec!["a"]);
        assert_eq!(
            AiPayload::Pages(vec!["a".into(), "b".into()]).into_parts(),
            vec!["a", "b"]
        );
        assert_eq!(
            serde_json::to_string(&AiPayload::Single("a".into())).unwrap(),
            "\"a\""
        );
    }
}
