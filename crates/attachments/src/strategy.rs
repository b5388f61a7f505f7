//! The optimized-base64 chain for images.
//!
//! Stages run in list order and the first one that yields a data URL wins.
//! A stage that fails or times out is logged and the next one is tried; only
//! exhausting the whole list yields `None`.

use std::{sync::Arc, time::Duration};

use {
    attache_media::{ImageOptimizer, OptimizedImage, data_url, mime},
    attache_store::{Located, RepresentationCache, ResourceStore, TransformDefinition},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use attache_metrics::{counter, labels, resolver as resolver_metrics};

use crate::error::{StageError, StageResult};

/// One way of turning an image resource into a data URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageStage {
    /// Read the cached `FitToSquare(1024, q85)` representation directly.
    CachedRepresentation,
    /// Run the original bytes through the [`ImageOptimizer`].
    Optimizer,
    /// Encode the original bytes untouched.
    RawBytes,
}

/// Slack a stage gets over the cache's transform timeout, so a slow
/// transform is reported and cleaned up by the cache before the stage gives up.
pub const STAGE_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Stage bound for a cache configured with `transform_timeout`.
#[must_use]
pub fn stage_timeout_for(transform_timeout: Duration) -> Duration {
    transform_timeout + STAGE_TIMEOUT_MARGIN
}

/// Default priority order.
pub const IMAGE_STAGES: [ImageStage; 3] = [
    ImageStage::CachedRepresentation,
    ImageStage::Optimizer,
    ImageStage::RawBytes,
];

impl ImageStage {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CachedRepresentation => "cached_representation",
            Self::Optimizer => "optimizer",
            Self::RawBytes => "raw_bytes",
        }
    }
}

/// Borrowed collaborators for one run of the chain.
pub(crate) struct ImageChain<'a> {
    pub store: &'a dyn ResourceStore,
    pub cache: &'a dyn RepresentationCache,
    pub optimizer: &'a Arc<dyn ImageOptimizer>,
    pub definition: &'a TransformDefinition,
    pub stages: &'a [ImageStage],
    pub timeout: Duration,
}

impl ImageChain<'_> {
    pub async fn run(&self, located: &Located) -> Option<String> {
        // Original bytes are read at most once, by whichever stage needs them first.
        let mut original = None;
        for &stage in self.stages {
            let attempt = self.attempt(stage, located, &mut original);
            let outcome = match tokio::time::timeout(self.timeout, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StageError::Timeout {
                    stage: stage.label(),
                    after: self.timeout,
                }),
            };
            match outcome {
                Ok(url) => {
                    debug!(resource = %located.resource, stage = stage.label(), "image encoded");
                    return Some(url);
                },
                Err(e) => {
                    debug!(
                        resource = %located.resource,
                        stage = stage.label(),
                        error = %e,
                        "image stage deferred"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(resolver_metrics::STAGE_FALLBACKS_TOTAL, labels::STAGE => stage.label())
                        .increment(1);
                },
            }
        }

        warn!(resource = %located.resource, "every image strategy failed");
        #[cfg(feature = "metrics")]
        counter!(resolver_metrics::EXHAUSTED_TOTAL, labels::ENTRY => "image").increment(1);
        None
    }

    async fn attempt(
        &self,
        stage: ImageStage,
        located: &Located,
        original: &mut Option<Vec<u8>>,
    ) -> StageResult<String> {
        match stage {
            ImageStage::CachedRepresentation => {
                self.cache.ensure(&located.resource, self.definition).await;
                let representation = self
                    .cache
                    .get(&located.resource, self.definition)
                    .await
                    .ok_or_else(|| StageError::transform_unavailable("no ai-sized representation"))?;
                let artifact = representation
                    .artifacts()
                    .first()
                    .ok_or_else(|| StageError::transform_unavailable("representation has no artifact"))?;
                let bytes = artifact.read_all().await?;
                Ok(data_url::encode(mime::sniff_image_mime(&bytes), &bytes))
            },
            ImageStage::Optimizer => {
                let bytes = self.original(located, original).await?.to_vec();
                let hint = mime::essence(&located.revision.mime_type);
                let optimized = optimize(Arc::clone(self.optimizer), bytes, hint).await?;
                Ok(data_url::encode(&optimized.mime, &optimized.data))
            },
            ImageStage::RawBytes => {
                let revision_mime = mime::essence(&located.revision.mime_type);
                let bytes = self.original(located, original).await?;
                let mime = if revision_mime.starts_with("image/") {
                    revision_mime.as_str()
                } else {
                    mime::sniff_image_mime(bytes)
                };
                Ok(data_url::encode(mime, bytes))
            },
        }
    }

    async fn original<'b>(&self, located: &Located, slot: &'b mut Option<Vec<u8>>) -> StageResult<&'b [u8]> {
        if slot.is_none() {
            // Pinned to the located revision so the bytes match its MIME type.
            *slot = Some(
                self.store
                    .read_revision(&located.resource, located.revision.number)
                    .await?,
            );
        }
        Ok(slot.as_deref().unwrap_or_default())
    }
}

/// Run the optimizer off the async runtime.
pub(crate) async fn optimize(
    optimizer: Arc<dyn ImageOptimizer>,
    bytes: Vec<u8>,
    mime_hint: String,
) -> StageResult<OptimizedImage> {
    let optimized = tokio::task::spawn_blocking(move || optimizer.optimize(&bytes, &mime_hint)).await??;
    Ok(optimized)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_outlast_the_transform_timeout() {
        let transform = Duration::from_secs(30);
        assert!(stage_timeout_for(transform) > transform);
    }

    #[test]
    fn default_order_is_cache_then_optimizer_then_raw() {
        assert_eq!(
            IMAGE_STAGES.map(|s| s.label()),
            ["cached_representation", "optimizer", "raw_bytes"]
        );
    }
}
