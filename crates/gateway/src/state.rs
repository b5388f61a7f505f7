use std::{path::Path, sync::Arc, time::Duration};

use {
    attache_attachments::{ContentResolver, UrlPolicy, stage_timeout_for},
    attache_config::AttacheConfig,
    attache_media::BoundedImageOptimizer,
    attache_store::{
        DefaultTransformMachine, FsRepresentationCache, FsResourceStore, PdftoppmRasterizer,
        RepresentationCache, ResourceStore,
    },
};

#[cfg(feature = "metrics")]
use attache_metrics::MetricsHandle;

/// Shared gateway state: the store, the representation cache, and the
/// resolver built on top of them.
pub struct GatewayState {
    pub version: String,
    pub config: AttacheConfig,
    pub store: Arc<dyn ResourceStore>,
    pub cache: Arc<dyn RepresentationCache>,
    pub resolver: ContentResolver,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(
        config: AttacheConfig,
        store: Arc<dyn ResourceStore>,
        cache: Arc<dyn RepresentationCache>,
    ) -> Self {
        let resolver = ContentResolver::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::new(BoundedImageOptimizer::default()),
            UrlPolicy::from_config(&config.urls),
        )
        .with_stage_timeout(stage_timeout_for(Duration::from_secs(
            config.transforms.timeout_secs,
        )));

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            store,
            cache,
            resolver,
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    /// Filesystem-backed state under `data_dir`:
    /// `resources/` for originals, `flavours/` for representations.
    pub fn from_config(config: AttacheConfig, data_dir: &Path) -> Self {
        let store: Arc<dyn ResourceStore> = Arc::new(
            FsResourceStore::new(data_dir.join("resources"))
                .with_url_base(config.urls.effective_store_base()),
        );
        let machine = Arc::new(DefaultTransformMachine::new(Arc::new(PdftoppmRasterizer::new(
            config.transforms.pdftoppm.clone(),
        ))));
        let cache: Arc<dyn RepresentationCache> = Arc::new(
            FsRepresentationCache::new(data_dir.join("flavours"), Arc::clone(&store), machine)
                .with_url_base(config.urls.flavour_base())
                .with_timeout(Duration::from_secs(config.transforms.timeout_secs))
                .with_single_flight(config.transforms.single_flight),
        );
        Self::new(config, store, cache)
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics_handle(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
