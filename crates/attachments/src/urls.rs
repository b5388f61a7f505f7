//! Public URL construction and repair.

use {attache_config::UrlConfig, attache_store::ResourceRef};

/// Builds the URLs the resolver hands out.
///
/// The store may produce links under a plugin context that is not reachable
/// from outside; such links contain `bad_path_marker` and are recombined with
/// `external_base_path`.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    external_base_path: String,
    bad_path_marker: String,
    plugin_download_path: String,
    delivery_path: String,
}

impl UrlPolicy {
    #[must_use]
    pub fn from_config(config: &UrlConfig) -> Self {
        Self {
            external_base_path: config.external_base_path.trim_end_matches('/').to_string(),
            bad_path_marker: config.bad_path_marker.clone(),
            plugin_download_path: config.plugin_download_path.clone(),
            delivery_path: config.delivery_path.clone(),
        }
    }

    #[must_use]
    pub fn has_bad_path(&self, url: &str) -> bool {
        !self.bad_path_marker.is_empty() && url.contains(&self.bad_path_marker)
    }

    /// Rewrite a store URL carrying the bad-path marker onto the external
    /// base: everything after the marker is kept.
    #[must_use]
    pub fn repair(&self, url: String) -> String {
        if self.bad_path_marker.is_empty() {
            return url;
        }
        match url.find(&self.bad_path_marker) {
            Some(at) => {
                let suffix = &url[at + self.bad_path_marker.len()..];
                format!("{}/{}", self.external_base_path, suffix.trim_start_matches('/'))
            },
            None => url,
        }
    }

    /// Plugin-hosted download endpoint, used when the store has no URL.
    #[must_use]
    pub fn plugin_download(&self, reference: &str) -> String {
        format!(
            "{}{}?ref={}",
            self.external_base_path,
            self.plugin_download_path,
            urlencoding::encode(reference)
        )
    }

    /// Raw delivery endpoint for the original bytes.
    #[must_use]
    pub fn delivery(&self, resource: &ResourceRef) -> String {
        format!(
            "{}{}/{}",
            self.external_base_path,
            self.delivery_path.trim_end_matches('/'),
            resource
        )
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::from_config(&UrlConfig::default())
    }
}
