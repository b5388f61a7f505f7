/// Config schema types (server, storage, urls, transforms, metrics).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttacheConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub urls: UrlConfig,
    pub transforms: TransformsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8790,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for resources and cached representations. Defaults to the
    /// platform data dir when unset.
    pub data_dir: Option<PathBuf>,
}

/// URL layout of the public surface.
///
/// `external_base_path` is prepended to every generated URL. The store itself
/// builds URLs from `store_base`, which may point into a plugin context; any
/// URL containing `bad_path_marker` is rewritten onto `external_base_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    pub external_base_path: String,
    /// Base the store uses for `src` URLs. Defaults to
    /// `external_base_path + store_path` when unset.
    pub store_base: Option<String>,
    pub bad_path_marker: String,
    pub store_path: String,
    pub plugin_download_path: String,
    pub delivery_path: String,
    pub flavour_path: String,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            external_base_path: String::new(),
            store_base: None,
            bad_path_marker: "/plugins/attachments/src/".into(),
            store_path: "/storage".into(),
            plugin_download_path: "/plugins/attachments/download".into(),
            delivery_path: "/delivery".into(),
            flavour_path: "/flavours".into(),
        }
    }
}

impl UrlConfig {
    /// Base URL handed to the resource store for `src` links.
    #[must_use]
    pub fn effective_store_base(&self) -> String {
        self.store_base
            .clone()
            .unwrap_or_else(|| join_base(&self.external_base_path, &self.store_path))
    }

    /// Base URL for representation (flavour) links.
    #[must_use]
    pub fn flavour_base(&self) -> String {
        join_base(&self.external_base_path, &self.flavour_path)
    }
}

fn join_base(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformsConfig {
    /// Upper bound for a single transform invocation.
    pub timeout_secs: u64,
    /// `pdftoppm` binary used for page extraction.
    pub pdftoppm: String,
    /// Serialize concurrent `ensure` calls for the same cache key.
    pub single_flight: bool,
}

impl Default for TransformsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            pdftoppm: "pdftoppm".into(),
            single_flight: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AttacheConfig = toml::from_str(
            r#"
            [urls]
            external_base_path = "https://lms.example.org/ilias"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8790);
        assert_eq!(cfg.transforms.timeout_secs, 30);
        assert_eq!(cfg.urls.delivery_path, "/delivery");
        assert_eq!(
            cfg.urls.effective_store_base(),
            "https://lms.example.org/ilias/storage"
        );
    }

    #[test]
    fn explicit_store_base_wins() {
        let urls = UrlConfig {
            external_base_path: "https://a.example/".into(),
            store_base: Some("https://a.example/plugins/attachments/src/storage".into()),
            ..Default::default()
        };
        assert_eq!(
            urls.effective_store_base(),
            "https://a.example/plugins/attachments/src/storage"
        );
        assert_eq!(urls.flavour_base(), "https://a.example/flavours");
    }
}
