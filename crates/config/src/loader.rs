use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::schema::AttacheConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "attache.toml",
    "attache.yaml",
    "attache.yml",
    "attache.json",
];

static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AttacheConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply `ATTACHE_*`
/// environment overrides.
///
/// Search order:
/// 1. `./attache.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/attache/attache.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `AttacheConfig::default()` if no file is found or the file
/// does not parse.
pub fn discover_and_load() -> AttacheConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                AttacheConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            AttacheConfig::default()
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Apply `ATTACHE_*` overrides using the given lookup.
///
/// Taking the lookup as a parameter keeps this testable without touching the
/// process environment. Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides(config: &mut AttacheConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup("ATTACHE_DATA_DIR") {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(base) = lookup("ATTACHE_EXTERNAL_BASE_PATH") {
        config.urls.external_base_path = base;
    }
    if let Some(bind) = lookup("ATTACHE_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("ATTACHE_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid ATTACHE_PORT"),
        }
    }
    if let Some(secs) = lookup("ATTACHE_TRANSFORM_TIMEOUT_SECS") {
        match secs.parse() {
            Ok(secs) => config.transforms.timeout_secs = secs,
            Err(e) => {
                warn!(value = %secs, error = %e, "ignoring invalid ATTACHE_TRANSFORM_TIMEOUT_SECS")
            },
        }
    }
    if let Some(bin) = lookup("ATTACHE_PDFTOPPM") {
        config.transforms.pdftoppm = bin;
    }
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/attache/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "attache").map(|d| d.config_dir().to_path_buf())
}

/// Override the data directory for this process (CLI `--data-dir`).
pub fn set_data_dir(dir: PathBuf) {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.lock() {
        *guard = Some(dir);
    }
}

/// Resolve the data directory: process override, then config, then the
/// platform data dir, then `./.attache`.
pub fn data_dir(config: &AttacheConfig) -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE.lock().ok().and_then(|g| g.clone()) {
        return dir;
    }
    if let Some(ref dir) = config.storage.data_dir {
        return dir.clone();
    }
    directories::ProjectDirs::from("", "", "attache")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".attache"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AttacheConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
