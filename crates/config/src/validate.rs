//! Semantic validation of a loaded configuration.

use crate::schema::AttacheConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "urls.delivery_path"
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Check invariants serde cannot express.
#[must_use]
pub fn validate(config: &AttacheConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.server.bind.trim().is_empty() {
        result.push(Severity::Error, "server.bind", "bind address is empty");
    }

    let urls = &config.urls;
    for (path, value) in [
        ("urls.store_path", &urls.store_path),
        ("urls.plugin_download_path", &urls.plugin_download_path),
        ("urls.delivery_path", &urls.delivery_path),
        ("urls.flavour_path", &urls.flavour_path),
    ] {
        if !value.starts_with('/') {
            result.push(Severity::Error, path, format!("must start with '/': {value:?}"));
        }
    }
    if urls.bad_path_marker.is_empty() {
        result.push(
            Severity::Warning,
            "urls.bad_path_marker",
            "empty marker disables store URL repair",
        );
    }

    if config.transforms.timeout_secs == 0 {
        result.push(
            Severity::Error,
            "transforms.timeout_secs",
            "timeout must be greater than zero",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let result = validate(&AttacheConfig::default());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn flags_relative_paths_and_zero_timeout() {
        let mut cfg = AttacheConfig::default();
        cfg.urls.delivery_path = "delivery".into();
        cfg.transforms.timeout_secs = 0;
        let result = validate(&cfg);
        assert!(result.has_errors());
        let paths: Vec<_> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"urls.delivery_path"));
        assert!(paths.contains(&"transforms.timeout_secs"));
    }

    #[test]
    fn empty_marker_is_only_a_warning() {
        let mut cfg = AttacheConfig::default();
        cfg.urls.bad_path_marker.clear();
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }
}
