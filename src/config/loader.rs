//! File-based config loading.
//!
//! [`load_file`] reads a config file asynchronously and deserializes it
//! according to its extension. YAML is always available through the default
//! feature set; JSON and TOML are gated behind the `json` and `toml`
//! features. Loading does not validate: overrides from flags and env are
//! applied first, then the merged config is validated once.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::model::GatekeeperConfig;
use crate::error::GatekeeperError;

/// File names probed in the working directory when no `--config` is given.
pub const AUTO_DETECT_CANDIDATES: &[&str] = &[
    "specimen-gate.yaml",
    "specimen-gate.yml",
    "specimen-gate.json",
    "specimen-gate.toml",
];

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<GatekeeperConfig, GatekeeperError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| GatekeeperError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| GatekeeperError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| GatekeeperError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(GatekeeperError::UnsupportedFormat(other.to_string())),
    }
}

pub async fn load_file(path: &Path) -> Result<GatekeeperConfig, GatekeeperError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatekeeperError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GatekeeperError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parse_config_str(ext, &content, &path.display().to_string())
}

/// Find the first auto-detect candidate present in the working directory.
pub async fn detect_config_file() -> Option<PathBuf> {
    for name in AUTO_DETECT_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some(path);
        }
    }
    None
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Stable digest of the effective config, reported by the health endpoint
/// so operators can tell whether two instances run the same settings.
#[must_use]
pub fn fingerprint(config: &GatekeeperConfig) -> String {
    // Every field is a plain value or ordered collection, so serialization cannot fail.
    let canonical = serde_json::to_vec(config).unwrap_or_default();
    sha256_hex(&canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse_config_str("xml", "<config/>", "gate.xml").unwrap_err();
        assert!(matches!(err, GatekeeperError::UnsupportedFormat(ref ext) if ext == "xml"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_overrides_selected_fields() {
        let content = "rate_limit:\n  sustained_limit: 5\n  whitelist: [\"10.0.0.1\"]\nsecurity:\n  hsts_enabled: true\n";
        let config = parse_config_str("yaml", content, "gate.yaml").unwrap();
        assert_eq!(config.rate_limit.sustained_limit, 5);
        assert_eq!(config.rate_limit.burst_limit, 10);
        assert!(config.rate_limit.whitelist.contains("10.0.0.1"));
        assert!(config.security.hsts_enabled);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_parse_error_names_the_file() {
        let err = parse_config_str("yaml", "rate_limit: [", "broken.yaml").unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = load_file(Path::new("does-not-exist/specimen-gate.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let base = GatekeeperConfig::default();
        let mut changed = base.clone();
        changed.security.hsts_enabled = true;

        assert_eq!(fingerprint(&base), fingerprint(&base.clone()));
        assert_ne!(fingerprint(&base), fingerprint(&changed));
        assert_eq!(fingerprint(&base).len(), 64);
    }
}
