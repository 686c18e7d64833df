//! Config file parsing for `~/.config/epub2bookizip/config.toml`.
//!
//! Use `convert_options_from_config` to turn the loaded config into the
//! options a conversion runs with.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::convert::ConvertOptions;
use crate::metadata::DEFAULT_SERVER;
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Insert diagnostic markers at spine file boundaries.
    #[serde(default)]
    pub info_markers: bool,
    /// Fail on navigation fragments that match no element.
    #[serde(default)]
    pub strict_anchors: bool,
    #[serde(default = "default_server")]
    pub default_server: String,
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            info_markers: false,
            strict_anchors: false,
            default_server: default_server(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_count: Option<u64>,
    pub max_resource_size_mb: Option<u64>,
    pub max_nesting_depth: Option<u32>,
    pub max_nav_depth: Option<u32>,
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("epub2bookizip");
        p.push("config.toml");
        p
    })
}

/// Load config from the default path. Missing files give the defaults.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

pub fn load_config_from(path: &std::path::Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            debug!(path = %path.display(), %err, "no config file; using defaults");
            return AppConfig::default();
        }
    };
    parse_config(&content).unwrap_or_else(|err| {
        warn!(path = %path.display(), %err, "malformed config file; using defaults");
        AppConfig::default()
    })
}

pub fn parse_config(content: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(count) = c.max_file_count {
        limits.max_file_count = count;
    }
    if let Some(mb) = c.max_resource_size_mb {
        limits.max_resource_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(depth) = c.max_nesting_depth {
        limits.max_nesting_depth = depth;
    }
    if let Some(depth) = c.max_nav_depth {
        limits.max_nav_depth = depth;
    }
    limits
}

pub fn convert_options_from_config(cfg: &AppConfig) -> ConvertOptions {
    ConvertOptions {
        info_markers: cfg.conversion.info_markers,
        strict_anchors: cfg.conversion.strict_anchors,
        default_server: cfg.conversion.default_server.clone(),
        security: security_limits_from_config(&cfg.security),
        source_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.conversion.default_server, "www.booki.cc");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
[conversion]
strict_anchors = true

[security]
max_resource_size_mb = 5
"#,
        )
        .unwrap();
        assert!(cfg.conversion.strict_anchors);
        assert!(!cfg.conversion.info_markers);

        let limits = security_limits_from_config(&cfg.security);
        assert_eq!(limits.max_resource_size_bytes, 5 * 1024 * 1024);
        assert_eq!(limits.max_file_count, SecurityLimits::default().max_file_count);
    }

    #[test]
    fn options_carry_conversion_settings() {
        let mut cfg = AppConfig::default();
        cfg.conversion.info_markers = true;
        cfg.conversion.default_server = "books.example.org".into();
        cfg.security.max_nav_depth = Some(8);
        cfg.security.max_nesting_depth = Some(64);

        let opts = convert_options_from_config(&cfg);
        assert!(opts.info_markers);
        assert_eq!(opts.default_server, "books.example.org");
        assert_eq!(opts.security.max_nav_depth, 8);
        assert_eq!(opts.security.max_nesting_depth, 64);
        assert_eq!(opts.source_id, None);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[conversion\ninfo_markers = yes").unwrap();
        assert_eq!(load_config_from(&path), AppConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = AppConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(parse_config(&text).unwrap(), cfg);
    }
}
