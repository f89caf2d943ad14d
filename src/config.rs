//! Process configuration: YAML file plus environment variable overlay.
//!
//! Grounded on the teacher's own `config::merge_settings` shape (fallback
//! settings merged with primary, primary winning field-by-field) but
//! reimplemented over this crate's `BridgeConfig`/YAML shape — the
//! teacher's own config is TOML-via-`toml`, the bridge speaks YAML via
//! `serde_yaml` per the Agent Communication Bridge's own deployment
//! convention.

use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_endpoint() -> String {
    "http://127.0.0.1:50051".to_string()
}

fn default_http_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Where and how to reach the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

/// The HTTP shim's listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
        }
    }
}

/// Merge two partially-specified configs, preferring `primary` over
/// `fallback` field-by-field. Mirrors the teacher's own
/// `merge_settings(fallback, primary)` precedence rule.
fn merge_configs(fallback: BridgeConfig, primary: BridgeConfigPartial) -> BridgeConfig {
    BridgeConfig {
        coordinator: CoordinatorConfig {
            endpoint: primary
                .coordinator
                .and_then(|c| c.endpoint)
                .unwrap_or(fallback.coordinator.endpoint),
        },
        http: HttpConfig {
            bind: primary
                .http
                .and_then(|h| h.bind)
                .unwrap_or(fallback.http.bind),
        },
    }
}

/// Deserialization target for a YAML file, where every field is optional
/// so a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct BridgeConfigPartial {
    #[serde(default)]
    coordinator: Option<CoordinatorConfigPartial>,
    #[serde(default)]
    http: Option<HttpConfigPartial>,
}

#[derive(Debug, Default, Deserialize)]
struct CoordinatorConfigPartial {
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpConfigPartial {
    bind: Option<String>,
}

/// Load configuration: start from built-in defaults, overlay a YAML file
/// if `path` is given and exists, then overlay environment variables
/// (`BUCKLEY_COORDINATOR_ENDPOINT`, `BUCKLEY_HTTP_BIND`), which always win.
pub fn load(path: Option<&Path>) -> Result<BridgeConfig, crate::error::BridgeError> {
    let mut config = BridgeConfig::default();

    if let Some(path) = path
        && path.exists()
    {
        let contents = std::fs::read_to_string(path).map_err(crate::error::BridgeError::Io)?;
        let partial: BridgeConfigPartial = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::BridgeError::Parse(format!("invalid config YAML: {e}")))?;
        config = merge_configs(config, partial);
    }

    if let Ok(endpoint) = std::env::var("BUCKLEY_COORDINATOR_ENDPOINT") {
        config.coordinator.endpoint = endpoint;
    }
    if let Ok(bind) = std::env::var("BUCKLEY_HTTP_BIND") {
        config.http.bind = bind;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_used_when_no_file_and_no_env() {
        // SAFETY: test runs single-threaded-enough for this narrow check;
        // avoid touching env vars that other tests might rely on.
        let config = BridgeConfig::default();
        assert_eq!(config.coordinator.endpoint, default_endpoint());
        assert_eq!(config.http.bind, default_http_bind());
    }

    #[test]
    fn yaml_file_overrides_defaults_for_named_fields_only() {
        let yaml = "coordinator:\n  endpoint: http://example:9000\n";
        let partial: BridgeConfigPartial = serde_yaml::from_str(yaml).unwrap();
        let merged = merge_configs(BridgeConfig::default(), partial);
        assert_eq!(merged.coordinator.endpoint, "http://example:9000");
        assert_eq!(merged.http.bind, default_http_bind());
    }

    #[test]
    fn primary_wins_over_fallback_when_both_specify_a_field() {
        let fallback = BridgeConfig {
            coordinator: CoordinatorConfig {
                endpoint: "http://fallback:1".into(),
            },
            http: HttpConfig::default(),
        };
        let partial = BridgeConfigPartial {
            coordinator: Some(CoordinatorConfigPartial {
                endpoint: Some("http://primary:2".into()),
            }),
            http: None,
        };
        let merged = merge_configs(fallback, partial);
        assert_eq!(merged.coordinator.endpoint, "http://primary:2");
    }
}
