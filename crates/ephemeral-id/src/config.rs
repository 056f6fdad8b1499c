//! Configuration types and loading logic.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use ephemeral_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub cookies: CookieConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Upstream the client talks to.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Headers sent with every request before the ephemeral ID is added.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

/// Where the ephemeral ID cookie lives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CookieConfig {
    /// JSON cookie jar. When unset, cookies are kept in memory for this run only.
    #[serde(default)]
    pub jar_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// `default_headers` as a header map.
    pub fn header_map(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            let header_name = HeaderName::try_from(name.as_str())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let header_value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

impl AppConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EPHEMERAL_ prefix, __ for nesting)
    /// 2. TOML config file (a missing file is skipped)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        Self::figment(config_path)
            .extract()
            .with_context(|| format!("failed to load configuration from {config_path}"))
    }

    fn figment(config_path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("EPHEMERAL_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("ephemeral-id-does-not-exist.toml");
        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .extract()
            .unwrap();

        assert_eq!(config.client.base_url, "http://localhost:8080");
        assert_eq!(config.client.timeout_secs, 30);
        assert!(config.cookies.jar_path.is_none());
        assert_eq!(config.tracing.service_name, "ephemeral-id");
    }

    #[test]
    fn test_file_values_are_read() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "ephemeral-id.toml",
                r#"
[client]
base_url = "https://api.example.com"
timeout_secs = 5

[client.default_headers]
accept = "application/vnd.api+json"

[cookies]
jar_path = "/tmp/jar.json"

[tracing]
log_level = "ephemeral_id=debug"
"#,
            )?;

            let config = AppConfig::load("ephemeral-id.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.client.base_url, "https://api.example.com");
            assert_eq!(config.client.timeout_secs, 5);
            assert_eq!(config.cookies.jar_path, Some(PathBuf::from("/tmp/jar.json")));
            assert_eq!(config.tracing.log_level, "ephemeral_id=debug");

            let headers = config.client.header_map().map_err(|e| e.to_string())?;
            assert_eq!(headers["accept"], "application/vnd.api+json");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "ephemeral-id.toml",
                r#"
[client]
base_url = "http://from-file:8080"
timeout_secs = 5
"#,
            )?;
            jail.set_env("EPHEMERAL_CLIENT__BASE_URL", "https://from-env.example.com");
            jail.set_env("EPHEMERAL_COOKIES__JAR_PATH", "/var/lib/ephemeral/jar.json");

            let config = AppConfig::load("ephemeral-id.toml").map_err(|e| e.to_string())?;

            assert_eq!(config.client.base_url, "https://from-env.example.com");
            assert_eq!(config.client.timeout_secs, 5);
            assert_eq!(
                config.cookies.jar_path,
                Some(PathBuf::from("/var/lib/ephemeral/jar.json"))
            );
            Ok(())
        });
    }

    #[test]
    fn test_invalid_default_header_is_rejected() {
        let mut client = ClientConfig::default();
        client
            .default_headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(client.header_map().is_err());
    }
}
