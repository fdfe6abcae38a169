//! Verifier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::Verifier`] and its certificate cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Host suffix a public key URL must match (exactly or as a subdomain).
    #[serde(default = "default_trusted_host_suffix")]
    pub trusted_host_suffix: String,

    /// Certificates loaded eagerly by `initialize()`.
    #[serde(default = "default_certificate_urls")]
    pub default_certificate_urls: Vec<String>,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_timeout")]
    pub read_timeout_secs: u64,

    /// Total fetch attempts per certificate (initial request plus retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Background refresh period in seconds. Zero disables refresh.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Upper bound on a certificate response body.
    #[serde(default = "default_max_certificate_bytes")]
    pub max_certificate_bytes: usize,

    /// Accept `http://` public key URLs (tests and local mirrors only).
    #[serde(default)]
    pub allow_insecure_http: bool,
}

fn default_trusted_host_suffix() -> String {
    "apple.com".to_string()
}

fn default_certificate_urls() -> Vec<String> {
    vec!["https://static.gc.apple.com/public-key/gc-prod-2.cer".to_string()]
}

fn default_timeout() -> u64 {
    6
}

fn default_max_attempts() -> u32 {
    3
}

fn default_refresh_interval() -> u64 {
    30 * 60
}

fn default_max_certificate_bytes() -> usize {
    64 * 1024
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            trusted_host_suffix: default_trusted_host_suffix(),
            default_certificate_urls: default_certificate_urls(),
            connect_timeout_secs: default_timeout(),
            read_timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            refresh_interval_secs: default_refresh_interval(),
            max_certificate_bytes: default_max_certificate_bytes(),
            allow_insecure_http: false,
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `GAMECENTER_AUTH_TRUSTED_HOST_SUFFIX` | Trusted public key host suffix |
    /// | `GAMECENTER_AUTH_DEFAULT_CERT_URLS` | Comma separated URLs loaded at startup |
    /// | `GAMECENTER_AUTH_CONNECT_TIMEOUT` | Connect timeout in seconds |
    /// | `GAMECENTER_AUTH_READ_TIMEOUT` | Read timeout in seconds |
    /// | `GAMECENTER_AUTH_MAX_ATTEMPTS` | Fetch attempts per certificate |
    /// | `GAMECENTER_AUTH_REFRESH_INTERVAL` | Refresh period in seconds (0 disables) |
    /// | `GAMECENTER_AUTH_ALLOW_INSECURE_HTTP` | Accept `http://` key URLs (dev only) |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            trusted_host_suffix: std::env::var("GAMECENTER_AUTH_TRUSTED_HOST_SUFFIX")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.trusted_host_suffix),
            default_certificate_urls: std::env::var("GAMECENTER_AUTH_DEFAULT_CERT_URLS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.default_certificate_urls),
            connect_timeout_secs: env_parse("GAMECENTER_AUTH_CONNECT_TIMEOUT")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.connect_timeout_secs),
            read_timeout_secs: env_parse("GAMECENTER_AUTH_READ_TIMEOUT")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.read_timeout_secs),
            max_attempts: env_parse("GAMECENTER_AUTH_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            refresh_interval_secs: env_parse("GAMECENTER_AUTH_REFRESH_INTERVAL")
                .unwrap_or(defaults.refresh_interval_secs),
            max_certificate_bytes: defaults.max_certificate_bytes,
            allow_insecure_http: std::env::var("GAMECENTER_AUTH_ALLOW_INSECURE_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Set the trusted host suffix.
    pub fn with_trusted_host_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.trusted_host_suffix = suffix.into();
        self
    }

    /// Replace the startup certificate list.
    pub fn with_default_certificate_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_certificate_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the refresh period. `Duration::ZERO` disables refresh.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_secs = interval.as_secs();
        self
    }

    /// Set total fetch attempts (clamped to at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Allow `http://` public key URLs.
    pub fn with_allow_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Refresh period, or `None` when refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "GAMECENTER_AUTH_TRUSTED_HOST_SUFFIX",
        "GAMECENTER_AUTH_DEFAULT_CERT_URLS",
        "GAMECENTER_AUTH_CONNECT_TIMEOUT",
        "GAMECENTER_AUTH_READ_TIMEOUT",
        "GAMECENTER_AUTH_MAX_ATTEMPTS",
        "GAMECENTER_AUTH_REFRESH_INTERVAL",
        "GAMECENTER_AUTH_ALLOW_INSECURE_HTTP",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = VerifierConfig::default();
        assert_eq!(config.trusted_host_suffix, "apple.com");
        assert_eq!(
            config.default_certificate_urls,
            vec!["https://static.gc.apple.com/public-key/gc-prod-2.cer"]
        );
        assert_eq!(config.connect_timeout(), Duration::from_secs(6));
        assert_eq!(config.read_timeout(), Duration::from_secs(6));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(1800)));
        assert!(!config.allow_insecure_http);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{"trusted_host_suffix": "example.com"}"#).unwrap();
        assert_eq!(config.trusted_host_suffix, "example.com");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.default_certificate_urls.len(), 1);
    }

    #[test]
    fn test_zero_interval_disables_refresh() {
        let config = VerifierConfig::default().with_refresh_interval(Duration::ZERO);
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn test_max_attempts_clamped() {
        let config = VerifierConfig::default().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("GAMECENTER_AUTH_TRUSTED_HOST_SUFFIX", "gc.example.com");
        std::env::set_var(
            "GAMECENTER_AUTH_DEFAULT_CERT_URLS",
            "https://a.gc.example.com/1.cer, https://b.gc.example.com/2.cer,",
        );
        std::env::set_var("GAMECENTER_AUTH_MAX_ATTEMPTS", "5");
        std::env::set_var("GAMECENTER_AUTH_REFRESH_INTERVAL", "0");
        std::env::set_var("GAMECENTER_AUTH_ALLOW_INSECURE_HTTP", "true");

        let config = VerifierConfig::from_env();
        clear_env();

        assert_eq!(config.trusted_host_suffix, "gc.example.com");
        assert_eq!(
            config.default_certificate_urls,
            vec![
                "https://a.gc.example.com/1.cer",
                "https://b.gc.example.com/2.cer"
            ]
        );
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.refresh_interval(), None);
        assert!(config.allow_insecure_http);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("GAMECENTER_AUTH_CONNECT_TIMEOUT", "soon");
        std::env::set_var("GAMECENTER_AUTH_MAX_ATTEMPTS", "0");

        let config = VerifierConfig::from_env();
        clear_env();

        assert_eq!(config, VerifierConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_zero_timeouts_fall_back() {
        clear_env();
        std::env::set_var("GAMECENTER_AUTH_CONNECT_TIMEOUT", "0");
        std::env::set_var("GAMECENTER_AUTH_READ_TIMEOUT", "0");

        let config = VerifierConfig::from_env();
        clear_env();

        assert_eq!(config.connect_timeout(), Duration::from_secs(6));
        assert_eq!(config.read_timeout(), Duration::from_secs(6));
    }

    #[test]
    #[serial]
    fn test_from_env_timeouts() {
        clear_env();
        std::env::set_var("GAMECENTER_AUTH_CONNECT_TIMEOUT", "2");
        std::env::set_var("GAMECENTER_AUTH_READ_TIMEOUT", " 10 ");

        let config = VerifierConfig::from_env();
        clear_env();

        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
    }
}
