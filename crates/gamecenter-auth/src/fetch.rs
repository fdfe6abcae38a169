//! Certificate download with bounded retry.
//!
//! Only transport failures are retried. A body that downloads but does not
//! parse is returned immediately as [`AuthError::CertificateParse`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT};
use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::config::VerifierConfig;
use crate::error::{AuthError, AuthResult};

const USER_AGENT_VALUE: &str = concat!("gamecenter-auth/", env!("CARGO_PKG_VERSION"));

/// Source of certificates, keyed by URL.
///
/// The cache calls this at most once per key for concurrent first use, and
/// once per key per refresh tick.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn fetch(&self, url: &str) -> AuthResult<Certificate>;
}

/// Fetches certificates over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpCertificateFetcher {
    client: reqwest::Client,
    max_attempts: u32,
    max_body_bytes: usize,
}

impl HttpCertificateFetcher {
    pub fn new(config: &VerifierConfig) -> AuthResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        // Every fetch must observe the live resource.
        default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        default_headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            max_body_bytes: config.max_certificate_bytes,
        })
    }

    async fn fetch_once(&self, url: &str) -> AuthResult<Vec<u8>> {
        let network = |message: String| AuthError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("HTTP {}", status.as_u16())));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(network(format!("response too large: {} bytes", len)));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network(format!("failed to read response body: {}", e)))?;

        if body.len() > self.max_body_bytes {
            return Err(network(format!("response too large: {} bytes", body.len())));
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl CertificateSource for HttpCertificateFetcher {
    async fn fetch(&self, url: &str) -> AuthResult<Certificate> {
        let mut attempt = 1;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(url = %url, attempt, bytes = body.len(), "fetched certificate");
                    return Certificate::parse(&body);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        url = %url,
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        "retrying certificate fetch"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_attempts() {
        let config = VerifierConfig {
            max_attempts: 0,
            ..Default::default()
        };
        let fetcher = HttpCertificateFetcher::new(&config).unwrap();
        assert_eq!(fetcher.max_attempts, 1);
    }
}
