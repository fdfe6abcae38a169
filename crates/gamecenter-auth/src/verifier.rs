//! Identity signature verification.
//!
//! Check order is fixed: the public key URL is validated against the trusted
//! host suffix before any field is decoded or any certificate is fetched.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::cache::{CacheKey, CertificateCache};
use crate::config::VerifierConfig;
use crate::error::{AuthError, AuthResult};
use crate::fetch::{CertificateSource, HttpCertificateFetcher};
use crate::payload::VerificationRequest;

/// Verifies identity signatures against platform certificates.
#[derive(Debug)]
pub struct Verifier {
    config: VerifierConfig,
    trusted_suffix: String,
    cache: Arc<CertificateCache>,
}

impl Verifier {
    /// Create a verifier that fetches certificates over HTTPS.
    pub fn new(config: VerifierConfig) -> AuthResult<Self> {
        let fetcher = HttpCertificateFetcher::new(&config)?;
        Ok(Self::with_source(config, Arc::new(fetcher)))
    }

    /// Create a verifier backed by a custom certificate source.
    pub fn with_source(config: VerifierConfig, source: Arc<dyn CertificateSource>) -> Self {
        Self::with_cache(config, Arc::new(CertificateCache::new(source)))
    }

    /// Create a verifier sharing an existing cache.
    pub fn with_cache(config: VerifierConfig, cache: Arc<CertificateCache>) -> Self {
        let trusted_suffix = normalize_suffix(&config.trusted_host_suffix);
        Self {
            config,
            trusted_suffix,
            cache,
        }
    }

    pub fn from_env() -> AuthResult<Self> {
        Self::new(VerifierConfig::from_env())
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CertificateCache> {
        &self.cache
    }

    /// Startup hook: preload default certificates and start refresh.
    ///
    /// Never fails. A certificate that cannot be preloaded is fetched lazily
    /// by the first verification that needs it.
    pub async fn initialize(&self) {
        let loaded = self
            .cache
            .preload(&self.config.default_certificate_urls)
            .await;
        info!(
            loaded,
            configured = self.config.default_certificate_urls.len(),
            "certificate cache initialized"
        );

        if let Some(period) = self.config.refresh_interval() {
            if let Err(e) = self.cache.start_refresh(period).await {
                warn!(error = %e, "certificate refresh not started");
            }
        }
    }

    /// Shutdown hook: stop background refresh. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.cache.stop_refresh().await;
    }

    /// Whether the request carries a valid platform signature.
    ///
    /// Every failure, including an unreachable certificate host, is `false`.
    /// The cause is logged; use [`Verifier::verify`] to inspect it.
    pub async fn is_authenticated(&self, request: &VerificationRequest) -> bool {
        match self.verify(request).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    kind = %e.kind(),
                    error = %e,
                    player_id = %request.player_id,
                    bundle_id = %request.bundle_id,
                    "Game Center authentication failed"
                );
                false
            }
        }
    }

    /// Verify a request, reporting why it failed.
    pub async fn verify(&self, request: &VerificationRequest) -> AuthResult<()> {
        debug!(
            public_key_url = %request.public_key_url,
            player_id = %request.player_id,
            bundle_id = %request.bundle_id,
            timestamp = %request.timestamp,
            "verifying identity signature"
        );

        let key = self.trusted_key(&request.public_key_url)?;
        let fields = request.decode()?;
        let certificate = self.cache.get_or_fetch(&key).await?;
        let payload = request.payload(&fields);

        certificate.verify(&payload, &fields.signature)
    }

    /// Derive the cache key for `public_key_url` if its host is trusted.
    pub fn trusted_key(&self, public_key_url: &str) -> AuthResult<CacheKey> {
        let key = CacheKey::from_url(public_key_url);
        let invalid = |message: String| AuthError::InvalidUrl {
            url: key.to_string(),
            message,
        };

        let url = Url::parse(key.as_str()).map_err(|e| invalid(e.to_string()))?;

        match url.scheme() {
            "https" => {}
            "http" if self.config.allow_insecure_http => {}
            other => return Err(invalid(format!("unsupported scheme: {}", other))),
        }

        let trusted = match url.host() {
            Some(Host::Domain(domain)) => is_trusted_domain(domain, &self.trusted_suffix),
            // Addresses have no subdomains.
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
                url.host_str() == Some(self.trusted_suffix.as_str())
            }
            None => return Err(invalid("missing host".to_string())),
        };

        if !trusted {
            return Err(AuthError::UntrustedHost {
                url: key.to_string(),
                host: url.host_str().unwrap_or_default().to_string(),
            });
        }

        Ok(key)
    }
}

fn normalize_suffix(suffix: &str) -> String {
    suffix
        .trim()
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// `domain` equals `suffix` or is a subdomain of it.
fn is_trusted_domain(domain: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }

    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == suffix
        || domain
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.'))
}
