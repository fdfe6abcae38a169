//! Server-side verification of Game Center identity signatures.
//!
//! A client obtains `(publicKeyUrl, signature, salt, timestamp)` from the
//! local player identity API and forwards them with its player and bundle
//! ids. This crate checks that the signature was made by the platform key:
//!
//! - the public key URL host must be the trusted suffix or a subdomain of it
//! - the certificate is fetched once per URL (query ignored) and cached
//! - cached certificates are optionally refreshed in the background
//! - the signature is RSA/SHA-256 over
//!   `player_id || bundle_id || timestamp_be_u64 || salt`
//!
//! # Quick Start
//!
//! ```no_run
//! use gamecenter_auth::{VerificationRequest, Verifier, VerifierConfig};
//!
//! # async fn example() -> Result<(), gamecenter_auth::AuthError> {
//! let verifier = Verifier::new(VerifierConfig::from_env())?;
//! verifier.initialize().await;
//!
//! let request = VerificationRequest::new(
//!     "https://static.gc.apple.com/public-key/gc-prod-2.cer",
//!     "G:1234567890",
//!     "com.example.game",
//!     "1700000000000",
//!     "<base64 signature>",
//!     "<base64 salt>",
//! );
//! if verifier.is_authenticated(&request).await {
//!     // player identity confirmed
//! }
//!
//! verifier.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `GAMECENTER_AUTH_TRUSTED_HOST_SUFFIX` | Trusted key host suffix (default: `apple.com`) |
//! | `GAMECENTER_AUTH_DEFAULT_CERT_URLS` | Certificates preloaded by `initialize()` |
//! | `GAMECENTER_AUTH_CONNECT_TIMEOUT` | Connect timeout in seconds (default: 6) |
//! | `GAMECENTER_AUTH_READ_TIMEOUT` | Read timeout in seconds (default: 6) |
//! | `GAMECENTER_AUTH_MAX_ATTEMPTS` | Fetch attempts per certificate (default: 3) |
//! | `GAMECENTER_AUTH_REFRESH_INTERVAL` | Refresh period in seconds, 0 disables (default: 1800) |
//! | `GAMECENTER_AUTH_ALLOW_INSECURE_HTTP` | Accept `http://` key URLs (dev only) |

pub mod cache;
pub mod certificate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod payload;
pub mod verifier;

pub use cache::{CacheKey, CertificateCache, RefreshReport};
pub use certificate::Certificate;
pub use config::VerifierConfig;
pub use error::{AuthError, AuthResult, FailureKind};
pub use fetch::{CertificateSource, HttpCertificateFetcher};
pub use payload::{build_payload, encode_base64, DecodedFields, VerificationRequest};
pub use verifier::Verifier;
