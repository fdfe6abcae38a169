//! Error types for identity verification.

/// Verification errors.
///
/// Every variant is collapsed to `false` by [`crate::Verifier::is_authenticated`];
/// the variant only surfaces through [`crate::Verifier::verify`] and logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Certificate could not be downloaded after all attempts.
    #[error("failed to fetch certificate from {url}: {message}")]
    Fetch { url: String, message: String },

    /// Response body is not a usable X.509 certificate.
    #[error("invalid certificate: {message}")]
    CertificateParse { message: String },

    /// Public key URL host is outside the trusted suffix.
    #[error("untrusted public key host {host} in {url}")]
    UntrustedHost { url: String, host: String },

    /// Public key URL could not be parsed or uses a rejected scheme.
    #[error("invalid public key url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// A request field could not be decoded.
    #[error("failed to decode {field}: {message}")]
    Decode {
        field: &'static str,
        message: String,
    },

    /// Signature did not verify against the certificate key.
    #[error("signature verification failed: {message}")]
    Signature { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Coarse failure category, stable for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Fetch,
    CertificateParse,
    UntrustedHost,
    InvalidUrl,
    Decode,
    Signature,
    Config,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::CertificateParse => "certificate_parse",
            Self::UntrustedHost => "untrusted_host",
            Self::InvalidUrl => "invalid_url",
            Self::Decode => "decode",
            Self::Signature => "signature",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch { .. } => FailureKind::Fetch,
            Self::CertificateParse { .. } => FailureKind::CertificateParse,
            Self::UntrustedHost { .. } => FailureKind::UntrustedHost,
            Self::InvalidUrl { .. } => FailureKind::InvalidUrl,
            Self::Decode { .. } => FailureKind::Decode,
            Self::Signature { .. } => FailureKind::Signature,
            Self::Config { .. } => FailureKind::Config,
        }
    }

    /// Whether the error is retryable.
    ///
    /// Parse errors are not transient; only network failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// Result type for verification operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_fetch_is_retryable() {
        let fetch = AuthError::Fetch {
            url: "https://static.gc.apple.com/a.cer".to_string(),
            message: "connection reset".to_string(),
        };
        let parse = AuthError::CertificateParse {
            message: "truncated".to_string(),
        };

        assert!(fetch.is_retryable());
        assert!(!parse.is_retryable());
    }

    #[test]
    fn test_kind_and_display() {
        let err = AuthError::Decode {
            field: "salt",
            message: "Invalid padding".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::Decode);
        assert_eq!(err.kind().to_string(), "decode");
        assert_eq!(err.to_string(), "failed to decode salt: Invalid padding");
    }
}
