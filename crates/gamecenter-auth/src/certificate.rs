//! Parsed public key certificates.
//!
//! A [`Certificate`] is immutable once loaded. Only RSA subject keys are
//! accepted since the platform signs identity payloads with RSA/SHA-256.
//! Chain of trust and revocation are not checked; the trust decision is
//! made on the URL host before the certificate is ever fetched.

use std::fmt;

use chrono::{DateTime, Utc};
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Digest;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::error::{AuthError, AuthResult};

const PEM_MARKER: &[u8] = b"-----BEGIN";

/// X.509 certificate reduced to what signature verification needs.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: RsaPublicKey,
    subject: String,
    not_after: Option<DateTime<Utc>>,
    fingerprint: String,
}

impl Certificate {
    /// Parse a certificate body, accepting either DER or PEM.
    pub fn parse(bytes: &[u8]) -> AuthResult<Self> {
        if bytes.trim_ascii_start().starts_with(PEM_MARKER) {
            Self::from_pem(bytes)
        } else {
            Self::from_der(bytes)
        }
    }

    /// Parse a PEM encoded `CERTIFICATE` block.
    pub fn from_pem(bytes: &[u8]) -> AuthResult<Self> {
        let (_, pem) = parse_x509_pem(bytes).map_err(|e| AuthError::CertificateParse {
            message: format!("invalid PEM: {}", e),
        })?;

        if pem.label != "CERTIFICATE" {
            return Err(AuthError::CertificateParse {
                message: format!("unexpected PEM label: {}", pem.label),
            });
        }

        Self::from_der(&pem.contents)
    }

    /// Parse a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> AuthResult<Self> {
        let (_, x509) = parse_x509_certificate(der).map_err(|e| AuthError::CertificateParse {
            message: format!("invalid X.509 DER: {}", e),
        })?;

        let public_key = rsa_public_key(&x509)?;
        let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0);

        Ok(Self {
            der: der.to_vec(),
            public_key,
            subject: x509.subject().to_string(),
            not_after,
            fingerprint: hex::encode(sha2::Sha256::digest(der)),
        })
    }

    /// Verify an RSASSA-PKCS1-v1_5 / SHA-256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> AuthResult<()> {
        let signature =
            pkcs1v15::Signature::try_from(signature).map_err(|e| AuthError::Signature {
                message: format!("malformed signature: {}", e),
            })?;

        pkcs1v15::VerifyingKey::<rsa::sha2::Sha256>::new(self.public_key.clone())
            .verify(message, &signature)
            .map_err(|e| AuthError::Signature {
                message: e.to_string(),
            })
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// End of the validity period, informational only.
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_after", &self.not_after)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn rsa_public_key(x509: &X509Certificate<'_>) -> AuthResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(x509.public_key().raw).map_err(|e| {
        AuthError::CertificateParse {
            message: format!("unsupported public key (RSA required): {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;

    const PRIMARY_DER: &[u8] = include_bytes!("../tests/fixtures/primary.cer");
    const PRIMARY_PEM: &[u8] = include_bytes!("../tests/fixtures/primary.cert.pem");
    const PRIMARY_KEY: &str = include_str!("../tests/fixtures/primary.key.pem");
    const ROTATED_DER: &[u8] = include_bytes!("../tests/fixtures/rotated.cer");
    const EC_DER: &[u8] = include_bytes!("../tests/fixtures/ec.cer");

    fn sign(message: &[u8]) -> Vec<u8> {
        let key = RsaPrivateKey::from_pkcs8_pem(PRIMARY_KEY).unwrap();
        pkcs1v15::SigningKey::<rsa::sha2::Sha256>::new(key)
            .sign(message)
            .to_vec()
    }

    #[test]
    fn test_parse_der() {
        let cert = Certificate::parse(PRIMARY_DER).unwrap();
        assert!(cert.subject().contains("gc-test-primary"));
        assert_eq!(cert.fingerprint().len(), 64);
        assert_eq!(cert.der(), PRIMARY_DER);
        assert!(cert.not_after().unwrap() > Utc::now());
    }

    #[test]
    fn test_pem_and_der_are_same_certificate() {
        let der = Certificate::parse(PRIMARY_DER).unwrap();
        let pem = Certificate::parse(PRIMARY_PEM).unwrap();
        assert_eq!(der.fingerprint(), pem.fingerprint());
        assert_eq!(der.public_key(), pem.public_key());
    }

    #[test]
    fn test_garbage_rejected() {
        let result = Certificate::parse(b"<html>503 Service Unavailable</html>");
        assert!(matches!(result, Err(AuthError::CertificateParse { .. })));
    }

    #[test]
    fn test_truncated_der_rejected() {
        let result = Certificate::parse(&PRIMARY_DER[..PRIMARY_DER.len() / 2]);
        assert!(matches!(result, Err(AuthError::CertificateParse { .. })));
    }

    #[test]
    fn test_non_rsa_key_rejected() {
        let result = Certificate::parse(EC_DER);
        match result {
            Err(AuthError::CertificateParse { message }) => {
                assert!(message.contains("RSA required"), "got: {}", message)
            }
            other => panic!("expected CertificateParse, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_signature() {
        let cert = Certificate::parse(PRIMARY_DER).unwrap();
        let signature = sign(b"payload");

        assert!(cert.verify(b"payload", &signature).is_ok());
        assert!(matches!(
            cert.verify(b"payloae", &signature),
            Err(AuthError::Signature { .. })
        ));
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let rotated = Certificate::parse(ROTATED_DER).unwrap();
        let signature = sign(b"payload");

        assert!(matches!(
            rotated.verify(b"payload", &signature),
            Err(AuthError::Signature { .. })
        ));
    }

    #[test]
    fn test_verify_empty_signature() {
        let cert = Certificate::parse(PRIMARY_DER).unwrap();
        assert!(matches!(
            cert.verify(b"payload", &[]),
            Err(AuthError::Signature { .. })
        ));
    }
}
