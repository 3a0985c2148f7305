use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw callback body.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no webhook secret is configured")]
    NotConfigured,
    #[error("callback carries no signature")]
    Missing,
    #[error("signature is not hex encoded")]
    Malformed,
    #[error("signature does not match the payload")]
    Mismatch,
}

/// Shared secret agreed with the payment gateway for signing callbacks.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        if self.0.is_empty() {
            return Err(SignatureError::NotConfigured);
        }
        HmacSha256::new_from_slice(&self.0).map_err(|_| SignatureError::NotConfigured)
    }

    pub fn sign(&self, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Accepts a bare hex digest or one prefixed with `sha256=`. Comparison is constant time.
    pub fn verify(&self, signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
        let trimmed = signature.trim();
        let digest = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);
        let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"session_id":"cs_1","payment_status":"paid","amount_paid":"100"}"#;

    #[test]
    fn signed_payload_verifies() {
        let secret = WebhookSecret::new("whsec_test");
        let signature = secret.sign(BODY).expect("sign");
        assert_eq!(signature.len(), 64);
        secret.verify(&signature, BODY).expect("matches");
        secret
            .verify(&format!("sha256={signature}"), BODY)
            .expect("prefixed form matches");
    }

    #[test]
    fn altered_payload_or_other_secret_is_rejected() {
        let secret = WebhookSecret::new("whsec_test");
        let signature = secret.sign(BODY).expect("sign");
        let tampered = br#"{"session_id":"cs_1","payment_status":"paid","amount_paid":"999"}"#;
        assert_eq!(secret.verify(&signature, tampered), Err(SignatureError::Mismatch));
        assert_eq!(
            WebhookSecret::new("whsec_other").verify(&signature, BODY),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(secret.verify("not-hex", BODY), Err(SignatureError::Malformed));
    }

    #[test]
    fn empty_secret_never_verifies() {
        let secret = WebhookSecret::new("");
        assert_eq!(secret.sign(BODY), Err(SignatureError::NotConfigured));
        assert_eq!(secret.verify("00ff", BODY), Err(SignatureError::NotConfigured));
        assert_eq!(format!("{secret:?}"), "WebhookSecret(..)");
    }
}
