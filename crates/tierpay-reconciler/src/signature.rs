use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("payload is empty")]
    EmptyPayload,

    #[error("signature is not valid hex")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("webhook secret must not be empty")]
    EmptySecret,
}

/// HMAC-SHA256 over the raw request body, hex encoded.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl SignatureVerifier {
    pub fn new(secret: &[u8]) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
        Ok(Self { mac })
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SignatureError::Missing)?;
        if payload.is_empty() {
            return Err(SignatureError::EmptyPayload);
        }

        let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload);
        // constant-time comparison
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}
