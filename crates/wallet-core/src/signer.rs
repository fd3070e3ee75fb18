use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SignerError {
    pub reason: String,
}

impl SignerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Produces signatures for hashes on behalf of a key the core never sees.
///
/// Implementations may suspend for as long as they need (hardware devices,
/// user confirmation). Signature `i` must belong to hash `i`. For secp256k1
/// chains a signature is the 64-byte compact `r || s`; for Ed25519 it is the
/// standard 64-byte signature over the given payload.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        hashes: &[Vec<u8>],
        public_key: &[u8],
    ) -> Result<Vec<Vec<u8>>, SignerError>;
}
