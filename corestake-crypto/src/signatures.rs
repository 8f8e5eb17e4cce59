pub use ed25519_dalek::{SigningKey, VerifyingKey};
use corestake_types::{AccountId, SignedPayload, SignedRequest};
use ed25519_dalek::{Signature, Signer, Verifier};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature length: {0}")]
    InvalidLength(usize),
    #[error("signature verification failed")]
    Mismatch,
    #[error("request encoding failed: {0}")]
    Encoding(String),
}

pub fn generate_keypair() -> SigningKey {
    let mut csprng = OsRng;
    SigningKey::generate(&mut csprng)
}

pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = key.sign(message);
    sig.to_bytes().to_vec()
}

pub fn verify_signature(pubkey_bytes: &[u8; 32], message: &[u8], signature_bytes: &[u8]) -> Result<(), SignatureError> {
    let pubkey = VerifyingKey::from_bytes(pubkey_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
    let bytes = <&[u8; 64]>::try_from(signature_bytes).map_err(|_| SignatureError::InvalidLength(signature_bytes.len()))?;
    let signature = Signature::from_bytes(bytes);
    pubkey.verify(message, &signature).map_err(|_| SignatureError::Mismatch)
}

pub fn account_of(key: &SigningKey) -> AccountId {
    AccountId::from_public_key(key.verifying_key().as_bytes())
}

pub fn sign_request(key: &SigningKey, nonce: u64, payload: SignedPayload) -> Result<SignedRequest, SignatureError> {
    let mut request = SignedRequest {
        public_key: key.verifying_key().to_bytes(),
        nonce,
        payload,
        signature: Vec::new(),
    };
    let message = request.signing_bytes().map_err(|e| SignatureError::Encoding(e.to_string()))?;
    request.signature = sign(key, &message);
    Ok(request)
}

/// Checks the request's signature and returns the account it speaks for.
pub fn verify_request(request: &SignedRequest) -> Result<AccountId, SignatureError> {
    let message = request.signing_bytes().map_err(|e| SignatureError::Encoding(e.to_string()))?;
    verify_signature(&request.public_key, &message, &request.signature)?;
    Ok(request.caller())
}
