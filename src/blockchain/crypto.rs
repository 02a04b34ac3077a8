use once_cell::sync::Lazy;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Computes the SHA-256 digest of `data` as a lowercase hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Represents a wallet address (hex-encoded uncompressed public key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(hex::encode(public_key.serialize_uncompressed()))
    }

    /// Converts the address back to a public key
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let bytes =
            hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        PublicKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a DER-encoded ECDSA signature in hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(&*signature.serialize_der()))
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes =
            hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Signature::from_der(&bytes).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

/// Hashes `message` and wraps the digest for signing
fn digest_message(message: &[u8]) -> Message {
    let digest: [u8; 32] = Sha256::digest(message).into();
    Message::from_digest(digest)
}

/// Represents a wallet with a secp256k1 keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret_key(secret_key)
    }

    fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);
        let address = Address::from_public_key(&public_key);

        Wallet {
            secret_key,
            public_key,
            address,
        }
    }

    /// Restores a wallet from a hex-encoded private key.
    ///
    /// The address is always re-derived from the key material.
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(private_key_hex.trim())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's public key in hex (same encoding as the address)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    /// Signs a message with the wallet's private key.
    ///
    /// The message is hashed with SHA-256 before signing.
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature = SECP256K1.sign_ecdsa(&digest_message(message), &self.secret_key);
        DigitalSignature::from_signature(&signature)
    }

    /// Exports the wallet's private key as hex
    pub fn export_private_key(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a signature against a message and the signer's address
pub fn verify_signature(
    address: &Address,
    message: &[u8],
    signature: &DigitalSignature,
) -> Result<bool, CryptoError> {
    let public_key = address.to_public_key()?;
    let signature = signature.to_signature()?;

    Ok(SECP256K1
        .verify_ecdsa(&digest_message(message), &signature, &public_key)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::new();
        // 0x04 prefix + 64 bytes of coordinates
        assert_eq!(wallet.address().0.len(), 130);
        assert!(wallet.address().0.starts_with("04"));
        assert_eq!(wallet.public_key_hex(), wallet.address().0);
    }

    #[test]
    fn test_signing_and_verification() {
        let wallet = Wallet::new();
        let message = b"Hello, world!";

        let signature = wallet.sign(message);

        assert!(verify_signature(wallet.address(), message, &signature).unwrap());
        assert!(!verify_signature(wallet.address(), b"Wrong message", &signature).unwrap());

        let other = Wallet::new();
        assert!(!verify_signature(other.address(), message, &signature).unwrap());
    }

    #[test]
    fn test_private_key_round_trip() {
        let wallet = Wallet::new();
        let restored = Wallet::from_private_key(&wallet.export_private_key()).unwrap();

        assert_eq!(restored.address(), wallet.address());

        let signature = restored.sign(b"payload");
        assert!(verify_signature(wallet.address(), b"payload", &signature).unwrap());
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(matches!(
            Wallet::from_private_key("not-hex"),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            Wallet::from_private_key(&"00".repeat(32)),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_address_conversion() {
        let wallet = Wallet::new();
        let public_key = wallet.address().to_public_key().unwrap();
        assert_eq!(&Address::from_public_key(&public_key), wallet.address());

        assert!(Address("zz".to_string()).to_public_key().is_err());
        assert!(Address("0400".to_string()).to_public_key().is_err());
    }

    #[test]
    fn test_malformed_signature() {
        let wallet = Wallet::new();
        let bogus = DigitalSignature("3006020101020101".to_string());
        let result = verify_signature(wallet.address(), b"x", &bogus);
        // Either rejected at parse time or fails verification
        assert!(!matches!(result, Ok(true)));
    }
}
