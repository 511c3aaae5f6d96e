//! Key material handles
//!
//! SECURITY: This is the ONLY place where private keys exist.
//! - Keys are held in alloy's PrivateKeySigner
//! - Keys are never serialized and never logged
//! - Callers only ever see addresses and signatures

use crate::{Error, Result};
use alloy::primitives::{keccak256, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A signature over transaction bytes, tagged with its signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub signer: String,
    pub signature: String,
}

/// Anything that can sign transaction bytes
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Public address (safe to share)
    fn address(&self) -> String;

    async fn sign(&self, bytes: &[u8]) -> Result<TransactionSignature>;
}

/// Signer backed by a local private key
pub struct SecureWallet {
    signer: PrivateKeySigner,
    address: String,
}

impl SecureWallet {
    /// Create a wallet from an environment variable holding a hex key
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key_hex = std::env::var(var_name).map_err(|_| {
            Error::Wallet(format!(
                "Environment variable {} not set. Required for wallet initialization.",
                var_name
            ))
        })?;

        Self::from_hex(&key_hex)
    }

    /// Like [`SecureWallet::from_env`], but a missing variable is not an error
    pub fn optional_from_env(var_name: &str) -> Result<Option<Self>> {
        match std::env::var(var_name) {
            Ok(key) if !key.trim().is_empty() => Self::from_hex(&key).map(Some),
            _ => Ok(None),
        }
    }

    /// Create a wallet from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;
        let address = format!("{:#x}", signer.address());

        Ok(Self { signer, address })
    }

    /// Fresh random key, for demo runs
    pub fn random() -> Self {
        let signer = PrivateKeySigner::random();
        let address = format!("{:#x}", signer.address());
        Self { signer, address }
    }

    fn sign_digest(&self, digest: B256) -> Result<alloy::signers::Signature> {
        self.signer
            .sign_hash_sync(&digest)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))
    }
}

#[async_trait]
impl TransactionSigner for SecureWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign(&self, bytes: &[u8]) -> Result<TransactionSignature> {
        let signature = self.sign_digest(keccak256(bytes))?;
        Ok(TransactionSignature {
            signer: self.address.clone(),
            signature: signature.to_string(),
        })
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_hex() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            SecureWallet::from_hex("0xnotakey"),
            Err(Error::Wallet(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", wallet);

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_signature_depends_on_bytes() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let a = wallet.sign(b"transaction a").await.unwrap();
        let b = wallet.sign(b"transaction b").await.unwrap();
        let a_again = wallet.sign(b"transaction a").await.unwrap();

        assert_eq!(a.signer, wallet.address());
        assert_ne!(a.signature, b.signature);
        assert_eq!(a, a_again);
    }
}
