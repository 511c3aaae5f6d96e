//! Ledger collaborator
//!
//! The engine only reads vault state and submits signed transactions; the
//! ledger's contract is the final authority on every spend.

use super::Vault;
use crate::ptb::TransactionData;
use crate::wallet::TransactionSignature;
use crate::Result;
use async_trait::async_trait;

/// Read-committed access to vault objects plus transaction submission
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Last confirmed state of a vault. Fails with `NotFound`.
    async fn get_vault(&self, vault_id: &str) -> Result<Vault>;

    /// Submit a signed transaction, returning its digest.
    ///
    /// A sponsored transaction carries both the sender's and the gas owner's
    /// signatures.
    async fn submit(
        &self,
        data: &TransactionData,
        signatures: &[TransactionSignature],
    ) -> Result<String>;

    /// Block until the transaction is final.
    async fn wait_for_transaction(&self, digest: &str) -> Result<()>;

    /// Name for logging
    fn name(&self) -> &'static str;
}
