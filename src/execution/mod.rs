//! Execution layer
//!
//! Submits a built transaction along an ordered list of paths. The sponsored
//! path has a separate fee payer co-sign; the direct path resets the fee
//! payer to the agent. The first path that the ledger accepts wins. If every
//! path fails, each path's error is kept in the returned diagnostic.

use crate::config::ExecutionConfig;
use crate::ptb::{AgentTransaction, TransactionData};
use crate::vault::Ledger;
use crate::wallet::{Signers, TransactionSignature};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the fee is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    Sponsored,
    Direct,
}

impl ExecutionPath {
    /// Paths in the order they are tried
    pub const ORDER: [ExecutionPath; 2] = [ExecutionPath::Sponsored, ExecutionPath::Direct];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::Sponsored => "sponsored",
            ExecutionPath::Direct => "direct",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub digest: String,
    pub path: ExecutionPath,
}

pub struct Executor {
    ledger: Arc<dyn Ledger>,
    gas_budget: u64,
}

impl Executor {
    pub fn new(ledger: Arc<dyn Ledger>, config: &ExecutionConfig) -> Self {
        Self {
            ledger,
            gas_budget: config.gas_budget,
        }
    }

    /// Submit `transaction`, trying each path in order.
    ///
    /// A path that returns a digest is never retried, so a submitted
    /// transaction cannot be sent twice.
    pub async fn execute(
        &self,
        transaction: &AgentTransaction,
        signers: Signers<'_>,
    ) -> Result<Execution> {
        let mut failures: Vec<(ExecutionPath, Error)> = Vec::new();

        for path in ExecutionPath::ORDER {
            match self.submit_via(path, transaction, signers).await {
                Ok(digest) => {
                    if !failures.is_empty() {
                        tracing::warn!(
                            path = %path,
                            failed = %describe(&failures),
                            "Executed on fallback path"
                        );
                    }
                    tracing::info!(
                        path = %path,
                        digest = %digest,
                        recipe = %transaction.recipe,
                        ledger = self.ledger.name(),
                        "Transaction submitted"
                    );
                    return Ok(Execution { digest, path });
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Execution path failed");
                    failures.push((path, e));
                }
            }
        }

        Err(Error::ExecutionFailed(describe(&failures)))
    }

    async fn submit_via(
        &self,
        path: ExecutionPath,
        transaction: &AgentTransaction,
        signers: Signers<'_>,
    ) -> Result<String> {
        let agent = signers.agent;
        let sender = agent.address();

        let (data, signatures) = match path {
            ExecutionPath::Sponsored => {
                let sponsor = signers
                    .sponsor
                    .ok_or_else(|| Error::Wallet("no fee sponsor configured".to_string()))?;
                let data = TransactionData::new(
                    transaction.clone(),
                    &sender,
                    &sponsor.address(),
                    self.gas_budget,
                );
                let bytes = data.signing_bytes()?;
                let signatures = vec![agent.sign(&bytes).await?, sponsor.sign(&bytes).await?];
                (data, signatures)
            }
            ExecutionPath::Direct => {
                let data =
                    TransactionData::new(transaction.clone(), &sender, &sender, self.gas_budget);
                let bytes = data.signing_bytes()?;
                let signatures: Vec<TransactionSignature> = vec![agent.sign(&bytes).await?];
                (data, signatures)
            }
        };

        self.ledger.submit(&data, &signatures).await
    }

    /// Await finality of a submitted transaction.
    pub async fn confirm(&self, digest: &str) -> Result<()> {
        self.ledger.wait_for_transaction(digest).await
    }
}

fn describe(failures: &[(ExecutionPath, Error)]) -> String {
    failures
        .iter()
        .map(|(path, e)| format!("{}: {}", path, e))
        .collect::<Vec<_>>()
        .join("; ")
}
