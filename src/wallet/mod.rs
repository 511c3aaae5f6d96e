//! Signer handles
//!
//! The agent signer and the optional fee-sponsor signer are owned by the
//! caller and lent to the execution layer by reference. Private keys never
//! leave this module.

mod signer;

pub use signer::{SecureWallet, TransactionSignature, TransactionSigner};

/// Signers lent to one run
#[derive(Clone, Copy)]
pub struct Signers<'a> {
    pub agent: &'a dyn TransactionSigner,
    pub sponsor: Option<&'a dyn TransactionSigner>,
}

impl<'a> Signers<'a> {
    pub fn new(agent: &'a dyn TransactionSigner, sponsor: Option<&'a dyn TransactionSigner>) -> Self {
        Self { agent, sponsor }
    }
}
