//! JSON-RPC [`ledger_ix::LedgerClient`] over blocking HTTP.
//!
//! Only the calls the workflows need: latest blockhash, send, signature
//! status, account info and the rent-exemption minimum. Transactions are
//! compiled and signed locally by `ledger-ix` and sent base64-encoded with
//! preflight on, so program logs from a failed simulation come back in
//! [`ledger_ix::IxError::SubmissionFailure`].

pub mod client;
pub mod config;
pub mod wire;

pub use client::RpcLedgerClient;
pub use config::{RpcConfig, DEVNET_URL};
