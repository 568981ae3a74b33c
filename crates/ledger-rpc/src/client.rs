//! Blocking JSON-RPC implementation of [`LedgerClient`].

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use ledger_ix::{
    compile_message, sign_transaction, AccountSnapshot, Address, Commitment,
    ConvergencePredicate, EncodedInstruction, IxError, LedgerClient, Signature, TxSigner,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::RpcConfig;
use crate::wire::{
    b64, parse_response, request, LatestBlockhash, SignatureStatus, UiAccount, WithContext,
};

/// Talks to a single RPC node over HTTP.
#[derive(Debug)]
pub struct RpcLedgerClient {
    http: reqwest::blocking::Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(config: RpcConfig) -> Result<Self, IxError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IxError::Transport(format!("http client: {e}")))?;
        Ok(Self {
            http,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, IxError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&request(id, method, params))
            .send()
            .map_err(|e| IxError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(IxError::Transport(format!("{method}: http {status}: {body}")));
        }

        let body: Value = response
            .json()
            .map_err(|e| IxError::Transport(format!("{method}: response body: {e}")))?;
        parse_response(method, body)
    }

    pub fn latest_blockhash(&self) -> Result<[u8; 32], IxError> {
        let hash: WithContext<LatestBlockhash> = self.call(
            "getLatestBlockhash",
            json!([{ "commitment": self.config.commitment }]),
        )?;
        hash.value.to_bytes()
    }

    /// Send a wire-encoded transaction with preflight simulation on.
    pub fn send_raw(&self, wire: &[u8]) -> Result<Signature, IxError> {
        let signature: String = self.call(
            "sendTransaction",
            json!([
                b64().encode(wire),
                {
                    "encoding": "base64",
                    "skipPreflight": false,
                    "preflightCommitment": self.config.commitment,
                }
            ]),
        )?;
        signature.parse()
    }

    fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, IxError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self.call(
            "getSignatureStatuses",
            json!([[signature.to_string()], { "searchTransactionHistory": true }]),
        )?;
        Ok(statuses.value.into_iter().next().flatten())
    }
}

impl LedgerClient for RpcLedgerClient {
    fn submit(
        &self,
        instructions: &[EncodedInstruction],
        signers: &[&dyn TxSigner],
        commitment: Commitment,
    ) -> Result<Signature, IxError> {
        let fee_payer = signers
            .first()
            .map(|s| s.pubkey())
            .ok_or_else(|| IxError::SigningError("no fee payer".into()))?;

        let blockhash = self.latest_blockhash()?;
        let message = compile_message(instructions, &fee_payer, &blockhash)?;
        let tx = sign_transaction(&message, signers)?;
        let local = tx.signature();

        let returned = self.send_raw(&tx.to_wire()?)?;
        if returned != local {
            return Err(IxError::Transport(format!(
                "node returned signature {returned} for {local}"
            )));
        }
        info!(signature = %local, instructions = instructions.len(), "transaction sent");

        ConvergencePredicate::new(
            format!("transaction {local}"),
            || self.get_status(&local),
            move |reached: &Commitment| reached.satisfies(commitment),
        )
        .with_policy(self.config.confirm)
        .poll()
        .map_err(|e| match e {
            IxError::ConvergenceTimeout { attempts, last_observed, .. } => {
                IxError::SubmissionFailure {
                    message: format!(
                        "transaction {local} not confirmed at {commitment} after {attempts} attempts (last status: {})",
                        last_observed.as_deref().unwrap_or("none"),
                    ),
                    logs: vec![],
                }
            }
            other => other,
        })?;

        info!(signature = %local, %commitment, "transaction confirmed");
        Ok(local)
    }

    fn read_account(
        &self,
        address: &Address,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, IxError> {
        let account: WithContext<Option<UiAccount>> = self.call(
            "getAccountInfo",
            json!([
                address.to_string(),
                { "encoding": "base64", "commitment": commitment }
            ]),
        )?;
        account
            .value
            .map(|a| a.into_snapshot(*address))
            .transpose()
    }

    fn get_status(&self, signature: &Signature) -> Result<Option<Commitment>, IxError> {
        self.signature_status(signature)?
            .map(|s| s.commitment())
            .transpose()
    }

    fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, IxError> {
        self.call(
            "getMinimumBalanceForRentExemption",
            json!([data_len, { "commitment": self.config.commitment }]),
        )
    }
}
