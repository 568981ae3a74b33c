//! The ledger boundary.
//!
//! Everything in this crate above transaction compilation talks to the
//! network only through [`LedgerClient`], so workflows can run against an
//! in-memory ledger in tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::assembler::EncodedInstruction;
use crate::error::IxError;
use crate::signer::{Signature, TxSigner};

/// How settled a read or a transaction must be.
///
/// Ordered from least to most settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Whether a transaction observed at `self` satisfies `required`.
    pub fn satisfies(self, required: Commitment) -> bool {
        self >= required
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = IxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(IxError::SerializationError(format!(
                "unknown commitment level: {other}"
            ))),
        }
    }
}

/// Raw on-chain account contents at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub address: Address,
    pub owner: Address,
    pub lamports: u64,
    pub data: Vec<u8>,
    pub executable: bool,
}

/// Network access needed by the workflows.
pub trait LedgerClient {
    /// Compile, sign and send `instructions`, then wait until the
    /// transaction reaches `commitment`. The first signer pays fees.
    /// Rejection and failure to confirm are both `SubmissionFailure`.
    fn submit(
        &self,
        instructions: &[EncodedInstruction],
        signers: &[&dyn TxSigner],
        commitment: Commitment,
    ) -> Result<Signature, IxError>;

    /// `Ok(None)` when the account does not exist.
    fn read_account(
        &self,
        address: &Address,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, IxError>;

    /// Highest commitment the transaction has reached, `None` if unknown.
    fn get_status(&self, signature: &Signature) -> Result<Option<Commitment>, IxError>;

    /// Lamports needed to keep an account of `data_len` bytes alive.
    fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, IxError>;
}

impl<L: LedgerClient + ?Sized> LedgerClient for &L {
    fn submit(
        &self,
        instructions: &[EncodedInstruction],
        signers: &[&dyn TxSigner],
        commitment: Commitment,
    ) -> Result<Signature, IxError> {
        (**self).submit(instructions, signers, commitment)
    }

    fn read_account(
        &self,
        address: &Address,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, IxError> {
        (**self).read_account(address, commitment)
    }

    fn get_status(&self, signature: &Signature) -> Result<Option<Commitment>, IxError> {
        (**self).get_status(signature)
    }

    fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, IxError> {
        (**self).minimum_balance_for_rent_exemption(data_len)
    }
}
