use thiserror::Error;

use crate::address::Address;

/// Errors raised while building, submitting or verifying ledger instructions.
///
/// Every condition is a distinct variant so callers can match on it. Only
/// the poller's bounded re-read loop retries anything; all other variants are
/// surfaced as-is.
#[derive(Debug, Error)]
pub enum IxError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid operation name: {0}")]
    InvalidOperationName(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("missing account binding for role \"{role}\"")]
    MissingAccountBinding { role: String },

    #[error("conflicting bindings for \"{name}\": {existing} vs {new}")]
    ConflictingBinding {
        name: String,
        existing: String,
        new: String,
    },

    #[error("account for role \"{role}\" must be a signer")]
    SignerRequirementViolation { role: String },

    #[error(
        "argument \"{name}\" out of range: {value} does not fit {}",
        int_type_name(.signed, .width)
    )]
    ArgumentRangeError {
        name: String,
        value: i128,
        width: u8,
        signed: bool,
    },

    #[error("operation \"{operation}\" expects {expected} arguments, got {actual}")]
    ArgumentCountMismatch {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("operation \"{operation}\" expects {expected} accounts, got {actual}")]
    AccountCountMismatch {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid seeds: {0}")]
    InvalidSeeds(String),

    #[error("no off-curve address found for program {program_id}")]
    AddressDerivationExhausted { program_id: Address },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("precondition refused: {reason} (observed: {observed})")]
    PreconditionRefused { reason: String, observed: String },

    #[error("{label} did not converge after {attempts} attempts")]
    ConvergenceTimeout {
        label: String,
        attempts: u32,
        last_observed: Option<String>,
    },

    #[error("submission failed: {message}")]
    SubmissionFailure { message: String, logs: Vec<String> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

fn int_type_name(signed: &bool, width: &u8) -> String {
    format!("{}{width}", if *signed { "i" } else { "u" })
}

impl IxError {
    /// The caller declined to mutate state it does not own or understand.
    /// Re-inspect the state before trying again.
    pub fn is_refusal(&self) -> bool {
        matches!(self, IxError::PreconditionRefused { .. })
    }

    /// The mutation may still land; replication lag is the likely cause.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, IxError::ConvergenceTimeout { .. })
    }
}
