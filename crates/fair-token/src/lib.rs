//! Client bindings for the fair-token sale program.
//!
//! The program sells a 9-decimal token at 1 lamport per base unit and buys it
//! back at the same rate. This crate knows its IDL, its derived addresses and
//! account layouts, and the operator workflows around it: creating the mint,
//! locking its metadata, initializing the sale, buying and redeeming.
//!
//! Everything goes through [`ledger_ix::LedgerClient`], so the workflows run
//! unchanged against a JSON-RPC node or an in-memory ledger.

pub mod errors;
pub mod metadata;
pub mod operations;
pub mod program;
pub mod spl_token;
pub mod state;
pub mod workflow;

pub use errors::ProgramError;
pub use metadata::{
    create_metadata_instruction, lock_metadata_instruction, metadata_address, MetadataFields,
    MetadataState, TOKEN_METADATA_PROGRAM_ID,
};
pub use operations::{FairTokenProgram, SaleAccounts};
pub use program::{
    embedded_schema, ProgramAddresses, ADMIN, DECIMALS, FAIR_TOKEN_PROGRAM_ID, IDL_JSON,
};
pub use spl_token::{associated_token_address, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};
pub use state::{ConfigState, MintState, TokenAccountState};
pub use workflow::{
    GuardedMutation, MutationOutcome, MutationPhase, SaleReport, SaleState, SaleWorkflow,
    WalletPosition,
};
