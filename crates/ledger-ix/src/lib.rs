//! Hand-assembled ledger instructions.
//!
//! This crate builds program instructions at the wire level: 8-byte
//! operation selectors, fixed-width little-endian arguments, role-based
//! account resolution with program-derived addresses, and transaction
//! compilation and signing. No `solana-sdk`: `ed25519-dalek` signs,
//! `curve25519-dalek` checks PDAs are off-curve, `bs58` renders addresses.
//!
//! After a state-changing submission, [`poller::ConvergencePredicate`]
//! re-reads until the ledger reflects the change or a bounded budget runs out.

pub mod address;
pub mod assembler;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod ledger;
pub mod pda;
pub mod poller;
pub mod resolver;
pub mod selector;
pub mod signer;
pub mod transaction;

pub use address::{address_to_bytes, bytes_to_address, validate_address, Address, SYSTEM_PROGRAM_ID};
pub use assembler::{assemble, EncodedInstruction, InstructionBuilder};
pub use descriptor::{AccountRole, OperationDescriptor, ProgramSchema};
pub use encoder::{decode_arg, encode_arg, encode_args, ArgSpec, IntWidth};
pub use error::IxError;
pub use ledger::{AccountSnapshot, Commitment, LedgerClient};
pub use pda::{create_program_address, find_program_address, AddressDeriver};
pub use poller::{ConvergencePredicate, PollPolicy};
pub use resolver::{
    normalize_role_name, AccountResolver, Binding, BindingTarget, ResolvedAccount,
    RoleBindingTable,
};
pub use selector::{account_discriminator, derive_selector, MAX_OPERATION_NAME_LEN};
pub use signer::{Keypair, Signature, TxSigner};
pub use transaction::{compile_message, serialize_message, sign_transaction, Message, SignedTransaction};
