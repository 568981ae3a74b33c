//! Instruction assembly.
//!
//! Combines the selector, the encoded arguments and the resolved accounts of
//! one operation into an [`EncodedInstruction`]: the unit handed to
//! [`crate::transaction::compile_message`] and to a
//! [`crate::ledger::LedgerClient`].

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::descriptor::{OperationDescriptor, ProgramSchema};
use crate::encoder::encode_args;
use crate::error::IxError;
use crate::pda::AddressDeriver;
use crate::resolver::{AccountResolver, ResolvedAccount, RoleBindingTable};
use crate::selector::SELECTOR_LEN;

/// A fully built instruction, ready to compile into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedInstruction {
    pub program_id: Address,
    pub accounts: Vec<ResolvedAccount>,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
}

impl EncodedInstruction {
    pub fn new(program_id: Address, accounts: Vec<ResolvedAccount>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    /// Leading selector bytes, if the data is long enough to carry one.
    pub fn selector(&self) -> Option<[u8; SELECTOR_LEN]> {
        self.data.get(..SELECTOR_LEN)?.try_into().ok()
    }

    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.accounts
            .iter()
            .filter(|a| a.is_signer)
            .map(|a| &a.address)
    }
}

fn serialize_hex<S: serde::Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

/// Build the instruction for `descriptor` from argument values and
/// already-resolved accounts.
pub fn assemble(
    program_id: Address,
    descriptor: &OperationDescriptor,
    values: &[i128],
    accounts: Vec<ResolvedAccount>,
) -> Result<EncodedInstruction, IxError> {
    if accounts.len() != descriptor.accounts.len() {
        return Err(IxError::AccountCountMismatch {
            operation: descriptor.name.clone(),
            expected: descriptor.accounts.len(),
            actual: accounts.len(),
        });
    }

    for (role, account) in descriptor.accounts.iter().zip(&accounts) {
        if role.signer && !account.is_signer {
            return Err(IxError::SignerRequirementViolation {
                role: role.name.clone(),
            });
        }
    }

    let args = encode_args(&descriptor.name, &descriptor.args, values)?;
    let mut data = Vec::with_capacity(SELECTOR_LEN + args.len());
    data.extend_from_slice(&descriptor.selector);
    data.extend_from_slice(&args);

    Ok(EncodedInstruction::new(program_id, accounts, data))
}

/// Schema lookup, account resolution and assembly in one call.
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    program_id: Address,
    schema: Arc<ProgramSchema>,
    resolver: AccountResolver,
}

impl InstructionBuilder {
    pub fn new(program_id: Address, schema: Arc<ProgramSchema>, deriver: AddressDeriver) -> Self {
        Self {
            program_id,
            schema,
            resolver: AccountResolver::new(deriver),
        }
    }

    pub fn program_id(&self) -> Address {
        self.program_id
    }

    pub fn schema(&self) -> &ProgramSchema {
        &self.schema
    }

    pub fn deriver(&self) -> &AddressDeriver {
        self.resolver.deriver()
    }

    pub fn build(
        &self,
        operation: &str,
        table: &RoleBindingTable,
        values: &[i128],
    ) -> Result<EncodedInstruction, IxError> {
        let descriptor = self.schema.operation(operation)?;
        let accounts = self.resolver.resolve(&descriptor.accounts, table)?;
        let ix = assemble(self.program_id, descriptor, values, accounts)?;

        debug!(
            operation = %descriptor.name,
            program = %self.program_id,
            accounts = ix.accounts.len(),
            data = %hex::encode(&ix.data),
            "assembled instruction"
        );
        Ok(ix)
    }
}
