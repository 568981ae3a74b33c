//! Operation descriptors.
//!
//! A [`ProgramSchema`] is the parsed form of an Anchor IDL: one
//! [`OperationDescriptor`] per instruction, each listing its account roles
//! and integer arguments in the order the program expects them. The schema
//! is validated once at load time and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::encoder::ArgSpec;
use crate::error::IxError;
use crate::resolver::normalize_role_name;
use crate::selector::{derive_selector, SELECTOR_LEN};

/// One logical account slot in an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRole {
    pub name: String,
    pub signer: bool,
    pub writable: bool,
    /// Fixed address declared by the IDL (well-known programs, sysvars).
    pub address: Option<Address>,
}

impl AccountRole {
    pub fn new(name: impl Into<String>, signer: bool, writable: bool) -> Self {
        Self {
            name: name.into(),
            signer,
            writable,
            address: None,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}

/// Everything needed to build one instruction for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub selector: [u8; SELECTOR_LEN],
    pub accounts: Vec<AccountRole>,
    pub args: Vec<ArgSpec>,
}

impl OperationDescriptor {
    /// Build a descriptor, deriving the selector from `name`.
    pub fn new(
        name: impl Into<String>,
        accounts: Vec<AccountRole>,
        args: Vec<ArgSpec>,
    ) -> Result<Self, IxError> {
        let name = name.into();
        let selector = derive_selector(&name)?;
        Ok(Self {
            name,
            selector,
            accounts,
            args,
        })
    }

    pub fn signer_roles(&self) -> impl Iterator<Item = &AccountRole> {
        self.accounts.iter().filter(|r| r.signer)
    }
}

/// A loaded program interface.
#[derive(Debug, Clone)]
pub struct ProgramSchema {
    name: String,
    program_id: Option<Address>,
    operations: Vec<OperationDescriptor>,
    by_name: HashMap<String, usize>,
    by_normalized: HashMap<String, usize>,
}

impl ProgramSchema {
    /// Build a schema from descriptors.
    ///
    /// Fails if two operations share a name, or collapse onto the same
    /// normalized name.
    pub fn new(
        name: impl Into<String>,
        program_id: Option<Address>,
        operations: Vec<OperationDescriptor>,
    ) -> Result<Self, IxError> {
        let mut by_name = HashMap::with_capacity(operations.len());
        let mut by_normalized = HashMap::with_capacity(operations.len());

        for (i, op) in operations.iter().enumerate() {
            if by_name.insert(op.name.clone(), i).is_some() {
                return Err(IxError::InvalidDescriptor(format!(
                    "operation \"{}\" declared twice",
                    op.name
                )));
            }
            if let Some(prev) = by_normalized.insert(normalize_role_name(&op.name), i) {
                return Err(IxError::InvalidDescriptor(format!(
                    "operations \"{}\" and \"{}\" differ only in spelling",
                    operations[prev].name, op.name
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            program_id,
            operations,
            by_name,
            by_normalized,
        })
    }

    /// Parse an Anchor IDL document.
    ///
    /// Accepts the current layout (`writable`/`signer`, top-level `address`,
    /// explicit `discriminator`) and the legacy `isMut`/`isSigner` keys.
    pub fn from_idl_json(json: &str) -> Result<Self, IxError> {
        let idl: RawIdl = serde_json::from_str(json)
            .map_err(|e| IxError::InvalidDescriptor(format!("idl parse: {e}")))?;
        Self::from_raw(idl)
    }

    fn from_raw(idl: RawIdl) -> Result<Self, IxError> {
        let name = idl
            .metadata
            .map(|m| m.name)
            .or(idl.name)
            .unwrap_or_default();
        let program_id: Option<Address> = idl
            .address
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()?;

        let mut operations = Vec::with_capacity(idl.instructions.len());
        for ix in idl.instructions {
            operations.push(ix.into_descriptor()?);
        }

        Self::new(name, program_id, operations)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program id declared by the IDL, if any.
    pub fn program_id(&self) -> Option<Address> {
        self.program_id
    }

    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    /// Look up an operation by exact name, then by normalized spelling.
    pub fn operation(&self, name: &str) -> Result<&OperationDescriptor, IxError> {
        self.by_name
            .get(name)
            .or_else(|| self.by_normalized.get(&normalize_role_name(name)))
            .map(|&i| &self.operations[i])
            .ok_or_else(|| IxError::UnknownOperation(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// IDL wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawIdl {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    name: Option<String>,
    instructions: Vec<RawInstruction>,
}

#[derive(Deserialize)]
struct RawMetadata {
    name: String,
}

#[derive(Deserialize)]
struct RawInstruction {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(default)]
    accounts: Vec<RawAccount>,
    #[serde(default)]
    args: Vec<RawArg>,
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    #[serde(default, alias = "isMut")]
    writable: bool,
    #[serde(default, alias = "isSigner")]
    signer: bool,
    #[serde(default)]
    address: Option<String>,
    /// Present only on nested account groups, which are not supported.
    #[serde(default)]
    accounts: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawArg {
    name: String,
    #[serde(rename = "type")]
    ty: serde_json::Value,
}

impl RawInstruction {
    fn into_descriptor(self) -> Result<OperationDescriptor, IxError> {
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for raw in self.accounts {
            if raw.accounts.is_some() {
                return Err(IxError::InvalidDescriptor(format!(
                    "{}: nested account group \"{}\" is not supported",
                    self.name, raw.name
                )));
            }
            let mut role = AccountRole::new(raw.name, raw.signer, raw.writable);
            if let Some(addr) = raw.address {
                role = role.with_address(addr.parse::<Address>()?);
            }
            accounts.push(role);
        }

        let mut args = Vec::with_capacity(self.args.len());
        for raw in self.args {
            let spec = raw
                .ty
                .as_str()
                .and_then(|ty| ArgSpec::from_type_name(raw.name.clone(), ty))
                .ok_or_else(|| {
                    IxError::InvalidDescriptor(format!(
                        "{}: argument \"{}\" has unsupported type {}",
                        self.name, raw.name, raw.ty
                    ))
                })?;
            args.push(spec);
        }

        let descriptor = OperationDescriptor::new(self.name, accounts, args)?;

        if let Some(declared) = self.discriminator {
            if declared.as_slice() != descriptor.selector.as_slice() {
                return Err(IxError::InvalidDescriptor(format!(
                    "{}: declared discriminator {} does not match derived {}",
                    descriptor.name,
                    hex::encode(&declared),
                    hex::encode(descriptor.selector)
                )));
            }
        }

        Ok(descriptor)
    }
}
