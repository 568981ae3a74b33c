//! Token Metadata program: PDA, account header decoding, and the create and
//! lock instructions.

use ledger_ix::{
    Address, AddressDeriver, EncodedInstruction, IxError, ResolvedAccount, SYSTEM_PROGRAM_ID,
};
use serde::Serialize;

use crate::state::ByteReader;

/// Token Metadata Program ID: `metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s`
pub const TOKEN_METADATA_PROGRAM_ID: Address = Address::new([
    0x0b, 0x70, 0x65, 0xb1, 0xe3, 0xd1, 0x7c, 0x45, 0x38, 0x9d, 0x52, 0x7f, 0x6b, 0x04, 0xc3,
    0xcd, 0x58, 0xb8, 0x6c, 0x73, 0x1a, 0xa0, 0xfd, 0xb5, 0x49, 0xb6, 0xd1, 0xbc, 0x03, 0xf8,
    0x29, 0x46,
]);

const METADATA_SEED: &[u8] = b"metadata";
/// `Key::MetadataV1`
const KEY_METADATA_V1: u8 = 4;
const UPDATE_METADATA_ACCOUNT_V2: u8 = 15;
const CREATE_METADATA_ACCOUNT_V3: u8 = 33;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;

/// `["metadata", metadata_program, mint]` under the metadata program.
pub fn metadata_address(deriver: &AddressDeriver, mint: &Address) -> Result<Address, IxError> {
    deriver
        .derive(
            &TOKEN_METADATA_PROGRAM_ID,
            &[METADATA_SEED, TOKEN_METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        )
        .map(|(address, _bump)| address)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Creator {
    pub address: Address,
    pub verified: bool,
    pub share: u8,
}

/// The descriptive fields a mint's metadata is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataFields {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

impl MetadataFields {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            uri: uri.into(),
        }
    }
}

/// A metadata account decoded up to `is_mutable`. Trailing optional fields
/// (edition nonce, token standard, collection, uses) are not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataState {
    pub update_authority: Address,
    pub mint: Address,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub creators: Option<Vec<Creator>>,
    pub primary_sale_happened: bool,
    pub is_mutable: bool,
}

impl MetadataState {
    pub fn unpack(data: &[u8]) -> Result<Self, IxError> {
        let mut r = ByteReader::new(data, "metadata");
        let key = r.u8()?;
        if key != KEY_METADATA_V1 {
            return Err(IxError::InvalidAccountData(format!(
                "metadata: key {key} is not MetadataV1"
            )));
        }
        let update_authority = r.address()?;
        let mint = r.address()?;
        let name = r.padded_string()?;
        let symbol = r.padded_string()?;
        let uri = r.padded_string()?;
        let seller_fee_basis_points = r.u16()?;
        let creators = if r.bool()? {
            let count = r.u32()?;
            let mut creators = Vec::with_capacity(count.min(5) as usize);
            for _ in 0..count {
                creators.push(Creator {
                    address: r.address()?,
                    verified: r.bool()?,
                    share: r.u8()?,
                });
            }
            Some(creators)
        } else {
            None
        };

        Ok(Self {
            update_authority,
            mint,
            name,
            symbol,
            uri,
            seller_fee_basis_points,
            creators,
            primary_sale_happened: r.bool()?,
            is_mutable: r.bool()?,
        })
    }

    /// The authority still able to change this metadata.
    ///
    /// The account always stores an update-authority key, but once
    /// `is_mutable` is false that key can no longer change anything, so it
    /// reads as `None`.
    pub fn authority(&self) -> Option<Address> {
        self.is_mutable.then_some(self.update_authority)
    }

    pub fn is_locked(&self) -> bool {
        !self.is_mutable && self.authority().is_none()
    }

    /// Stored strings are NUL-padded on chain; `unpack` strips that.
    pub fn has_fields(&self, fields: &MetadataFields) -> bool {
        self.name == fields.name && self.symbol == fields.symbol && self.uri == fields.uri
    }
}

/// `UpdateMetadataAccountV2` with every field left unchanged except
/// `is_mutable = Some(false)`.
///
/// # Wire format
///
/// `[15, data: None, update_authority: None, primary_sale_happened: None,
/// is_mutable: Some(false)]` = `[15, 0, 0, 0, 1, 0]`.
pub fn lock_metadata_instruction(
    metadata: &Address,
    update_authority: &Address,
) -> EncodedInstruction {
    EncodedInstruction::new(
        TOKEN_METADATA_PROGRAM_ID,
        vec![
            ResolvedAccount::writable("metadata", *metadata),
            ResolvedAccount::new("update_authority", *update_authority, true, false),
        ],
        vec![UPDATE_METADATA_ACCOUNT_V2, 0, 0, 0, 1, 0],
    )
}

/// `CreateMetadataAccountV3` for a fungible mint: no seller fee, creators,
/// collection or uses, and left mutable so it can be locked afterwards.
///
/// # Wire format
///
/// `[33, name, symbol, uri, fee: u16 = 0, creators: None, collection: None,
/// uses: None, is_mutable: true, collection_details: None]`, strings as a
/// `u32` length followed by UTF-8 bytes.
pub fn create_metadata_instruction(
    metadata: &Address,
    mint: &Address,
    mint_authority: &Address,
    payer: &Address,
    update_authority: &Address,
    fields: &MetadataFields,
) -> Result<EncodedInstruction, IxError> {
    let mut data = vec![CREATE_METADATA_ACCOUNT_V3];
    for (field, value, max) in [
        ("name", fields.name.as_str(), MAX_NAME_LENGTH),
        ("symbol", fields.symbol.as_str(), MAX_SYMBOL_LENGTH),
        ("uri", fields.uri.as_str(), MAX_URI_LENGTH),
    ] {
        if value.len() > max {
            return Err(IxError::TransactionBuildError(format!(
                "metadata {field} is {} bytes, limit {max}",
                value.len()
            )));
        }
        data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        data.extend_from_slice(value.as_bytes());
    }
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&[0, 0, 0]);
    data.push(1);
    data.push(0);

    Ok(EncodedInstruction::new(
        TOKEN_METADATA_PROGRAM_ID,
        vec![
            ResolvedAccount::writable("metadata", *metadata),
            ResolvedAccount::readonly("mint", *mint),
            ResolvedAccount::new("mint_authority", *mint_authority, true, false),
            ResolvedAccount::new("payer", *payer, true, true),
            ResolvedAccount::readonly("update_authority", *update_authority),
            ResolvedAccount::readonly("system_program", SYSTEM_PROGRAM_ID),
        ],
        data,
    ))
}
