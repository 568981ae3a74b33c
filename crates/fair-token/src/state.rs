//! On-chain account layouts.
//!
//! Decoders for the three account kinds the workflows inspect: the SPL
//! `Mint`, SPL token accounts, and the program's own `Config`. Metaplex
//! metadata lives in [`crate::metadata`].

use ledger_ix::{account_discriminator, Address, IxError};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Byte reader
// ---------------------------------------------------------------------------

/// Little-endian cursor over account data. Every short read is an
/// [`IxError::InvalidAccountData`] naming the account kind.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], IxError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(IxError::InvalidAccountData(format!(
                "{}: need {n} bytes at offset {}, have {}",
                self.what,
                self.pos,
                self.data.len()
            )));
        };
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, IxError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn bool(&mut self) -> Result<bool, IxError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.invalid(format!("bool byte {other}"))),
        }
    }

    pub(crate) fn u16(&mut self) -> Result<u16, IxError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, IxError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, IxError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, IxError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    pub(crate) fn address(&mut self) -> Result<Address, IxError> {
        Address::from_slice(self.take(32)?)
    }

    /// SPL `COption<Pubkey>`: a 4-byte tag followed by 32 bytes either way.
    pub(crate) fn coption_address(&mut self) -> Result<Option<Address>, IxError> {
        let tag = self.u32()?;
        let address = self.address()?;
        match tag {
            0 => Ok(None),
            1 => Ok(Some(address)),
            other => Err(self.invalid(format!("COption tag {other}"))),
        }
    }

    /// Borsh string with trailing NUL padding removed.
    pub(crate) fn padded_string(&mut self) -> Result<String, IxError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|e| self.invalid(format!("utf-8: {e}")))?;
        Ok(text.trim_end_matches('\0').to_string())
    }

    pub(crate) fn discriminator(&mut self, type_name: &str) -> Result<(), IxError> {
        let expected = account_discriminator(type_name);
        let found = self.take(expected.len())?;
        if found != expected {
            return Err(self.invalid(format!(
                "discriminator {} is not {type_name}",
                hex::encode(found)
            )));
        }
        Ok(())
    }

    fn invalid(&self, detail: String) -> IxError {
        IxError::InvalidAccountData(format!("{}: {detail}", self.what))
    }
}

fn put_coption(out: &mut Vec<u8>, value: Option<Address>) {
    match value {
        Some(address) => {
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(address.as_bytes());
        }
        None => {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&[0u8; 32]);
        }
    }
}

// ---------------------------------------------------------------------------
// SPL Mint
// ---------------------------------------------------------------------------

/// Decoded SPL token mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintState {
    pub mint_authority: Option<Address>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Address>,
}

impl MintState {
    pub const LEN: usize = 82;

    pub fn unpack(data: &[u8]) -> Result<Self, IxError> {
        if data.len() != Self::LEN {
            return Err(IxError::InvalidAccountData(format!(
                "mint: expected {} bytes, got {}",
                Self::LEN,
                data.len()
            )));
        }
        let mut r = ByteReader::new(data, "mint");
        Ok(Self {
            mint_authority: r.coption_address()?,
            supply: r.u64()?,
            decimals: r.u8()?,
            is_initialized: r.bool()?,
            freeze_authority: r.coption_address()?,
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        put_coption(&mut out, self.mint_authority);
        out.extend_from_slice(&self.supply.to_le_bytes());
        out.push(self.decimals);
        out.push(u8::from(self.is_initialized));
        put_coption(&mut out, self.freeze_authority);
        out
    }
}

// ---------------------------------------------------------------------------
// SPL token account
// ---------------------------------------------------------------------------

/// The leading fields of an SPL token account (165 bytes on chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenAccountState {
    pub mint: Address,
    pub owner: Address,
    pub amount: u64,
}

impl TokenAccountState {
    pub const LEN: usize = 165;

    pub fn unpack(data: &[u8]) -> Result<Self, IxError> {
        if data.len() != Self::LEN {
            return Err(IxError::InvalidAccountData(format!(
                "token account: expected {} bytes, got {}",
                Self::LEN,
                data.len()
            )));
        }
        let mut r = ByteReader::new(data, "token account");
        Ok(Self {
            mint: r.address()?,
            owner: r.address()?,
            amount: r.u64()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Program config
// ---------------------------------------------------------------------------

/// The program's singleton `Config` account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigState {
    pub initialized: bool,
    pub finalized: bool,
    pub mint: Address,
    pub sol_vault: Address,
    pub token_vault: Address,
    pub token_vault_account: Address,
    pub sale_end: i64,
    pub min_supply_base_units: u64,
    pub total_burned: u64,
}

impl ConfigState {
    pub const TYPE_NAME: &'static str = "Config";
    /// Discriminator plus fields.
    pub const LEN: usize = 8 + 1 + 1 + 32 * 4 + 8 * 3;

    pub fn unpack(data: &[u8]) -> Result<Self, IxError> {
        let mut r = ByteReader::new(data, "config");
        r.discriminator(Self::TYPE_NAME)?;
        Ok(Self {
            initialized: r.bool()?,
            finalized: r.bool()?,
            mint: r.address()?,
            sol_vault: r.address()?,
            token_vault: r.address()?,
            token_vault_account: r.address()?,
            sale_end: r.i64()?,
            min_supply_base_units: r.u64()?,
            total_burned: r.u64()?,
        })
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&account_discriminator(Self::TYPE_NAME));
        out.push(u8::from(self.initialized));
        out.push(u8::from(self.finalized));
        for address in [
            self.mint,
            self.sol_vault,
            self.token_vault,
            self.token_vault_account,
        ] {
            out.extend_from_slice(address.as_bytes());
        }
        out.extend_from_slice(&self.sale_end.to_le_bytes());
        out.extend_from_slice(&self.min_supply_base_units.to_le_bytes());
        out.extend_from_slice(&self.total_burned.to_le_bytes());
        out
    }
}
