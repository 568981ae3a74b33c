//! Ledger addresses.
//!
//! An address is a raw 32-byte Ed25519 public key, or an off-curve key
//! produced by [`crate::pda`]. The text form is plain Base58 (Bitcoin
//! alphabet) with no hashing or checksum step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IxError;

/// The System Program: 32 zero bytes, `11111111111111111111111111111111`.
pub const SYSTEM_PROGRAM_ID: Address = Address::new([0u8; 32]);

/// A 32-byte ledger address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build an address from a slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IxError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            IxError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_address(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = IxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        address_to_bytes(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Validate an address string.
///
/// A valid address is Base58 that decodes to exactly 32 bytes.
pub fn validate_address(address: &str) -> Result<bool, IxError> {
    address_to_bytes(address).map(|_| true)
}

/// Decode an address string to its 32-byte representation.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], IxError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| IxError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        IxError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })?;

    Ok(arr)
}

/// Encode 32 bytes as an address string.
pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_program_address() {
        assert_eq!(
            SYSTEM_PROGRAM_ID.to_string(),
            "11111111111111111111111111111111"
        );
    }

    #[test]
    fn parse_and_display_roundtrip() {
        let text = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let address: Address = text.parse().unwrap();
        assert_eq!(address.to_string(), text);
    }

    #[test]
    fn debug_shows_base58() {
        let debug = format!("{:?}", SYSTEM_PROGRAM_ID);
        assert_eq!(debug, "Address(11111111111111111111111111111111)");
    }

    #[test]
    fn validate_garbage_returns_error() {
        assert!(validate_address("not-a-valid-address!!!").is_err());
    }

    #[test]
    fn validate_too_short_returns_error() {
        // "1" decodes to a single zero byte.
        let err = validate_address("1").unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 1"));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Address::from_slice(&[1u8; 31]).is_err());
        assert_eq!(Address::from_slice(&[1u8; 32]).unwrap(), Address::new([1u8; 32]));
    }

    #[test]
    fn serde_uses_text_form() {
        let address: Address = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr".parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
