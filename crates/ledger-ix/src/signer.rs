//! Ed25519 signers.
//!
//! The core only needs "who are you" and "sign these bytes", so key storage
//! stays behind [`TxSigner`]. [`Keypair`] is the in-process implementation
//! used by the CLI and tests.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::Signer;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::address::Address;
use crate::error::IxError;

/// A 64-byte Ed25519 signature. The first signature of a transaction is its id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl FromStr for Signature {
    type Err = IxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| IxError::SerializationError(format!("signature base58: {e}")))?;
        let arr: [u8; 64] = bytes.try_into().map_err(|v: Vec<u8>| {
            IxError::SerializationError(format!("signature must be 64 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Something that can authorize a transaction.
pub trait TxSigner {
    fn pubkey(&self) -> Address;

    fn sign_message(&self, message: &[u8]) -> Result<Signature, IxError>;
}

/// An in-memory Ed25519 keypair.
///
/// `ed25519_dalek::SigningKey` zeroizes its secret on drop.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut rng),
        }
    }

    /// Build from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Build from the 64-byte `secret || public` layout used by key files.
    ///
    /// Rejects buffers whose public half does not match the secret half.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IxError> {
        let buf: Zeroizing<[u8; 64]> = Zeroizing::new(bytes.try_into().map_err(|_| {
            IxError::SigningError(format!("keypair must be 64 bytes, got {}", bytes.len()))
        })?);
        let signing_key = ed25519_dalek::SigningKey::from_keypair_bytes(&buf)
            .map_err(|e| IxError::SigningError(format!("inconsistent keypair: {e}")))?;
        Ok(Self { signing_key })
    }

    /// The 64-byte `secret || public` layout, zeroized on drop.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

impl TxSigner for Keypair {
    fn pubkey(&self) -> Address {
        Address::new(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, IxError> {
        Ok(Signature::new(self.signing_key.sign(message).to_bytes()))
    }
}

impl<T: TxSigner + ?Sized> TxSigner for &T {
    fn pubkey(&self) -> Address {
        (**self).pubkey()
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, IxError> {
        (**self).sign_message(message)
    }
}
