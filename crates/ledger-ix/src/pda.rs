//! Program-derived addresses.
//!
//! A PDA is `SHA-256(seed_0 || ... || seed_n || bump || program_id ||
//! "ProgramDerivedAddress")` for the highest bump (255 down to 0) whose
//! digest is NOT a valid Ed25519 point, so no private key can sign for it.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::address::Address;
use crate::error::IxError;

/// Caller seeds allowed per derivation. The bump takes the 16th slot.
pub const MAX_SEEDS: usize = 15;

/// Longest single seed in bytes.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Find the canonical program-derived address and its bump.
pub fn find_program_address<S: AsRef<[u8]>>(
    seeds: &[S],
    program_id: &Address,
) -> Result<(Address, u8), IxError> {
    validate_seeds(seeds)?;

    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, bump, program_id) {
            return Ok((address, bump));
        }
    }

    Err(IxError::AddressDerivationExhausted {
        program_id: *program_id,
    })
}

/// Create the address for an explicit bump.
///
/// Fails with [`IxError::InvalidSeeds`] if that bump lands on the curve.
pub fn create_program_address<S: AsRef<[u8]>>(
    seeds: &[S],
    bump: u8,
    program_id: &Address,
) -> Result<Address, IxError> {
    validate_seeds(seeds)?;
    try_create_program_address(seeds, bump, program_id).ok_or_else(|| {
        IxError::InvalidSeeds(format!("bump {bump} yields an on-curve point"))
    })
}

fn validate_seeds<S: AsRef<[u8]>>(seeds: &[S]) -> Result<(), IxError> {
    if seeds.len() > MAX_SEEDS {
        return Err(IxError::InvalidSeeds(format!(
            "{} seeds given, at most {MAX_SEEDS} allowed",
            seeds.len()
        )));
    }
    for (i, seed) in seeds.iter().enumerate() {
        let len = seed.as_ref().len();
        if len > MAX_SEED_LEN {
            return Err(IxError::InvalidSeeds(format!(
                "seed {i} is {len} bytes, at most {MAX_SEED_LEN} allowed"
            )));
        }
    }
    Ok(())
}

fn try_create_program_address<S: AsRef<[u8]>>(
    seeds: &[S],
    bump: u8,
    program_id: &Address,
) -> Option<Address> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed.as_ref());
    }
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();
    if is_on_curve(&hash) {
        return None;
    }
    Some(Address::new(hash))
}

/// Whether 32 bytes decompress to a valid Ed25519 point.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

type CacheKey = (Address, Vec<Vec<u8>>);

/// Memoizing front for [`find_program_address`].
///
/// Cloning is cheap and clones share one cache, so a single deriver can be
/// handed to every resolver in the process. Entries are keyed by the exact
/// seed bytes, so `"config"`, `b"config"` and `vec![..]` hit the same slot.
#[derive(Debug, Clone, Default)]
pub struct AddressDeriver {
    cache: Arc<DashMap<CacheKey, (Address, u8)>>,
}

impl AddressDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive<S: AsRef<[u8]>>(
        &self,
        program_id: &Address,
        seeds: &[S],
    ) -> Result<(Address, u8), IxError> {
        let key: CacheKey = (
            *program_id,
            seeds.iter().map(|s| s.as_ref().to_vec()).collect(),
        );

        if let Some(hit) = self.cache.get(&key) {
            return Ok(*hit);
        }

        let derived = find_program_address(key.1.as_slice(), program_id)?;
        debug!(program = %program_id, address = %derived.0, bump = derived.1, "derived address");

        // Concurrent derivations of the same key compute the same value, so
        // whichever insert lands first wins.
        let entry = self.cache.entry(key).or_insert(derived);
        Ok(*entry)
    }

    /// Number of distinct seed tuples cached so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
