//! Operation selectors.
//!
//! The target program dispatches on the first 8 bytes of instruction data:
//! `SHA-256("global:" || name)[..8]`. Account data is tagged the same way
//! with the `account:` namespace.

use sha2::{Digest, Sha256};

use crate::error::IxError;

/// Length of a selector / discriminator in bytes.
pub const SELECTOR_LEN: usize = 8;

/// Longest operation name accepted by [`derive_selector`].
pub const MAX_OPERATION_NAME_LEN: usize = 128;

const INSTRUCTION_NAMESPACE: &str = "global";
const ACCOUNT_NAMESPACE: &str = "account";

/// Derive the 8-byte selector for an operation name.
///
/// Rejects empty names and names longer than [`MAX_OPERATION_NAME_LEN`]
/// bytes instead of truncating them.
pub fn derive_selector(name: &str) -> Result<[u8; SELECTOR_LEN], IxError> {
    if name.is_empty() {
        return Err(IxError::InvalidOperationName("name is empty".into()));
    }
    if name.len() > MAX_OPERATION_NAME_LEN {
        return Err(IxError::InvalidOperationName(format!(
            "name is {} bytes, limit is {MAX_OPERATION_NAME_LEN}",
            name.len()
        )));
    }
    Ok(namespaced_hash(INSTRUCTION_NAMESPACE, name))
}

/// Discriminator prefixed to the data of a program-owned account of type
/// `type_name` (e.g. `"Config"`).
pub fn account_discriminator(type_name: &str) -> [u8; SELECTOR_LEN] {
    namespaced_hash(ACCOUNT_NAMESPACE, type_name)
}

fn namespaced_hash(namespace: &str, name: &str) -> [u8; SELECTOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&digest[..SELECTOR_LEN]);
    out
}
