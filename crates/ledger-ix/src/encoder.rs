//! Fixed-width argument encoding.
//!
//! Arguments are little-endian integers laid end to end after the selector.
//! There are no length prefixes or separators: the program reads each
//! argument at a fixed offset, so a value that does not fit its declared
//! width is an error, never a wrap.

use serde::{Deserialize, Serialize};

use crate::error::IxError;

/// Integer width of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u8 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn byte_len(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

/// Declared shape of one instruction argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub width: IntWidth,
    pub signed: bool,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, width: IntWidth, signed: bool) -> Self {
        Self {
            name: name.into(),
            width,
            signed,
        }
    }

    /// Parse an IDL primitive type name such as `"u64"` or `"i8"`.
    pub fn from_type_name(name: impl Into<String>, ty: &str) -> Option<Self> {
        let (signed, width) = match ty {
            "u8" => (false, IntWidth::W8),
            "u16" => (false, IntWidth::W16),
            "u32" => (false, IntWidth::W32),
            "u64" => (false, IntWidth::W64),
            "i8" => (true, IntWidth::W8),
            "i16" => (true, IntWidth::W16),
            "i32" => (true, IntWidth::W32),
            "i64" => (true, IntWidth::W64),
            _ => return None,
        };
        Some(Self::new(name, width, signed))
    }

    /// Inclusive value range accepted by this spec.
    pub fn range(&self) -> (i128, i128) {
        let bits = u32::from(self.width.bits());
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub fn type_name(&self) -> String {
        format!("{}{}", if self.signed { "i" } else { "u" }, self.width.bits())
    }
}

/// Encode one argument as fixed-width little-endian bytes.
pub fn encode_arg(spec: &ArgSpec, value: i128) -> Result<Vec<u8>, IxError> {
    let (min, max) = spec.range();
    if value < min || value > max {
        return Err(IxError::ArgumentRangeError {
            name: spec.name.clone(),
            value,
            width: spec.width.bits(),
            signed: spec.signed,
        });
    }

    // Two's complement low bytes of an in-range i128 are exactly the
    // fixed-width encoding for both signed and unsigned specs.
    let bytes = value.to_le_bytes();
    Ok(bytes[..spec.width.byte_len()].to_vec())
}

/// Encode a full argument list in declared order.
pub fn encode_args(
    operation: &str,
    specs: &[ArgSpec],
    values: &[i128],
) -> Result<Vec<u8>, IxError> {
    if specs.len() != values.len() {
        return Err(IxError::ArgumentCountMismatch {
            operation: operation.to_string(),
            expected: specs.len(),
            actual: values.len(),
        });
    }

    let total: usize = specs.iter().map(|s| s.width.byte_len()).sum();
    let mut out = Vec::with_capacity(total);
    for (spec, value) in specs.iter().zip(values) {
        out.extend_from_slice(&encode_arg(spec, *value)?);
    }
    Ok(out)
}

/// Decode one argument from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_arg(spec: &ArgSpec, data: &[u8]) -> Result<(i128, usize), IxError> {
    let len = spec.width.byte_len();
    if data.len() < len {
        return Err(IxError::SerializationError(format!(
            "argument \"{}\" needs {len} bytes, {} left",
            spec.name,
            data.len()
        )));
    }

    let raw = &data[..len];
    let value = match (spec.width, spec.signed) {
        (IntWidth::W8, false) => i128::from(raw[0]),
        (IntWidth::W8, true) => i128::from(raw[0] as i8),
        (IntWidth::W16, false) => i128::from(u16::from_le_bytes([raw[0], raw[1]])),
        (IntWidth::W16, true) => i128::from(i16::from_le_bytes([raw[0], raw[1]])),
        (IntWidth::W32, false) => i128::from(u32::from_le_bytes(fixed(raw))),
        (IntWidth::W32, true) => i128::from(i32::from_le_bytes(fixed(raw))),
        (IntWidth::W64, false) => i128::from(u64::from_le_bytes(fixed(raw))),
        (IntWidth::W64, true) => i128::from(i64::from_le_bytes(fixed(raw))),
    };
    Ok((value, len))
}

fn fixed<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[..N]);
    out
}
