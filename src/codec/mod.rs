//! Field codec for instruction arguments
//!
//! Values are written in the canonical little-endian, length-prefixed layout
//! the remote program deserializes:
//!
//! - fixed-width integers: little-endian, two's complement for signed types
//! - `bool`: one byte, `0x00` or `0x01`
//! - `String`: `u32` LE byte length followed by raw UTF-8 (no terminator)
//! - `Pubkey`: 32 raw bytes, no prefix
//! - `Option<T>`: one presence byte, then the inner value when present
//! - `Vec<T>`: `u32` LE element count, then each element back to back
//!
//! There is no framing between sibling fields. A struct is the concatenation
//! of its fields in declared order, so the caller's field order must match
//! the program's schema exactly.
//!
//! Typed argument schemas implement [`WireFormat`]. Per-call dynamic field
//! lists use [`FieldValue`] and are decoded back with a [`FieldKind`] schema.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

mod value;

pub use value::{decode_fields, encode_fields, FieldKind, FieldValue};

/// Width of the length / count prefix used by strings and lists
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Raised when a value cannot be represented, or bytes cannot be read back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed encoding: {0}")]
    Malformed(String),
}

impl CodecError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    fn truncated(what: &str, needed: usize, available: usize) -> Self {
        Self::Malformed(format!(
            "truncated {what}: needed {needed} bytes, {available} available"
        ))
    }
}

/// A value with a fixed position-dependent wire layout
///
/// `decode` advances `input` past the bytes it consumed, so fields of a
/// struct decode by calling each field's `decode` in declared order on the
/// same slice.
pub trait WireFormat: Sized {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError>;

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError>;
}

/// Encode a single value into a fresh buffer
pub fn to_bytes<T: WireFormat>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    value.encode(&mut out)?;
    Ok(out)
}

/// Decode a value that must span `bytes` exactly
///
/// Leftover bytes are rejected: a payload longer than its schema means the
/// schema and the data disagree.
pub fn from_bytes<T: WireFormat>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut input = bytes;
    let value = T::decode(&mut input)?;
    if !input.is_empty() {
        return Err(CodecError::malformed(format!(
            "{} trailing bytes after value",
            input.len()
        )));
    }
    Ok(value)
}

pub(crate) fn take<'a>(
    input: &mut &'a [u8],
    len: usize,
    what: &str,
) -> Result<&'a [u8], CodecError> {
    if input.len() < len {
        return Err(CodecError::truncated(what, len, input.len()));
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head)
}

pub(crate) fn encode_len(len: usize, what: &str, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| {
        CodecError::malformed(format!(
            "{what} length {len} does not fit the u32 length prefix"
        ))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

pub(crate) fn decode_len(input: &mut &[u8]) -> Result<usize, CodecError> {
    Ok(u32::decode(input)? as usize)
}

pub(crate) fn decode_bool(input: &mut &[u8]) -> Result<bool, CodecError> {
    match take(input, 1, "bool")?[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::malformed(format!(
            "invalid bool byte 0x{other:02x}"
        ))),
    }
}

pub(crate) fn decode_presence(input: &mut &[u8]) -> Result<bool, CodecError> {
    match take(input, 1, "option flag")?[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::malformed(format!(
            "invalid option flag 0x{other:02x}"
        ))),
    }
}

pub(crate) fn decode_string(input: &mut &[u8]) -> Result<String, CodecError> {
    let len = decode_len(input)?;
    let bytes = take(input, len, "string body")?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CodecError::malformed(format!("string is not valid UTF-8: {e}")))
}

pub(crate) fn decode_pubkey(input: &mut &[u8]) -> Result<Pubkey, CodecError> {
    let bytes = take(input, 32, "address")?;
    let mut array = [0u8; 32];
    array.copy_from_slice(bytes);
    Ok(Pubkey::new_from_array(array))
}

macro_rules! impl_wire_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl WireFormat for $t {
                fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
                    out.extend_from_slice(&self.to_le_bytes());
                    Ok(())
                }

                fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
                    const WIDTH: usize = std::mem::size_of::<$t>();
                    let bytes = take(input, WIDTH, stringify!($t))?;
                    let mut array = [0u8; WIDTH];
                    array.copy_from_slice(bytes);
                    Ok(<$t>::from_le_bytes(array))
                }
            }
        )*
    };
}

impl_wire_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl WireFormat for bool {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.push(u8::from(*self));
        Ok(())
    }

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        decode_bool(input)
    }
}

impl WireFormat for String {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        encode_len(self.len(), "string", out)?;
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        decode_string(input)
    }
}

impl WireFormat for Pubkey {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(self.as_ref());
        Ok(())
    }

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        decode_pubkey(input)
    }
}

impl<T: WireFormat> WireFormat for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            None => {
                out.push(0);
                Ok(())
            }
            Some(inner) => {
                out.push(1);
                inner.encode(out)
            }
        }
    }

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        if decode_presence(input)? {
            Ok(Some(T::decode(input)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: WireFormat> WireFormat for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        encode_len(self.len(), "list", out)?;
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }

    fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
        let count = decode_len(input)?;
        // Every element is at least one byte, so the remaining input bounds the count
        let mut items = Vec::with_capacity(count.min(input.len()));
        for _ in 0..count {
            items.push(T::decode(input)?);
        }
        Ok(items)
    }
}

macro_rules! impl_wire_tuple {
    ($($name:ident),+) => {
        impl<$($name: WireFormat),+> WireFormat for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
                let ($($name,)+) = self;
                $($name.encode(out)?;)+
                Ok(())
            }

            fn decode(input: &mut &[u8]) -> Result<Self, CodecError> {
                Ok(($($name::decode(input)?,)+))
            }
        }
    };
}

impl_wire_tuple!(A);
impl_wire_tuple!(A, B);
impl_wire_tuple!(A, B, C);
impl_wire_tuple!(A, B, C, D);
impl_wire_tuple!(A, B, C, D, E);
