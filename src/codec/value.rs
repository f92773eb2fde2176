//! Dynamically-typed field lists
//!
//! Orchestration scripts assemble arguments per call site rather than per
//! compiled schema. `FieldValue` carries one logical field; `FieldKind`
//! describes the expected shape for decoding.

use super::{
    decode_bool, decode_len, decode_presence, decode_pubkey, decode_string, encode_len,
    CodecError, WireFormat,
};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::mem::{discriminant, Discriminant};

/// One logical argument field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Str(String),
    Address(Pubkey),
    Optional(Option<Box<FieldValue>>),
    List(Vec<FieldValue>),
}

/// Shape of a field, used to read values back
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    Str,
    Address,
    Optional(Box<FieldKind>),
    List(Box<FieldKind>),
}

impl FieldValue {
    pub fn some(value: impl Into<FieldValue>) -> Self {
        Self::Optional(Some(Box::new(value.into())))
    }

    pub fn none() -> Self {
        Self::Optional(None)
    }

    pub fn list<T: Into<FieldValue>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Append this field's wire bytes to `out`
    ///
    /// Lists must be homogeneous down to nested options and lists: the
    /// remote side decodes `Vec<T>` for a single `T`, so mixed element
    /// shapes cannot be represented.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Self::U8(v) => v.encode(out),
            Self::U16(v) => v.encode(out),
            Self::U32(v) => v.encode(out),
            Self::U64(v) => v.encode(out),
            Self::I8(v) => v.encode(out),
            Self::I16(v) => v.encode(out),
            Self::I32(v) => v.encode(out),
            Self::I64(v) => v.encode(out),
            Self::Bool(v) => v.encode(out),
            Self::Str(v) => v.encode(out),
            Self::Address(v) => v.encode(out),
            Self::Optional(None) => {
                out.push(0);
                Ok(())
            }
            Self::Optional(Some(inner)) => {
                out.push(1);
                inner.encode(out)
            }
            Self::List(items) => {
                list_shape(items)?;
                encode_len(items.len(), "list", out)?;
                for item in items {
                    item.encode(out)?;
                }
                Ok(())
            }
        }
    }

    /// Whether this value can be encoded under `kind`
    pub fn conforms_to(&self, kind: &FieldKind) -> bool {
        match (self, kind) {
            (Self::U8(_), FieldKind::U8)
            | (Self::U16(_), FieldKind::U16)
            | (Self::U32(_), FieldKind::U32)
            | (Self::U64(_), FieldKind::U64)
            | (Self::I8(_), FieldKind::I8)
            | (Self::I16(_), FieldKind::I16)
            | (Self::I32(_), FieldKind::I32)
            | (Self::I64(_), FieldKind::I64)
            | (Self::Bool(_), FieldKind::Bool)
            | (Self::Str(_), FieldKind::Str)
            | (Self::Address(_), FieldKind::Address)
            | (Self::Optional(None), FieldKind::Optional(_)) => true,
            (Self::Optional(Some(inner)), FieldKind::Optional(k)) => inner.conforms_to(k),
            (Self::List(items), FieldKind::List(k)) => items.iter().all(|i| i.conforms_to(k)),
            _ => false,
        }
    }
}

// Element shape of a list. Parts not yet seen (an absent option, an empty
// list) stay open and are filled in by later elements.
#[derive(Clone, PartialEq)]
enum Shape {
    Leaf(Discriminant<FieldValue>),
    Optional(Option<Box<Shape>>),
    List(Option<Box<Shape>>),
}

fn shape_of(value: &FieldValue) -> Result<Shape, CodecError> {
    Ok(match value {
        FieldValue::Optional(None) => Shape::Optional(None),
        FieldValue::Optional(Some(inner)) => Shape::Optional(Some(Box::new(shape_of(inner)?))),
        FieldValue::List(items) => Shape::List(list_shape(items)?.map(Box::new)),
        other => Shape::Leaf(discriminant(other)),
    })
}

fn merge(a: Shape, b: Shape) -> Option<Shape> {
    match (a, b) {
        (Shape::Leaf(x), Shape::Leaf(y)) if x == y => Some(Shape::Leaf(x)),
        (Shape::Optional(x), Shape::Optional(y)) => merge_open(x, y).map(Shape::Optional),
        (Shape::List(x), Shape::List(y)) => merge_open(x, y).map(Shape::List),
        _ => None,
    }
}

fn merge_open(a: Option<Box<Shape>>, b: Option<Box<Shape>>) -> Option<Option<Box<Shape>>> {
    match (a, b) {
        (None, other) | (other, None) => Some(other),
        (Some(x), Some(y)) => merge(*x, *y).map(|s| Some(Box::new(s))),
    }
}

/// The common shape of `items`, `None` for an empty list
fn list_shape(items: &[FieldValue]) -> Result<Option<Shape>, CodecError> {
    let mut common: Option<Shape> = None;
    for (pos, item) in items.iter().enumerate() {
        let shape = shape_of(item)?;
        common = Some(match common {
            None => shape,
            Some(prev) => merge(prev, shape).ok_or_else(|| {
                CodecError::malformed(format!(
                    "list element {pos} differs in type from the elements before it"
                ))
            })?,
        });
    }
    Ok(common)
}

impl FieldKind {
    /// Read one value of this kind, advancing `input`
    pub fn decode(&self, input: &mut &[u8]) -> Result<FieldValue, CodecError> {
        Ok(match self {
            Self::U8 => FieldValue::U8(u8::decode(input)?),
            Self::U16 => FieldValue::U16(u16::decode(input)?),
            Self::U32 => FieldValue::U32(u32::decode(input)?),
            Self::U64 => FieldValue::U64(u64::decode(input)?),
            Self::I8 => FieldValue::I8(i8::decode(input)?),
            Self::I16 => FieldValue::I16(i16::decode(input)?),
            Self::I32 => FieldValue::I32(i32::decode(input)?),
            Self::I64 => FieldValue::I64(i64::decode(input)?),
            Self::Bool => FieldValue::Bool(decode_bool(input)?),
            Self::Str => FieldValue::Str(decode_string(input)?),
            Self::Address => FieldValue::Address(decode_pubkey(input)?),
            Self::Optional(inner) => {
                if decode_presence(input)? {
                    FieldValue::Optional(Some(Box::new(inner.decode(input)?)))
                } else {
                    FieldValue::Optional(None)
                }
            }
            Self::List(inner) => {
                let count = decode_len(input)?;
                let mut items = Vec::with_capacity(count.min(input.len()));
                for _ in 0..count {
                    items.push(inner.decode(input)?);
                }
                FieldValue::List(items)
            }
        })
    }
}

/// Concatenate the encodings of `fields` in order
pub fn encode_fields(fields: &[FieldValue]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for field in fields {
        field.encode(&mut out)?;
    }
    Ok(out)
}

/// Decode `bytes` against an ordered schema, rejecting leftover bytes
pub fn decode_fields(schema: &[FieldKind], bytes: &[u8]) -> Result<Vec<FieldValue>, CodecError> {
    let mut input = bytes;
    let mut values = Vec::with_capacity(schema.len());
    for kind in schema {
        values.push(kind.decode(&mut input)?);
    }
    if !input.is_empty() {
        return Err(CodecError::malformed(format!(
            "{} trailing bytes after {} fields",
            input.len(),
            schema.len()
        )));
    }
    Ok(values)
}

macro_rules! impl_from_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for FieldValue {
                fn from(value: $t) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    bool => Bool,
    String => Str,
    Pubkey => Address,
);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        Self::Optional(value.map(|v| Box::new(v.into())))
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        Self::list(value)
    }
}
