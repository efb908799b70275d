use bitflags::bitflags;

use crate::{StatusCode, TypeId};

/// 16-byte globally unique identifier. The first three fields are encoded
/// little-endian, the trailing eight bytes verbatim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Extension object: a type id the receiver resolves out-of-band plus an
/// optional opaque byte-string body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionObject {
    pub encoded_type: u32,
    pub body: Option<Vec<u8>>,
}

/// A decoded or to-be-encoded value. Shape is validated against a type
/// descriptor at codec time; `None` in string, byte-string and array
/// positions is the wire null, distinct from empty.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(Option<String>),
    /// 64-bit tick count.
    DateTime(i64),
    Guid(Guid),
    ByteString(Option<Vec<u8>>),
    Status(StatusCode),
    Extension(ExtensionObject),
    Variant(Box<Variant>),
    /// Element type comes from the descriptor.
    Array(Option<Vec<Value>>),
    /// Field order comes from the descriptor.
    Structure(Vec<Value>),
}

bitflags! {
    /// High bits of the variant encoding mask. The low six bits carry the
    /// payload type id.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VariantFlags: u8 {
        const DIMENSIONS = 0x40;
        const ARRAY = 0x80;
    }
}

/// Low six bits of the variant encoding mask.
pub const TYPE_ID_MASK: u8 = 0x3f;

/// Self-describing value: a payload type id plus a scalar or an array of
/// that type, with optional array dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    pub type_id: TypeId,
    pub body: VariantBody,
    pub dimensions: Option<Vec<i32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VariantBody {
    Scalar(Value),
    Array(Option<Vec<Value>>),
}

impl Variant {
    pub fn scalar(type_id: TypeId, value: Value) -> Self {
        Variant { type_id, body: VariantBody::Scalar(value), dimensions: None }
    }

    pub fn array(type_id: TypeId, values: Vec<Value>) -> Self {
        Variant { type_id, body: VariantBody::Array(Some(values)), dimensions: None }
    }

    pub fn null_array(type_id: TypeId) -> Self {
        Variant { type_id, body: VariantBody::Array(None), dimensions: None }
    }
}

impl From<Variant> for Value {
    fn from(v: Variant) -> Self {
        Value::Variant(Box::new(v))
    }
}
