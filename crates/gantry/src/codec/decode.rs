use crate::{
    Error, ExtensionObject, Guid, Layout, Result, ScalarKind, StatusCode, TYPE_ID_MASK, TypeEntry,
    TypeId, TypeTable, Value, Variant, VariantBody, VariantFlags,
};

/// Single-buffer decoder. The caller supplies one contiguous buffer;
/// reassembly of chunked input happens above this layer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn decode(&mut self, table: &TypeTable, id: TypeId) -> Result<Value> {
        let entry = table.get(id).ok_or(Error::Decoding)?;
        self.decode_value(table, entry)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Decoding);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Signed length prefix; `-1` is the wire null.
    fn read_length(&mut self) -> Result<Option<usize>> {
        match self.read_i32()? {
            -1 => Ok(None),
            n if n >= 0 => Ok(Some(n as usize)),
            _ => Err(Error::Decoding),
        }
    }

    fn decode_value(&mut self, table: &TypeTable, entry: &TypeEntry) -> Result<Value> {
        match &entry.layout {
            Layout::Scalar(kind) => self.decode_scalar(*kind),
            Layout::String => match self.read_length()? {
                None => Ok(Value::String(None)),
                Some(n) => {
                    let bytes = self.take(n)?;
                    let s = std::str::from_utf8(bytes).map_err(|_| Error::Decoding)?;
                    Ok(Value::String(Some(s.to_owned())))
                }
            },
            Layout::ByteString => match self.read_length()? {
                None => Ok(Value::ByteString(None)),
                Some(n) => Ok(Value::ByteString(Some(self.take(n)?.to_vec()))),
            },
            Layout::Array { element } => Ok(Value::Array(self.decode_array(table, *element)?)),
            Layout::Structure { fields } => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    let fe = table.get(field.ty).ok_or(Error::Decoding)?;
                    out.push(self.decode_value(table, fe)?);
                }
                Ok(Value::Structure(out))
            }
            Layout::Variant => Ok(Value::Variant(Box::new(self.decode_variant(table)?))),
            Layout::ExtensionObject => {
                let b = self.take(4)?;
                let encoded_type = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                let body = match self.read_u8()? {
                    0 => None,
                    1 => match self.read_length()? {
                        None => None,
                        Some(n) => Some(self.take(n)?.to_vec()),
                    },
                    _ => return Err(Error::Decoding),
                };
                Ok(Value::Extension(ExtensionObject { encoded_type, body }))
            }
        }
    }

    fn decode_array(&mut self, table: &TypeTable, element: TypeId) -> Result<Option<Vec<Value>>> {
        let entry = table.get(element).ok_or(Error::Decoding)?;
        match self.read_length()? {
            None => Ok(None),
            Some(n) => {
                // every element occupies at least one byte
                if n > self.remaining() {
                    return Err(Error::Decoding);
                }
                let mut out = Vec::with_capacity(n);
                for _ in 0..n {
                    out.push(self.decode_value(table, entry)?);
                }
                Ok(Some(out))
            }
        }
    }

    fn decode_variant(&mut self, table: &TypeTable) -> Result<Variant> {
        let mask = self.read_u8()?;
        let flags = VariantFlags::from_bits_truncate(mask);
        let type_id = TypeId(mask & TYPE_ID_MASK);
        let body = if flags.contains(VariantFlags::ARRAY) {
            VariantBody::Array(self.decode_array(table, type_id)?)
        } else {
            let entry = table.get(type_id).ok_or(Error::Decoding)?;
            VariantBody::Scalar(self.decode_value(table, entry)?)
        };
        let dimensions = if flags.contains(VariantFlags::DIMENSIONS) {
            let n = self.read_length()?.ok_or(Error::Decoding)?;
            if n.checked_mul(4).is_none_or(|bytes| bytes > self.remaining()) {
                return Err(Error::Decoding);
            }
            let mut dims = Vec::with_capacity(n);
            for _ in 0..n {
                dims.push(self.read_i32()?);
            }
            Some(dims)
        } else {
            None
        };
        Ok(Variant { type_id, body, dimensions })
    }

    fn decode_scalar(&mut self, kind: ScalarKind) -> Result<Value> {
        let b = self.take(kind.width())?;
        Ok(match kind {
            // any nonzero byte decodes to true
            ScalarKind::Boolean => Value::Boolean(b[0] != 0),
            ScalarKind::SByte => Value::SByte(b[0] as i8),
            ScalarKind::Byte => Value::Byte(b[0]),
            ScalarKind::Int16 => Value::Int16(i16::from_le_bytes([b[0], b[1]])),
            ScalarKind::UInt16 => Value::UInt16(u16::from_le_bytes([b[0], b[1]])),
            ScalarKind::Int32 => Value::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ScalarKind::UInt32 => Value::UInt32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ScalarKind::Int64 => Value::Int64(i64::from_le_bytes(b.try_into().unwrap())),
            ScalarKind::UInt64 => Value::UInt64(u64::from_le_bytes(b.try_into().unwrap())),
            ScalarKind::Float => Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ScalarKind::Double => Value::Double(f64::from_le_bytes(b.try_into().unwrap())),
            ScalarKind::DateTime => Value::DateTime(i64::from_le_bytes(b.try_into().unwrap())),
            ScalarKind::StatusCode => {
                Value::Status(StatusCode(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            }
            ScalarKind::Guid => Value::Guid(Guid {
                data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                data2: u16::from_le_bytes([b[4], b[5]]),
                data3: u16::from_le_bytes([b[6], b[7]]),
                data4: b[8..16].try_into().unwrap(),
            }),
        })
    }
}
