use crate::{
    Error, Layout, Result, ScalarKind, TYPE_ID_MASK, TypeEntry, TypeId, TypeTable, Value, Variant,
    VariantBody, VariantFlags,
};

/// Widest primitive the encoder emits in one piece. Every exchange window
/// must be at least this wide.
pub const MAX_ATOM: usize = 16;

/// Source of fresh chunk windows for a streaming encode.
///
/// `filled` is the number of valid bytes in the window being handed back;
/// the bytes themselves stay with the caller. Implementations carry
/// whatever per-encode context they need — the codec never inspects it. A
/// failure aborts the encode and becomes its result.
pub trait ExchangeBuffer<'a> {
    fn exchange(&mut self, filled: usize) -> Result<&'a mut [u8]>;
}

impl<'a, F> ExchangeBuffer<'a> for F
where
    F: FnMut(usize) -> Result<&'a mut [u8]>,
{
    fn exchange(&mut self, filled: usize) -> Result<&'a mut [u8]> {
        self(filled)
    }
}

/// Streaming encoder over a sequence of caller-owned chunks.
///
/// Writes into the current window and requests the next one through the
/// exchange callback whenever a write would not fit. Single-pass: length
/// prefixes are derived from the value, never patched in afterwards. A
/// fixed-width primitive never straddles a window boundary; variable-length
/// payloads drain across as many windows as needed. Output bytes are
/// identical for every valid partitioning of the total size into windows.
pub struct Encoder<'a, X> {
    chunk: &'a mut [u8],
    pos: usize,
    exchange: X,
}

impl<'a, X: ExchangeBuffer<'a>> Encoder<'a, X> {
    pub fn new(chunk: &'a mut [u8], exchange: X) -> Self {
        Encoder { chunk, pos: 0, exchange }
    }

    /// Valid bytes in the current window.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn encode(&mut self, table: &TypeTable, value: &Value, id: TypeId) -> Result<()> {
        let entry = table.get(id).ok_or(Error::Encoding)?;
        self.encode_value(table, value, entry)
    }

    fn swap_chunk(&mut self) -> Result<()> {
        self.chunk = self.exchange.exchange(self.pos)?;
        self.pos = 0;
        Ok(())
    }

    /// Writes a fixed-width primitive without splitting it.
    fn write_atom(&mut self, bytes: &[u8]) -> Result<()> {
        debug_assert!(bytes.len() <= MAX_ATOM);
        if self.pos + bytes.len() > self.chunk.len() {
            self.swap_chunk()?;
            if bytes.len() > self.chunk.len() {
                // window narrower than the exchange contract guarantees
                return Err(Error::Encoding);
            }
        }
        self.chunk[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Drains a variable-length payload across window boundaries.
    fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.pos == self.chunk.len() {
                self.swap_chunk()?;
                if self.chunk.is_empty() {
                    return Err(Error::Encoding);
                }
            }
            let n = data.len().min(self.chunk.len() - self.pos);
            self.chunk[self.pos..self.pos + n].copy_from_slice(&data[..n]);
            self.pos += n;
            data = &data[n..];
        }
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_atom(&v.to_le_bytes())
    }

    fn encode_value(&mut self, table: &TypeTable, value: &Value, entry: &TypeEntry) -> Result<()> {
        match (&entry.layout, value) {
            (Layout::Scalar(kind), v) => {
                let (buf, w) = scalar_atom(*kind, v)?;
                self.write_atom(&buf[..w])
            }
            (Layout::String, Value::String(s)) => {
                self.write_prefixed(s.as_ref().map(|s| s.as_bytes()))
            }
            (Layout::ByteString, Value::ByteString(b)) => self.write_prefixed(b.as_deref()),
            (Layout::Array { element }, Value::Array(items)) => {
                self.encode_array(table, items.as_deref(), *element)
            }
            (Layout::Structure { fields }, Value::Structure(values)) => {
                if fields.len() != values.len() {
                    return Err(Error::Encoding);
                }
                for (field, v) in fields.iter().zip(values) {
                    let fe = table.get(field.ty).ok_or(Error::Encoding)?;
                    self.encode_value(table, v, fe)?;
                }
                Ok(())
            }
            (Layout::Variant, Value::Variant(var)) => self.encode_variant(table, var),
            (Layout::ExtensionObject, Value::Extension(x)) => {
                self.write_atom(&x.encoded_type.to_le_bytes())?;
                match &x.body {
                    None => self.write_atom(&[0]),
                    Some(body) => {
                        self.write_atom(&[1])?;
                        self.write_prefixed(Some(body))
                    }
                }
            }
            _ => Err(Error::Encoding),
        }
    }

    /// Length prefix (`-1` = null) followed by the raw payload.
    fn write_prefixed(&mut self, data: Option<&[u8]>) -> Result<()> {
        match data {
            None => self.write_i32(-1),
            Some(data) => {
                let len = i32::try_from(data.len()).map_err(|_| Error::Encoding)?;
                self.write_i32(len)?;
                self.write_bytes(data)
            }
        }
    }

    fn encode_array(
        &mut self,
        table: &TypeTable,
        items: Option<&[Value]>,
        element: TypeId,
    ) -> Result<()> {
        let entry = table.get(element).ok_or(Error::Encoding)?;
        match items {
            None => self.write_i32(-1),
            Some(items) => {
                let len = i32::try_from(items.len()).map_err(|_| Error::Encoding)?;
                self.write_i32(len)?;
                for v in items {
                    self.encode_value(table, v, entry)?;
                }
                Ok(())
            }
        }
    }

    fn encode_variant(&mut self, table: &TypeTable, var: &Variant) -> Result<()> {
        if var.type_id.0 > TYPE_ID_MASK {
            return Err(Error::Encoding);
        }
        let mut mask = var.type_id.0;
        if matches!(var.body, VariantBody::Array(_)) {
            mask |= VariantFlags::ARRAY.bits();
        }
        if var.dimensions.is_some() {
            mask |= VariantFlags::DIMENSIONS.bits();
        }
        self.write_atom(&[mask])?;
        match &var.body {
            VariantBody::Scalar(v) => {
                let entry = table.get(var.type_id).ok_or(Error::Encoding)?;
                self.encode_value(table, v, entry)?;
            }
            VariantBody::Array(items) => {
                self.encode_array(table, items.as_deref(), var.type_id)?;
            }
        }
        if let Some(dims) = &var.dimensions {
            let len = i32::try_from(dims.len()).map_err(|_| Error::Encoding)?;
            self.write_i32(len)?;
            for d in dims {
                self.write_i32(*d)?;
            }
        }
        Ok(())
    }
}

/// Exchange source for one-shot encodes: the single buffer is all there is.
struct NoExchange;

impl<'a> ExchangeBuffer<'a> for NoExchange {
    fn exchange(&mut self, _filled: usize) -> Result<&'a mut [u8]> {
        Err(Error::Encoding)
    }
}

/// One-shot encode into a single contiguous buffer. Returns the number of
/// bytes written; fails if the buffer is too small.
pub fn encode_into(
    table: &TypeTable,
    value: &Value,
    id: TypeId,
    buf: &mut [u8],
) -> Result<usize> {
    let mut enc = Encoder::new(buf, NoExchange);
    enc.encode(table, value, id)?;
    Ok(enc.position())
}

fn scalar_atom(kind: ScalarKind, value: &Value) -> Result<([u8; MAX_ATOM], usize)> {
    let mut buf = [0u8; MAX_ATOM];
    match (kind, value) {
        (ScalarKind::Boolean, Value::Boolean(b)) => buf[0] = u8::from(*b),
        (ScalarKind::SByte, Value::SByte(v)) => buf[0] = *v as u8,
        (ScalarKind::Byte, Value::Byte(v)) => buf[0] = *v,
        (ScalarKind::Int16, Value::Int16(v)) => buf[..2].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::UInt16, Value::UInt16(v)) => buf[..2].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::Int32, Value::Int32(v)) => buf[..4].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::UInt32, Value::UInt32(v)) => buf[..4].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::Int64, Value::Int64(v)) => buf[..8].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::UInt64, Value::UInt64(v)) => buf[..8].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::Float, Value::Float(v)) => buf[..4].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::Double, Value::Double(v)) => buf[..8].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::DateTime, Value::DateTime(v)) => buf[..8].copy_from_slice(&v.to_le_bytes()),
        (ScalarKind::StatusCode, Value::Status(v)) => buf[..4].copy_from_slice(&v.0.to_le_bytes()),
        (ScalarKind::Guid, Value::Guid(g)) => {
            buf[..4].copy_from_slice(&g.data1.to_le_bytes());
            buf[4..6].copy_from_slice(&g.data2.to_le_bytes());
            buf[6..8].copy_from_slice(&g.data3.to_le_bytes());
            buf[8..16].copy_from_slice(&g.data4);
        }
        _ => return Err(Error::Encoding),
    }
    Ok((buf, kind.width()))
}
