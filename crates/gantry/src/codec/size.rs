use crate::{
    Error, Layout, Result, ScalarKind, TypeEntry, TypeId, TypeTable, Value, Variant, VariantBody,
};

/// Exact number of bytes a successful encode of `value` under `id` will
/// produce. Pure; walks the same descriptor shape as the encoder.
pub fn calc_size(table: &TypeTable, value: &Value, id: TypeId) -> Result<usize> {
    let entry = table.get(id).ok_or(Error::Encoding)?;
    value_size(table, value, entry)
}

pub(super) fn value_size(table: &TypeTable, value: &Value, entry: &TypeEntry) -> Result<usize> {
    match (&entry.layout, value) {
        (Layout::Scalar(kind), v) => {
            if !scalar_matches(*kind, v) {
                return Err(Error::Encoding);
            }
            Ok(kind.width())
        }
        (Layout::String, Value::String(s)) => {
            Ok(4 + s.as_ref().map_or(0, |s| s.len()))
        }
        (Layout::ByteString, Value::ByteString(b)) => {
            Ok(4 + b.as_ref().map_or(0, |b| b.len()))
        }
        (Layout::Array { element }, Value::Array(items)) => {
            array_size(table, items.as_deref(), *element)
        }
        (Layout::Structure { fields }, Value::Structure(values)) => {
            if fields.len() != values.len() {
                return Err(Error::Encoding);
            }
            let mut total = 0;
            for (field, v) in fields.iter().zip(values) {
                let fe = table.get(field.ty).ok_or(Error::Encoding)?;
                total += value_size(table, v, fe)?;
            }
            Ok(total)
        }
        (Layout::Variant, Value::Variant(var)) => variant_size(table, var),
        (Layout::ExtensionObject, Value::Extension(x)) => {
            Ok(4 + 1 + x.body.as_ref().map_or(0, |b| 4 + b.len()))
        }
        _ => Err(Error::Encoding),
    }
}

pub(super) fn array_size(
    table: &TypeTable,
    items: Option<&[Value]>,
    element: TypeId,
) -> Result<usize> {
    let entry = table.get(element).ok_or(Error::Encoding)?;
    let mut total = 4;
    if let Some(items) = items {
        for v in items {
            total += value_size(table, v, entry)?;
        }
    }
    Ok(total)
}

pub(super) fn variant_size(table: &TypeTable, var: &Variant) -> Result<usize> {
    let mut total = 1;
    match &var.body {
        VariantBody::Scalar(v) => {
            let entry = table.get(var.type_id).ok_or(Error::Encoding)?;
            total += value_size(table, v, entry)?;
        }
        VariantBody::Array(items) => {
            total += array_size(table, items.as_deref(), var.type_id)?;
        }
    }
    if let Some(dims) = &var.dimensions {
        total += 4 + 4 * dims.len();
    }
    Ok(total)
}

pub(super) fn scalar_matches(kind: ScalarKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (ScalarKind::Boolean, Value::Boolean(_))
            | (ScalarKind::SByte, Value::SByte(_))
            | (ScalarKind::Byte, Value::Byte(_))
            | (ScalarKind::Int16, Value::Int16(_))
            | (ScalarKind::UInt16, Value::UInt16(_))
            | (ScalarKind::Int32, Value::Int32(_))
            | (ScalarKind::UInt32, Value::UInt32(_))
            | (ScalarKind::Int64, Value::Int64(_))
            | (ScalarKind::UInt64, Value::UInt64(_))
            | (ScalarKind::Float, Value::Float(_))
            | (ScalarKind::Double, Value::Double(_))
            | (ScalarKind::DateTime, Value::DateTime(_))
            | (ScalarKind::Guid, Value::Guid(_))
            | (ScalarKind::StatusCode, Value::Status(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TYPE_ID_MASK;

    #[test]
    fn scalar_sizes() {
        let t = TypeTable::builtin();
        assert_eq!(calc_size(t, &Value::Boolean(true), TypeId::BOOLEAN).unwrap(), 1);
        assert_eq!(calc_size(t, &Value::Int32(-5), TypeId::INT32).unwrap(), 4);
        assert_eq!(calc_size(t, &Value::Double(1.5), TypeId::DOUBLE).unwrap(), 8);
        assert_eq!(calc_size(t, &Value::Guid(Default::default()), TypeId::GUID).unwrap(), 16);
    }

    #[test]
    fn null_and_empty_strings_differ_only_in_payload() {
        let t = TypeTable::builtin();
        assert_eq!(calc_size(t, &Value::String(None), TypeId::STRING).unwrap(), 4);
        assert_eq!(calc_size(t, &Value::String(Some(String::new())), TypeId::STRING).unwrap(), 4);
        assert_eq!(
            calc_size(t, &Value::String(Some("abc".into())), TypeId::STRING).unwrap(),
            7
        );
    }

    #[test]
    fn variant_with_dimensions() {
        let t = TypeTable::builtin();
        let mut var = Variant::array(
            TypeId::INT32,
            (0..6).map(Value::Int32).collect(),
        );
        var.dimensions = Some(vec![2, 3]);
        // mask + array length + 6 ints + dims length + 2 dims
        assert_eq!(variant_size(t, &var).unwrap(), 1 + 4 + 24 + 4 + 8);
        assert!(var.type_id.0 <= TYPE_ID_MASK);
    }

    #[test]
    fn mismatched_value_is_an_encoding_error() {
        let t = TypeTable::builtin();
        assert_eq!(
            calc_size(t, &Value::Boolean(true), TypeId::INT32),
            Err(Error::Encoding)
        );
        assert_eq!(
            calc_size(t, &Value::String(None), TypeId::BYTE_STRING),
            Err(Error::Encoding)
        );
    }
}
