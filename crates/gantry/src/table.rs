use once_cell::sync::Lazy;

/// Identifies a type within a [`TypeTable`]. Ids used as variant payloads
/// must fit the six mask bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub u8);

impl TypeId {
    pub const BOOLEAN: TypeId = TypeId(1);
    pub const SBYTE: TypeId = TypeId(2);
    pub const BYTE: TypeId = TypeId(3);
    pub const INT16: TypeId = TypeId(4);
    pub const UINT16: TypeId = TypeId(5);
    pub const INT32: TypeId = TypeId(6);
    pub const UINT32: TypeId = TypeId(7);
    pub const INT64: TypeId = TypeId(8);
    pub const UINT64: TypeId = TypeId(9);
    pub const FLOAT: TypeId = TypeId(10);
    pub const DOUBLE: TypeId = TypeId(11);
    pub const STRING: TypeId = TypeId(12);
    pub const DATE_TIME: TypeId = TypeId(13);
    pub const GUID: TypeId = TypeId(14);
    pub const BYTE_STRING: TypeId = TypeId(15);
    pub const STATUS_CODE: TypeId = TypeId(16);
    pub const EXTENSION_OBJECT: TypeId = TypeId(17);
    pub const VARIANT: TypeId = TypeId(18);
}

/// Fixed-width scalar kinds. Widths are exact wire sizes; none exceeds the
/// 16-byte atom limit the encoder relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    DateTime,
    Guid,
    StatusCode,
}

impl ScalarKind {
    #[inline]
    pub fn width(self) -> usize {
        match self {
            ScalarKind::Boolean | ScalarKind::SByte | ScalarKind::Byte => 1,
            ScalarKind::Int16 | ScalarKind::UInt16 => 2,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float | ScalarKind::StatusCode => 4,
            ScalarKind::Int64 | ScalarKind::UInt64 | ScalarKind::Double | ScalarKind::DateTime => 8,
            ScalarKind::Guid => 16,
        }
    }
}

/// Named, typed member of a structure layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: TypeId,
}

/// Wire layout of one type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    Scalar(ScalarKind),
    String,
    ByteString,
    Array { element: TypeId },
    Structure { fields: Vec<Field> },
    Variant,
    ExtensionObject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeEntry {
    pub id: TypeId,
    pub name: &'static str,
    pub layout: Layout,
}

/// Read-only registry the codec walks to interpret generic values. Built
/// once at startup and never mutated; descriptor references stay valid for
/// the life of the table.
#[derive(Clone, Debug)]
pub struct TypeTable {
    entries: Vec<TypeEntry>,
}

impl TypeTable {
    /// The built-in scalar and composite types.
    pub fn builtin() -> &'static TypeTable {
        &BUILTIN
    }

    /// Built-ins plus application-defined entries (typically structures).
    pub fn with_extensions(extra: Vec<TypeEntry>) -> TypeTable {
        let mut entries = BUILTIN.entries.clone();
        entries.extend(extra);
        TypeTable { entries }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn scalar(id: TypeId, name: &'static str, kind: ScalarKind) -> TypeEntry {
    TypeEntry { id, name, layout: Layout::Scalar(kind) }
}

static BUILTIN: Lazy<TypeTable> = Lazy::new(|| TypeTable {
    entries: vec![
        scalar(TypeId::BOOLEAN, "Boolean", ScalarKind::Boolean),
        scalar(TypeId::SBYTE, "SByte", ScalarKind::SByte),
        scalar(TypeId::BYTE, "Byte", ScalarKind::Byte),
        scalar(TypeId::INT16, "Int16", ScalarKind::Int16),
        scalar(TypeId::UINT16, "UInt16", ScalarKind::UInt16),
        scalar(TypeId::INT32, "Int32", ScalarKind::Int32),
        scalar(TypeId::UINT32, "UInt32", ScalarKind::UInt32),
        scalar(TypeId::INT64, "Int64", ScalarKind::Int64),
        scalar(TypeId::UINT64, "UInt64", ScalarKind::UInt64),
        scalar(TypeId::FLOAT, "Float", ScalarKind::Float),
        scalar(TypeId::DOUBLE, "Double", ScalarKind::Double),
        TypeEntry { id: TypeId::STRING, name: "String", layout: Layout::String },
        scalar(TypeId::DATE_TIME, "DateTime", ScalarKind::DateTime),
        scalar(TypeId::GUID, "Guid", ScalarKind::Guid),
        TypeEntry { id: TypeId::BYTE_STRING, name: "ByteString", layout: Layout::ByteString },
        scalar(TypeId::STATUS_CODE, "StatusCode", ScalarKind::StatusCode),
        TypeEntry {
            id: TypeId::EXTENSION_OBJECT,
            name: "ExtensionObject",
            layout: Layout::ExtensionObject,
        },
        TypeEntry { id: TypeId::VARIANT, name: "Variant", layout: Layout::Variant },
    ],
});
