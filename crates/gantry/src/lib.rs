mod codec;
mod status;
mod table;
mod types;

pub use codec::{Decoder, Encoder, ExchangeBuffer, MAX_ATOM, calc_size, encode_into};
pub use status::{Error, Result, StatusCode};
pub use table::{Field, Layout, ScalarKind, TypeEntry, TypeId, TypeTable};
pub use types::{
    ExtensionObject, Guid, TYPE_ID_MASK, Value, Variant, VariantBody, VariantFlags,
};
