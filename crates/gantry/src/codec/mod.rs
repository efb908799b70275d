mod decode;
mod encode;
mod size;

pub use decode::Decoder;
pub use encode::{Encoder, ExchangeBuffer, MAX_ATOM, encode_into};
pub use size::calc_size;
