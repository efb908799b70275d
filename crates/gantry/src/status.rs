use thiserror::Error;

/// Numeric status code as it appears on the wire. Zero is success; the top
/// bit marks failure and the next sixteen bits identify the condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    pub const BAD_OUT_OF_MEMORY: StatusCode = StatusCode(0x8003_0000);
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    pub const BAD_ENCODING_ERROR: StatusCode = StatusCode(0x8006_0000);
    pub const BAD_DECODING_ERROR: StatusCode = StatusCode(0x8007_0000);

    #[inline]
    pub fn is_good(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            StatusCode::GOOD => "Good",
            StatusCode::BAD_INTERNAL_ERROR => "BadInternalError",
            StatusCode::BAD_OUT_OF_MEMORY => "BadOutOfMemory",
            StatusCode::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            StatusCode::BAD_ENCODING_ERROR => "BadEncodingError",
            StatusCode::BAD_DECODING_ERROR => "BadDecodingError",
            _ => return write!(f, "StatusCode(0x{:08x})", self.0),
        };
        f.write_str(name)
    }
}

/// Failure taxonomy shared by the codec, the socket layer and the network
/// manager. Converts losslessly into the wire [`StatusCode`] space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory,
    #[error("communication error")]
    Communication,
    #[error("internal error")]
    Internal,
    #[error("encoding error")]
    Encoding,
    #[error("decoding error")]
    Decoding,
}

impl Error {
    #[inline]
    pub fn status(self) -> StatusCode {
        match self {
            Error::OutOfMemory => StatusCode::BAD_OUT_OF_MEMORY,
            Error::Communication => StatusCode::BAD_COMMUNICATION_ERROR,
            Error::Internal => StatusCode::BAD_INTERNAL_ERROR,
            Error::Encoding => StatusCode::BAD_ENCODING_ERROR,
            Error::Decoding => StatusCode::BAD_DECODING_ERROR,
        }
    }
}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        e.status()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bit() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::BAD_ENCODING_ERROR.is_good());
        assert!(!StatusCode::from(Error::Communication).is_good());
    }

    #[test]
    fn display_names() {
        assert_eq!(StatusCode::BAD_OUT_OF_MEMORY.to_string(), "BadOutOfMemory");
        assert_eq!(StatusCode(0x8099_0000).to_string(), "StatusCode(0x80990000)");
    }
}
