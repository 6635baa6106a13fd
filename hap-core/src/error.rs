use std::fmt;

/// Errors produced by the pairing, transport and attribute-database core.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A length field or buffer was the wrong size.
    InvalidLength,

    /// A field contained a value outside its allowed range.
    InvalidValue,

    /// Ran out of space writing to, or data reading from, a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// A required TLV item was missing from a pairing message.
    MissingTlvItem(u8),

    /// SRP or key-exchange cryptographic verification failed.
    CryptoVerificationFailed,

    /// A pairing or session state machine received a message out of order.
    UnexpectedState,

    /// The controller is not known to the accessory (no such pairing).
    UnknownController,

    /// The accessory is already paired and does not accept a new Pair Setup.
    AlreadyPaired,

    /// The attribute database rejected a change (see [`crate::model::validation::ValidationError`]).
    Validation(crate::model::validation::ValidationError),

    /// The persistent store returned an error.
    Storage(String),

    /// Wraps a [`std::io::Error`] from the transport layer.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidLength => f.write_str("invalid length value specified"),
            Error::InvalidValue => f.write_str("invalid value for field"),
            Error::Eof => f.write_str("end of buffer"),
            Error::IncompleteParse => f.write_str("excess data in buffer"),
            Error::MissingTlvItem(ty) => write!(f, "missing required TLV item (type {})", ty),
            Error::CryptoVerificationFailed => f.write_str("cryptographic verification failed"),
            Error::UnexpectedState => f.write_str("message received in unexpected state"),
            Error::UnknownController => f.write_str("unknown controller"),
            Error::AlreadyPaired => f.write_str("accessory is already paired"),
            Error::Validation(e) => write!(f, "attribute database validation failed: {}", e),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
            Error::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::model::validation::ValidationError> for Error {
    fn from(e: crate::model::validation::ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
