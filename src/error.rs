//! Error definitions shared across library modules.
//! Each type models one failure class of the bridge: byte-level cursor
//! overruns, transport malformation, protocol validation and endpoint
//! exhaustion. None of them is fatal; callers absorb them locally.
use thiserror_no_std::Error;

//==================================================================================CURSOR_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while reading or writing a byte buffer.
pub enum CursorError {
    /// Attempted to access past the end of the buffer.
    #[error("Attempted to access out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
}

//==================================================================================WIRE_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Malformed or incomplete wire messages.
pub enum WireError {
    /// Fewer bytes than a message header remain in the buffer.
    #[error("Truncated header at offset {offset}")]
    TruncatedHeader { offset: usize },
    /// Declared length is smaller than the header itself.
    #[error("Declared length {len} below header size at offset {offset}")]
    LengthBelowHeader { offset: usize, len: u8 },
    /// Declared length runs past the received bytes.
    #[error("Declared length {len} at offset {offset} exceeds {available} available bytes")]
    LengthOverflow {
        offset: usize,
        len: u8,
        available: usize,
    },
    /// Message is shorter than its fixed layout requires.
    #[error("Message 0x{id:02x} too short: expected {expected}, got {actual}")]
    Short {
        id: u8,
        expected: usize,
        actual: usize,
    },
    /// Enumerated field carries a value outside its domain.
    #[error("Invalid value {value} for field {field}")]
    InvalidValue { field: &'static str, value: u8 },
    /// Message id does not match the decoder.
    #[error("Unexpected message id 0x{id:02x}")]
    UnexpectedId { id: u8 },
    /// Cursor overran while encoding or decoding.
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

//==================================================================================COMMAND_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Protocol validation failures answered with an error reply.
pub enum CommandError {
    /// Declared length shorter than the expected structure.
    #[error("Command too short")]
    Short,
    /// Parameter combination not allowed.
    #[error("Invalid parameter")]
    Param,
    /// Unknown command or unsupported feature.
    #[error("Unsupported")]
    Unsupported,
}

impl CommandError {
    /// Reply code placed in the ERROR message.
    pub const fn code(self) -> i8 {
        match self {
            Self::Short => -1,
            Self::Param => -2,
            Self::Unsupported => -3,
        }
    }

    /// Inverse of [`CommandError::code`]; `0` means success.
    pub const fn from_code(code: i8) -> Option<Result<(), Self>> {
        match code {
            0 => Some(Ok(())),
            -1 => Some(Err(Self::Short)),
            -2 => Some(Err(Self::Param)),
            -3 => Some(Err(Self::Unsupported)),
            _ => None,
        }
    }
}

impl From<WireError> for CommandError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::InvalidValue { .. } => Self::Param,
            WireError::UnexpectedId { .. } => Self::Unsupported,
            _ => Self::Short,
        }
    }
}

//==================================================================================ENDPOINT_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Double-buffered endpoint failures.
pub enum EndpointError {
    /// The active bank is empty.
    #[error("Nothing to send")]
    NothingToSend,
    /// The other bank is still in flight.
    #[error("Endpoint busy")]
    Busy,
    /// A message is larger than a whole bank.
    #[error("Message of {len} bytes exceeds bank capacity {capacity}")]
    Overflow { len: usize, capacity: usize },
}
