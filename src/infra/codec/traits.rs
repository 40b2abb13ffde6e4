//! Public traits exposed by the wire codec. They decouple message structures
//! from header handling and provide a uniform API to the bridge engine.
use crate::error::{CursorError, WireError};
use crate::infra::codec::cursor::{ByteOrder, ByteReader, ByteWriter};

/// Size of the `{id, len}` header that starts every message.
pub const MSG_HEADER_LEN: usize = 2;

/// Every message length, header included, is a multiple of this value.
pub const MSG_LEN_MULTIPLE: usize = 4;

/// Round `len` up to the message length multiple.
#[inline]
pub const fn align_len(len: usize) -> usize {
    (len + MSG_LEN_MULTIPLE - 1) & !(MSG_LEN_MULTIPLE - 1)
}

//==================================================================================WIRE_MESSAGE
/// Implemented by every message structure of both logical channels.
/// Body accessors see the bytes after the header only.
pub trait WireMessage: Sized {
    /// Message id placed in the header.
    const ID: u8;
    /// Smallest declared length accepted by the decoder, header included.
    const MIN_LEN: usize;

    /// Encoded length after alignment, header included.
    fn wire_len(&self) -> usize {
        align_len(Self::MIN_LEN)
    }

    /// Serialize the fields following the header.
    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError>;

    /// Deserialize the fields following the header. `len` is the declared
    /// message length, header included, and is at least `MIN_LEN`.
    fn read_body(reader: &mut ByteReader<'_>, len: usize) -> Result<Self, WireError>;
}

//==================================================================================TO_WIRE
/// Serialize a message, header and alignment padding included.
pub trait ToWire {
    /// Returns the number of bytes written on success.
    fn to_wire(&self, order: ByteOrder, buffer: &mut [u8]) -> Result<usize, WireError>;
}

impl<M: WireMessage> ToWire for M {
    fn to_wire(&self, order: ByteOrder, buffer: &mut [u8]) -> Result<usize, WireError> {
        let len = self.wire_len();
        if buffer.len() < len {
            return Err(CursorError::OutOfBounds {
                asked: len,
                available: buffer.len(),
            }
            .into());
        }
        let mut writer = ByteWriter::new(&mut buffer[..len], order);
        writer.write_u8(M::ID)?;
        writer.write_u8(len as u8)?;
        self.write_body(&mut writer)?;
        writer.pad_to(MSG_LEN_MULTIPLE)?;
        Ok(writer.position())
    }
}

//==================================================================================FROM_WIRE
/// Deserialize a message from exactly the bytes its header declares.
pub trait FromWire: Sized {
    fn from_wire(bytes: &[u8], order: ByteOrder) -> Result<Self, WireError>;
}

impl<M: WireMessage> FromWire for M {
    fn from_wire(bytes: &[u8], order: ByteOrder) -> Result<Self, WireError> {
        if bytes.len() < MSG_HEADER_LEN {
            return Err(WireError::TruncatedHeader { offset: 0 });
        }
        if bytes[0] != M::ID {
            return Err(WireError::UnexpectedId { id: bytes[0] });
        }
        let len = bytes.len();
        if len < M::MIN_LEN {
            return Err(WireError::Short {
                id: M::ID,
                expected: M::MIN_LEN,
                actual: len,
            });
        }
        let mut reader = ByteReader::new(&bytes[MSG_HEADER_LEN..], order);
        M::read_body(&mut reader, len)
    }
}
