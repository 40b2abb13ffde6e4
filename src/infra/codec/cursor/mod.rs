//! Byte-oriented reader/writer used by the wire codec.
//! Multi-byte fields follow the byte order negotiated at handshake; a few
//! fields are pinned to big-endian regardless and get dedicated helpers.
use crate::error::CursorError;

/// Byte order of multi-byte wire fields. The discriminant is the value the
/// host sends in `HELLO_HOST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ByteOrder {
    #[default]
    Little = 0,
    Big = 1,
}

impl ByteOrder {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Little),
            1 => Some(Self::Big),
            _ => None,
        }
    }
}

/// Reader over a `&[u8]` without extra allocation or copies.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    cursor: usize,
    order: ByteOrder,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8], order: ByteOrder) -> Self {
        Self {
            buffer,
            cursor: 0,
            order,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CursorError> {
        self.read_u8().map(|v| v as i8)
    }

    /// Read a `u16` in the negotiated byte order.
    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        let raw = self.take::<2>()?;
        Ok(match self.order {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    /// Read a `u16` that is big-endian on the wire whatever the negotiated order.
    pub fn read_u16_be(&mut self) -> Result<u16, CursorError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    /// Read a `u32` in the negotiated byte order.
    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let raw = self.take::<4>()?;
        Ok(match self.order {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    /// Skip `length` bytes (reserved fields).
    pub fn advance(&mut self, length: usize) -> Result<(), CursorError> {
        self.read_slice(length).map(|_| ())
    }

    /// Return a slice of `len` bytes from the current position.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        let end = self.cursor + len;
        if end > self.buffer.len() {
            return Err(CursorError::OutOfBounds {
                asked: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }
}
//==================================================================================BYTEWRITER

/// Writer laying wire fields into a `&mut [u8]`.
pub struct ByteWriter<'a> {
    buffer: &'a mut [u8],
    cursor: usize,
    order: ByteOrder,
}

impl<'a> ByteWriter<'a> {
    /// Create a writer positioned at the start of the buffer.
    pub fn new(buffer: &'a mut [u8], order: ByteOrder) -> Self {
        Self {
            buffer,
            cursor: 0,
            order,
        }
    }

    /// Bytes written so far (useful to derive the final length).
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CursorError> {
        let end = self.cursor + bytes.len();
        if end > self.buffer.len() {
            return Err(CursorError::OutOfBounds {
                asked: bytes.len(),
                available: self.buffer.len() - self.cursor,
            });
        }
        self.buffer[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CursorError> {
        self.put(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), CursorError> {
        self.put(&[value as u8])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CursorError> {
        match self.order {
            ByteOrder::Little => self.put(&value.to_le_bytes()),
            ByteOrder::Big => self.put(&value.to_be_bytes()),
        }
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<(), CursorError> {
        self.put(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CursorError> {
        match self.order {
            ByteOrder::Little => self.put(&value.to_le_bytes()),
            ByteOrder::Big => self.put(&value.to_be_bytes()),
        }
    }

    /// Write `length` zero bytes (reserved fields).
    pub fn advance(&mut self, length: usize) -> Result<(), CursorError> {
        let end = self.cursor + length;
        if end > self.buffer.len() {
            return Err(CursorError::OutOfBounds {
                asked: length,
                available: self.buffer.len() - self.cursor,
            });
        }
        self.buffer[self.cursor..end].fill(0);
        self.cursor = end;
        Ok(())
    }

    /// Copy a byte slice into the buffer.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), CursorError> {
        self.put(slice)
    }

    /// Zero-fill up to the next multiple of `align`.
    pub fn pad_to(&mut self, align: usize) -> Result<(), CursorError> {
        let rem = self.cursor % align;
        if rem == 0 {
            return Ok(());
        }
        self.advance(align - rem)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
