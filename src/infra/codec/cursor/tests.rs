//! Edge cases for ByteReader and ByteWriter.
use super::*;

#[test]
/// Sequential reads across primitive types in little-endian order.
fn test_read_little_endian() {
    let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
    let mut reader = ByteReader::new(&data, ByteOrder::Little);
    assert_eq!(reader.read_u8().unwrap(), 0x12);
    assert_eq!(reader.read_u16().unwrap(), 0x5634);
    assert_eq!(reader.read_u32().unwrap(), 0xDEBC9A78);
    assert_eq!(reader.remaining(), 0);
}

#[test]
/// The same bytes read back in big-endian order.
fn test_read_big_endian() {
    let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
    let mut reader = ByteReader::new(&data, ByteOrder::Big);
    assert_eq!(reader.read_u16().unwrap(), 0x1234);
    assert_eq!(reader.read_u32().unwrap(), 0x56789ABC);
}

#[test]
/// Pinned big-endian helper ignores the negotiated order.
fn test_read_u16_be_pinned() {
    let data = [0x02, 0x00];
    let mut reader = ByteReader::new(&data, ByteOrder::Little);
    assert_eq!(reader.read_u16_be().unwrap(), 0x0200);
}

#[test]
/// Detects out-of-bounds reads and leaves the cursor untouched.
fn test_read_out_of_bounds() {
    let data = [0xFF, 0x01, 0x02];
    let mut reader = ByteReader::new(&data, ByteOrder::Little);
    reader.advance(1).unwrap();
    assert_eq!(
        reader.read_u32(),
        Err(CursorError::OutOfBounds {
            asked: 4,
            available: 2
        })
    );
    assert_eq!(reader.position(), 1);
    assert_eq!(reader.read_u16().unwrap(), 0x0201);
}

#[test]
/// Slices borrow from the source buffer.
fn test_read_slice() {
    let data = [1, 2, 3, 4, 5];
    let mut reader = ByteReader::new(&data, ByteOrder::Little);
    reader.advance(2).unwrap();
    assert_eq!(reader.read_slice(3).unwrap(), &[3, 4, 5]);
    assert!(reader.read_slice(1).is_err());
}

#[test]
/// Writer honours the negotiated byte order.
fn test_write_orders() {
    let mut buf = [0u8; 6];
    let mut writer = ByteWriter::new(&mut buf, ByteOrder::Big);
    writer.write_u16(0x1234).unwrap();
    writer.write_u32(0xA1B2C3D4).unwrap();
    assert_eq!(buf, [0x12, 0x34, 0xA1, 0xB2, 0xC3, 0xD4]);

    let mut buf = [0u8; 6];
    let mut writer = ByteWriter::new(&mut buf, ByteOrder::Little);
    writer.write_u16(0x1234).unwrap();
    writer.write_u32(0xA1B2C3D4).unwrap();
    assert_eq!(buf, [0x34, 0x12, 0xD4, 0xC3, 0xB2, 0xA1]);
}

#[test]
/// Reserved bytes and padding are zero-filled even over dirty memory.
fn test_write_advance_and_pad() {
    let mut buf = [0xAAu8; 8];
    let mut writer = ByteWriter::new(&mut buf, ByteOrder::Little);
    writer.write_u8(7).unwrap();
    writer.advance(1).unwrap();
    writer.write_u8(9).unwrap();
    writer.pad_to(4).unwrap();
    assert_eq!(writer.position(), 4);
    writer.pad_to(4).unwrap();
    assert_eq!(writer.position(), 4);
    assert_eq!(&buf[..4], &[7, 0, 9, 0]);
    assert_eq!(buf[4], 0xAA);
}

#[test]
/// Overflowing writes are rejected.
fn test_write_out_of_bounds() {
    let mut buf = [0u8; 3];
    let mut writer = ByteWriter::new(&mut buf, ByteOrder::Little);
    writer.write_u16(1).unwrap();
    assert_eq!(
        writer.write_u16(2),
        Err(CursorError::OutOfBounds {
            asked: 2,
            available: 1
        })
    );
    assert!(writer.write_slice(&[1, 2]).is_err());
    assert!(writer.write_i8(-1).is_ok());
    assert_eq!(buf, [1, 0, 0xFF]);
}
