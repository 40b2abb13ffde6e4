//! Wire messages exchanged over the two bulk pipes of a channel.
//!
//! Every message starts with a `{id: u8, len: u8}` header where `len`
//! includes the header and is a multiple of four. A buffer holds a sequence
//! of messages; a header with `id == 0` or `len == 0` ends the sequence so a
//! sender can avoid a USB zero-length packet.
//!
//! Host to device, command pipe: [`HelloDevice`], [`DeviceInfoRequest`],
//! [`CanInfoRequest`], [`NominalBitTiming`], [`DataBitTiming`],
//! [`FeaturesMsg`], [`BusMsg`].
//! Device to host, command pipe: [`HelloHost`], [`DeviceInfo`], [`CanInfo`],
//! [`ErrorReply`].
//! Host to device, CAN pipe: [`CanTx`].
//! Device to host, CAN pipe: [`CanRx`], [`CanTxr`], [`CanStatus`], [`CanError`].
use crate::core::{
    BusErrorEvent, BusStatus, CanErrorCode, CanFrame, Features, FrameFlags,
    StatusFlags, MAX_FRAME_PAYLOAD,
};
use crate::error::{CommandError, CursorError, WireError};
use crate::infra::codec::cursor::{ByteOrder, ByteReader, ByteWriter};
use crate::infra::codec::traits::{align_len, FromWire, WireMessage, MSG_HEADER_LEN};
use crate::protocol::timing::{BitTiming, BitTimingRange};

/// Message identifiers.
pub mod id {
    pub const EOF: u8 = 0x00;
    pub const HELLO_DEVICE: u8 = 0x01;
    pub const HELLO_HOST: u8 = 0x02;
    pub const DEVICE_INFO: u8 = 0x03;
    pub const CAN_INFO: u8 = 0x04;
    pub const NM_BITTIMING: u8 = 0x05;
    pub const DT_BITTIMING: u8 = 0x06;
    pub const FEATURES: u8 = 0x07;
    pub const BUS: u8 = 0x08;
    pub const ERROR: u8 = 0x09;
    pub const CAN_STATUS: u8 = 0x10;
    pub const CAN_RX: u8 = 0x11;
    pub const CAN_TX: u8 = 0x12;
    pub const CAN_TXR: u8 = 0x13;
    pub const CAN_ERROR: u8 = 0x14;
}

//==================================================================================ITERATION
/// One message as found in a received buffer; `bytes` spans the declared
/// length, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage<'a> {
    pub id: u8,
    pub bytes: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Decode into a concrete message type.
    pub fn decode<M: FromWire>(&self, order: ByteOrder) -> Result<M, WireError> {
        M::from_wire(self.bytes, order)
    }
}

/// Walks the messages of a received buffer.
///
/// Yields `Ok` for every well-formed message. A malformed header yields a
/// single `Err` and ends iteration; messages already yielded stay valid.
pub struct MessageIter<'a> {
    buffer: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> MessageIter<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            offset: 0,
            done: false,
        }
    }

    /// Offset of the next header.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<RawMessage<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buffer.len() {
            return None;
        }
        let offset = self.offset;
        let remaining = self.buffer.len() - offset;
        if remaining < MSG_HEADER_LEN {
            self.done = true;
            return Some(Err(WireError::TruncatedHeader { offset }));
        }
        let id = self.buffer[offset];
        let len = self.buffer[offset + 1];
        if id == id::EOF || len == 0 {
            self.done = true;
            return None;
        }
        if (len as usize) < MSG_HEADER_LEN {
            self.done = true;
            return Some(Err(WireError::LengthBelowHeader { offset, len }));
        }
        if len as usize > remaining {
            self.done = true;
            return Some(Err(WireError::LengthOverflow {
                offset,
                len,
                available: remaining,
            }));
        }
        self.offset += len as usize;
        Some(Ok(RawMessage {
            id,
            bytes: &self.buffer[offset..offset + len as usize],
        }))
    }
}

//==================================================================================HANDSHAKE
/// Host greeting; resets the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HelloDevice;

impl WireMessage for HelloDevice {
    const ID: u8 = id::HELLO_DEVICE;
    const MIN_LEN: usize = MSG_HEADER_LEN;

    fn write_body(&self, _writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        Ok(())
    }

    fn read_body(_reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// Device greeting declaring the protocol version and the byte order used
/// by every later message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HelloHost {
    pub proto_version: u8,
    pub byte_order: ByteOrder,
    /// Size of the command pipe buffers. Always big-endian on the wire.
    pub cmd_buffer_size: u16,
}

impl WireMessage for HelloHost {
    const ID: u8 = id::HELLO_HOST;
    const MIN_LEN: usize = 8;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.proto_version)?;
        writer.write_u8(self.byte_order as u8)?;
        writer.write_u16_be(self.cmd_buffer_size)?;
        writer.advance(2)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let proto_version = reader.read_u8()?;
        let raw = reader.read_u8()?;
        let byte_order = ByteOrder::from_u8(raw).ok_or(WireError::InvalidValue {
            field: "byte_order",
            value: raw,
        })?;
        let cmd_buffer_size = reader.read_u16_be()?;
        Ok(Self {
            proto_version,
            byte_order,
            cmd_buffer_size,
        })
    }
}

//==================================================================================DEVICE_INFO
/// Header-only query for [`DeviceInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfoRequest;

impl WireMessage for DeviceInfoRequest {
    const ID: u8 = id::DEVICE_INFO;
    const MIN_LEN: usize = MSG_HEADER_LEN;

    fn write_body(&self, _writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        Ok(())
    }

    fn read_body(_reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// Firmware version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

pub const SERIAL_MAX_LEN: usize = 16;
pub const NAME_MAX_LEN: usize = 32;

/// Device identity and feature masks of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub feat_perm: Features,
    pub feat_conf: Features,
    pub firmware: FirmwareVersion,
    sn_len: u8,
    sn: [u8; SERIAL_MAX_LEN],
    name_len: u8,
    name: [u8; NAME_MAX_LEN],
}

impl DeviceInfo {
    /// Serial and name are truncated to their wire capacity.
    pub fn new(
        feat_perm: Features,
        feat_conf: Features,
        firmware: FirmwareVersion,
        serial: &[u8],
        name: &[u8],
    ) -> Self {
        let mut info = Self {
            feat_perm,
            feat_conf,
            firmware,
            sn_len: 0,
            sn: [0; SERIAL_MAX_LEN],
            name_len: 0,
            name: [0; NAME_MAX_LEN],
        };
        let sn_len = serial.len().min(SERIAL_MAX_LEN);
        info.sn[..sn_len].copy_from_slice(&serial[..sn_len]);
        info.sn_len = sn_len as u8;
        let name_len = name.len().min(NAME_MAX_LEN);
        info.name[..name_len].copy_from_slice(&name[..name_len]);
        info.name_len = name_len as u8;
        info
    }

    pub fn serial(&self) -> &[u8] {
        &self.sn[..self.sn_len as usize]
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }
}

impl WireMessage for DeviceInfo {
    const ID: u8 = id::DEVICE_INFO;
    const MIN_LEN: usize = 60;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u16(self.feat_perm.bits())?;
        writer.write_u16(self.feat_conf.bits())?;
        writer.write_u8(self.firmware.major)?;
        writer.write_u8(self.firmware.minor)?;
        writer.write_u8(self.firmware.patch)?;
        writer.write_u8(self.sn_len)?;
        writer.write_slice(&self.sn)?;
        writer.write_u8(self.name_len)?;
        writer.write_slice(&self.name)?;
        writer.advance(1)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let feat_perm = Features::from_bits_truncate(reader.read_u16()?);
        let feat_conf = Features::from_bits_truncate(reader.read_u16()?);
        let firmware = FirmwareVersion {
            major: reader.read_u8()?,
            minor: reader.read_u8()?,
            patch: reader.read_u8()?,
        };
        let sn_len = (reader.read_u8()? as usize).min(SERIAL_MAX_LEN);
        let sn = reader.read_slice(SERIAL_MAX_LEN)?;
        let name_len = (reader.read_u8()? as usize).min(NAME_MAX_LEN);
        let name = reader.read_slice(NAME_MAX_LEN)?;
        Ok(Self::new(
            feat_perm,
            feat_conf,
            firmware,
            &sn[..sn_len],
            &name[..name_len],
        ))
    }
}

//==================================================================================CAN_INFO
/// Header-only query for [`CanInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanInfoRequest;

impl WireMessage for CanInfoRequest {
    const ID: u8 = id::CAN_INFO;
    const MIN_LEN: usize = MSG_HEADER_LEN;

    fn write_body(&self, _writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        Ok(())
    }

    fn read_body(_reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// Controller capabilities: clock, bit-timing ranges and FIFO sizes.
///
/// Only `sjw` maximums travel on the wire; decoded ranges use a minimum of 1.
/// A controller without a data phase reports an all-zero data range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanInfo {
    pub can_clk_hz: u32,
    pub msg_buffer_size: u16,
    pub nominal: BitTimingRange,
    pub data: Option<BitTimingRange>,
    pub tx_fifo_size: u8,
    pub rx_fifo_size: u8,
}

impl WireMessage for CanInfo {
    const ID: u8 = id::CAN_INFO;
    const MIN_LEN: usize = 28;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        let nm = &self.nominal;
        writer.write_u32(self.can_clk_hz)?;
        writer.write_u16(self.msg_buffer_size)?;
        writer.write_u16(nm.min.brp)?;
        writer.write_u16(nm.max.brp)?;
        writer.write_u16(nm.min.tseg1)?;
        writer.write_u16(nm.max.tseg1)?;
        writer.write_u8(nm.max.sjw)?;
        writer.write_u8(nm.min.tseg2)?;
        writer.write_u8(nm.max.tseg2)?;
        writer.write_u8(self.tx_fifo_size)?;
        writer.write_u8(self.rx_fifo_size)?;
        match &self.data {
            Some(dt) => {
                writer.write_u8(dt.min.brp as u8)?;
                writer.write_u8(dt.max.brp as u8)?;
                writer.write_u8(dt.min.tseg1 as u8)?;
                writer.write_u8(dt.max.tseg1 as u8)?;
                writer.write_u8(dt.max.sjw)?;
                writer.write_u8(dt.min.tseg2)?;
                writer.write_u8(dt.max.tseg2)
            }
            None => writer.advance(7),
        }
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let can_clk_hz = reader.read_u32()?;
        let msg_buffer_size = reader.read_u16()?;
        let mut nominal = BitTimingRange::default();
        nominal.min.brp = reader.read_u16()?;
        nominal.max.brp = reader.read_u16()?;
        nominal.min.tseg1 = reader.read_u16()?;
        nominal.max.tseg1 = reader.read_u16()?;
        nominal.min.sjw = 1;
        nominal.max.sjw = reader.read_u8()?;
        nominal.min.tseg2 = reader.read_u8()?;
        nominal.max.tseg2 = reader.read_u8()?;
        let tx_fifo_size = reader.read_u8()?;
        let rx_fifo_size = reader.read_u8()?;
        let mut dt = BitTimingRange::default();
        dt.min.brp = reader.read_u8()? as u16;
        dt.max.brp = reader.read_u8()? as u16;
        dt.min.tseg1 = reader.read_u8()? as u16;
        dt.max.tseg1 = reader.read_u8()? as u16;
        dt.min.sjw = 1;
        dt.max.sjw = reader.read_u8()?;
        dt.min.tseg2 = reader.read_u8()?;
        dt.max.tseg2 = reader.read_u8()?;
        Ok(Self {
            can_clk_hz,
            msg_buffer_size,
            nominal,
            data: (dt.max.brp != 0).then_some(dt),
            tx_fifo_size,
            rx_fifo_size,
        })
    }
}

//==================================================================================BIT_TIMING
macro_rules! bit_timing_message {
    ($(#[$doc:meta])* $name:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub BitTiming);

        impl WireMessage for $name {
            const ID: u8 = $id;
            const MIN_LEN: usize = 8;

            fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
                writer.write_u8(self.0.sjw)?;
                writer.write_u8(self.0.tseg2)?;
                writer.write_u16(self.0.brp)?;
                writer.write_u16(self.0.tseg1)
            }

            fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
                let sjw = reader.read_u8()?;
                let tseg2 = reader.read_u8()?;
                let brp = reader.read_u16()?;
                let tseg1 = reader.read_u16()?;
                Ok(Self(BitTiming {
                    brp,
                    sjw,
                    tseg1,
                    tseg2,
                }))
            }
        }
    };
}

bit_timing_message!(
    /// Requested arbitration-phase bit timing.
    NominalBitTiming,
    id::NM_BITTIMING
);
bit_timing_message!(
    /// Requested data-phase bit timing.
    DataBitTiming,
    id::DT_BITTIMING
);

//==================================================================================FEATURES
/// Operation of a [`FeaturesMsg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FeatureOp {
    /// Reset to the permanently enabled set.
    Clear = 0,
    /// Add flags to the active set.
    Or = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeaturesMsg {
    pub op: FeatureOp,
    pub arg: u32,
}

impl WireMessage for FeaturesMsg {
    const ID: u8 = id::FEATURES;
    const MIN_LEN: usize = 8;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.op as u8)?;
        writer.advance(1)?;
        writer.write_u32(self.arg)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let raw = reader.read_u8()?;
        reader.advance(1)?;
        let arg = reader.read_u32()?;
        let op = match raw {
            0 => FeatureOp::Clear,
            1 => FeatureOp::Or,
            value => return Err(WireError::InvalidValue { field: "op", value }),
        };
        Ok(Self { op, arg })
    }
}

//==================================================================================BUS
/// Bus on (`true`) or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusMsg {
    pub on: bool,
}

impl WireMessage for BusMsg {
    const ID: u8 = id::BUS;
    const MIN_LEN: usize = 4;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u16(self.on as u16)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self {
            on: reader.read_u16()? != 0,
        })
    }
}

//==================================================================================ERROR
/// Outcome of a command: `0` on success, a negative [`CommandError`] code otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorReply {
    pub error: i8,
}

impl ErrorReply {
    pub fn from_result(result: Result<(), CommandError>) -> Self {
        Self {
            error: match result {
                Ok(()) => 0,
                Err(err) => err.code(),
            },
        }
    }

    /// `None` for a code this crate does not know.
    pub fn result(&self) -> Option<Result<(), CommandError>> {
        CommandError::from_code(self.error)
    }
}

impl WireMessage for ErrorReply {
    const ID: u8 = id::ERROR;
    const MIN_LEN: usize = 4;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_i8(self.error)?;
        writer.advance(1)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self {
            error: reader.read_i8()?,
        })
    }
}

//==================================================================================CAN_STATUS
/// Periodic bus-status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanStatus {
    pub flags: StatusFlags,
    pub bus_status: BusStatus,
    pub timestamp_us: u32,
    pub rx_lost: u16,
    pub tx_dropped: u16,
    pub rx_errors: u8,
    pub tx_errors: u8,
    pub rx_fifo_size: u8,
    pub tx_fifo_size: u8,
}

impl WireMessage for CanStatus {
    const ID: u8 = id::CAN_STATUS;
    const MIN_LEN: usize = 16;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.flags.bits())?;
        writer.write_u8(self.bus_status as u8)?;
        writer.write_u32(self.timestamp_us)?;
        writer.write_u16(self.rx_lost)?;
        writer.write_u16(self.tx_dropped)?;
        writer.write_u8(self.rx_errors)?;
        writer.write_u8(self.tx_errors)?;
        writer.write_u8(self.rx_fifo_size)?;
        writer.write_u8(self.tx_fifo_size)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let flags = StatusFlags::from_bits_truncate(reader.read_u8()?);
        let raw = reader.read_u8()?;
        let bus_status = BusStatus::from_u8(raw).ok_or(WireError::InvalidValue {
            field: "bus_status",
            value: raw,
        })?;
        Ok(Self {
            flags,
            bus_status,
            timestamp_us: reader.read_u32()?,
            rx_lost: reader.read_u16()?,
            tx_dropped: reader.read_u16()?,
            rx_errors: reader.read_u8()?,
            tx_errors: reader.read_u8()?,
            rx_fifo_size: reader.read_u8()?,
            tx_fifo_size: reader.read_u8()?,
        })
    }
}

//==================================================================================CAN_FRAMES
fn read_frame_payload(
    reader: &mut ByteReader<'_>,
    frame: &mut CanFrame,
    id: u8,
    fixed: usize,
    len: usize,
) -> Result<(), WireError> {
    let payload = frame.len();
    if len < fixed + payload {
        return Err(WireError::Short {
            id,
            expected: fixed + payload,
            actual: len,
        });
    }
    frame.data[..payload].copy_from_slice(reader.read_slice(payload)?);
    Ok(())
}

/// Received frame with its reconstructed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanRx(pub CanFrame);

impl WireMessage for CanRx {
    const ID: u8 = id::CAN_RX;
    const MIN_LEN: usize = 12;

    fn wire_len(&self) -> usize {
        align_len(Self::MIN_LEN + self.0.len())
    }

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.0.dlc)?;
        writer.write_u8(self.0.flags.bits())?;
        writer.write_u32(self.0.id)?;
        writer.write_u32(self.0.timestamp_us)?;
        writer.write_slice(self.0.payload())
    }

    fn read_body(reader: &mut ByteReader<'_>, len: usize) -> Result<Self, WireError> {
        let mut frame = CanFrame::empty();
        frame.dlc = reader.read_u8()? & 0x0F;
        frame.flags = FrameFlags::from_bits_truncate(reader.read_u8()?);
        frame.id = reader.read_u32()?;
        frame.timestamp_us = reader.read_u32()?;
        read_frame_payload(reader, &mut frame, Self::ID, Self::MIN_LEN, len)?;
        Ok(Self(frame))
    }
}

/// Transmit request from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanTx {
    pub frame: CanFrame,
    /// Echoed back in the matching [`CanTxr`].
    pub track_id: u8,
}

impl WireMessage for CanTx {
    const ID: u8 = id::CAN_TX;
    const MIN_LEN: usize = 10;

    fn wire_len(&self) -> usize {
        align_len(Self::MIN_LEN + self.frame.len())
    }

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.frame.dlc)?;
        writer.write_u8(self.frame.flags.bits())?;
        writer.write_u32(self.frame.id)?;
        writer.write_u8(self.track_id)?;
        writer.advance(1)?;
        writer.write_slice(self.frame.payload())
    }

    fn read_body(reader: &mut ByteReader<'_>, len: usize) -> Result<Self, WireError> {
        let mut frame = CanFrame::empty();
        frame.dlc = reader.read_u8()? & 0x0F;
        frame.flags = FrameFlags::from_bits_truncate(reader.read_u8()?);
        frame.id = reader.read_u32()?;
        let track_id = reader.read_u8()?;
        reader.advance(1)?;
        read_frame_payload(reader, &mut frame, Self::ID, Self::MIN_LEN, len)?;
        Ok(Self { frame, track_id })
    }
}

/// Transmit result. `DRP` in `flags` marks a request the device dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanTxr {
    pub track_id: u8,
    pub flags: FrameFlags,
    pub timestamp_us: u32,
}

impl WireMessage for CanTxr {
    const ID: u8 = id::CAN_TXR;
    const MIN_LEN: usize = 8;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        writer.write_u8(self.track_id)?;
        writer.write_u8(self.flags.bits())?;
        writer.write_u32(self.timestamp_us)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        Ok(Self {
            track_id: reader.read_u8()?,
            flags: FrameFlags::from_bits_truncate(reader.read_u8()?),
            timestamp_us: reader.read_u32()?,
        })
    }
}

const ERROR_FLAG_TX: u8 = 0x01;
const ERROR_FLAG_DATA_PHASE: u8 = 0x02;

/// Bus error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanError(pub BusErrorEvent);

impl WireMessage for CanError {
    const ID: u8 = id::CAN_ERROR;
    const MIN_LEN: usize = 8;

    fn write_body(&self, writer: &mut ByteWriter<'_>) -> Result<(), CursorError> {
        let mut flags = 0;
        if self.0.tx {
            flags |= ERROR_FLAG_TX;
        }
        if self.0.data_phase {
            flags |= ERROR_FLAG_DATA_PHASE;
        }
        writer.write_u8(self.0.code as u8)?;
        writer.write_u8(flags)?;
        writer.write_u32(self.0.timestamp_us)
    }

    fn read_body(reader: &mut ByteReader<'_>, _len: usize) -> Result<Self, WireError> {
        let raw = reader.read_u8()?;
        let code = CanErrorCode::from_u8(raw).ok_or(WireError::InvalidValue {
            field: "error",
            value: raw,
        })?;
        let flags = reader.read_u8()?;
        Ok(Self(BusErrorEvent {
            code,
            tx: flags & ERROR_FLAG_TX != 0,
            data_phase: flags & ERROR_FLAG_DATA_PHASE != 0,
            timestamp_us: reader.read_u32()?,
        }))
    }
}

//==================================================================================DEVICE_MESSAGE
/// Any message a device sends to the host, decoded by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    HelloHost(HelloHost),
    DeviceInfo(DeviceInfo),
    CanInfo(CanInfo),
    Error(ErrorReply),
    CanStatus(CanStatus),
    CanRx(CanRx),
    CanTxr(CanTxr),
    CanError(CanError),
}

impl DeviceMessage {
    pub fn decode(raw: &RawMessage<'_>, order: ByteOrder) -> Result<Self, WireError> {
        Ok(match raw.id {
            id::HELLO_HOST => Self::HelloHost(raw.decode(order)?),
            id::DEVICE_INFO => Self::DeviceInfo(raw.decode(order)?),
            id::CAN_INFO => Self::CanInfo(raw.decode(order)?),
            id::ERROR => Self::Error(raw.decode(order)?),
            id::CAN_STATUS => Self::CanStatus(raw.decode(order)?),
            id::CAN_RX => Self::CanRx(raw.decode(order)?),
            id::CAN_TXR => Self::CanTxr(raw.decode(order)?),
            id::CAN_ERROR => Self::CanError(raw.decode(order)?),
            other => return Err(WireError::UnexpectedId { id: other }),
        })
    }
}

/// Largest encoded CAN-pipe message (an FD `CAN_RX`).
pub const MAX_CAN_MSG_LEN: usize = align_len(12 + MAX_FRAME_PAYLOAD);
