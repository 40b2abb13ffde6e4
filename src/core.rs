//! Data model shared by the interrupt-side poller, the USB-side command
//! processor and the bus event aggregator.
//!
//! Every record defined here is a plain `Copy` value: records are copied into
//! ring slots and out again, they are never individually owned or freed.
use bitflags::bitflags;
use embedded_can::{ExtendedId, Id, StandardId};

/// Largest payload carried by a CAN-FD frame.
pub const MAX_FRAME_PAYLOAD: usize = 64;

/// Payload length for every 4-bit Data Length Code. Codes 9..=15 are only
/// meaningful for FD frames; classic controllers cap them at eight bytes.
pub const DLC_TO_LEN: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Map a DLC (only the low nibble is considered) to a payload byte count.
#[inline]
pub const fn dlc_to_len(dlc: u8) -> usize {
    DLC_TO_LEN[(dlc & 0x0F) as usize] as usize
}

/// Smallest DLC whose payload length can hold `len` bytes.
pub fn len_to_dlc(len: usize) -> Option<u8> {
    DLC_TO_LEN
        .iter()
        .position(|&l| l as usize >= len)
        .map(|dlc| dlc as u8)
}

bitflags! {
    /// Per-frame flags as they travel on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        /// Remote transmission request (classic frames only).
        const RTR = 0x01;
        /// 29-bit identifier.
        const EXT = 0x02;
        /// CAN-FD frame format.
        const FDF = 0x04;
        /// Bit-rate switch during the data phase.
        const BRS = 0x08;
        /// Error state indicator of the transmitter.
        const ESI = 0x10;
        /// Transmission dropped by the device (TXR only).
        const DRP = 0x20;
    }
}

bitflags! {
    /// Channel features. A subset is permanently enabled, another subset can
    /// be switched on by the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features: u16 {
        /// Report transmit results (TXR).
        const TXR = 0x0001;
        /// CAN-FD frames.
        const FDF = 0x0002;
        /// Transmitter delay compensation.
        const TXP = 0x0004;
        /// Protocol exception handling disabled.
        const EHD = 0x0008;
        /// Disable automatic retransmission.
        const DAR = 0x0010;
        /// Bus monitoring (listen only).
        const MON_MODE = 0x0020;
        /// Restricted operation.
        const RES_MODE = 0x0040;
        /// External loopback.
        const EXT_LOOP_MODE = 0x0080;
    }
}

impl Features {
    /// Operating modes of which at most one may be active.
    pub const MODES: Features = Features::MON_MODE
        .union(Features::RES_MODE)
        .union(Features::EXT_LOOP_MODE);
}

bitflags! {
    /// Flags reported in a bus-status snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// At least one event could not be reported; host state may be stale.
        const TXR_DESYNC = 0x01;
        /// An interrupt-side status or error queue overflowed.
        const IRQ_QUEUE_FULL = 0x02;
    }
}

//==================================================================================CAN_FRAME
/// Classic or FD frame. The identifier is stored unshifted, `flags` carries
/// the extended/remote/FD attributes and the timestamp is a wrapping
/// microsecond counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub dlc: u8,
    pub flags: FrameFlags,
    pub data: [u8; MAX_FRAME_PAYLOAD],
    pub timestamp_us: u32,
}

impl Default for CanFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl CanFrame {
    /// Zeroed standard data frame; used to initialise scratch arrays.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            dlc: 0,
            flags: FrameFlags::empty(),
            data: [0; MAX_FRAME_PAYLOAD],
            timestamp_us: 0,
        }
    }

    /// Build an FD frame. `data` must match a DLC length exactly.
    pub fn new_fd(id: impl Into<Id>, data: &[u8], brs: bool) -> Option<Self> {
        let dlc = len_to_dlc(data.len())?;
        if dlc_to_len(dlc) != data.len() {
            return None;
        }
        let mut frame = Self::with_id(id.into());
        frame.flags |= FrameFlags::FDF;
        frame.flags.set(FrameFlags::BRS, brs);
        frame.dlc = dlc;
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn with_id(id: Id) -> Self {
        let mut frame = Self::empty();
        match id {
            Id::Standard(id) => frame.id = id.as_raw() as u32,
            Id::Extended(id) => {
                frame.id = id.as_raw();
                frame.flags |= FrameFlags::EXT;
            }
        }
        frame
    }

    /// Payload length. Remote frames carry no payload regardless of DLC.
    #[inline]
    pub fn len(&self) -> usize {
        if self.is_rtr() {
            0
        } else {
            dlc_to_len(self.dlc)
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    #[inline]
    pub fn is_ext(&self) -> bool {
        self.flags.contains(FrameFlags::EXT)
    }

    #[inline]
    pub fn is_rtr(&self) -> bool {
        self.flags.contains(FrameFlags::RTR)
    }

    #[inline]
    pub fn is_fd(&self) -> bool {
        self.flags.contains(FrameFlags::FDF)
    }

    #[inline]
    pub fn is_brs(&self) -> bool {
        self.flags.contains(FrameFlags::BRS)
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut frame = Self::with_id(id.into());
        frame.dlc = data.len() as u8;
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        let mut frame = Self::with_id(id.into());
        frame.flags |= FrameFlags::RTR;
        frame.dlc = dlc as u8;
        Some(frame)
    }

    fn is_extended(&self) -> bool {
        self.is_ext()
    }

    fn is_remote_frame(&self) -> bool {
        self.is_rtr()
    }

    fn id(&self) -> Id {
        if self.is_ext() {
            ExtendedId::new(self.id & ExtendedId::MAX.as_raw())
                .map(Id::Extended)
                .unwrap_or(Id::Extended(ExtendedId::ZERO))
        } else {
            StandardId::new((self.id & 0x7FF) as u16)
                .map(Id::Standard)
                .unwrap_or(Id::Standard(StandardId::ZERO))
        }
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

//==================================================================================TX_EVENT
/// Entry of the controller's TX-event FIFO: a frame left the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxEvent {
    /// Host-assigned correlation id of the original transmit request.
    pub track_id: u8,
    pub flags: FrameFlags,
    pub dlc: u8,
    pub timestamp_us: u32,
}

//==================================================================================BUS_STATE
/// CAN error-state hierarchy. Ordering follows severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusStatus {
    #[default]
    ErrorActive = 0,
    ErrorWarning = 1,
    ErrorPassive = 2,
    BusOff = 3,
}

impl BusStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ErrorActive),
            1 => Some(Self::ErrorWarning),
            2 => Some(Self::ErrorPassive),
            3 => Some(Self::BusOff),
            _ => None,
        }
    }

    /// True from error-passive upwards.
    #[inline]
    pub fn is_passive_or_worse(self) -> bool {
        self >= Self::ErrorPassive
    }
}

/// Protocol error detected on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CanErrorCode {
    #[default]
    None = 0,
    Stuff = 1,
    Form = 2,
    Ack = 3,
    Bit1 = 4,
    Bit0 = 5,
    Crc = 6,
}

impl CanErrorCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Stuff),
            2 => Some(Self::Form),
            3 => Some(Self::Ack),
            4 => Some(Self::Bit1),
            5 => Some(Self::Bit0),
            6 => Some(Self::Crc),
            _ => None,
        }
    }
}

/// Bus status transition captured in interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusEvent {
    pub status: BusStatus,
    pub timestamp_us: u32,
}

/// Bus error captured in interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusErrorEvent {
    pub code: CanErrorCode,
    /// Error occurred while this node was transmitting.
    pub tx: bool,
    /// Error occurred in the data phase of an FD frame.
    pub data_phase: bool,
    pub timestamp_us: u32,
}

/// Transmit and receive error counters of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCounters {
    pub tx_errors: u8,
    pub rx_errors: u8,
}
