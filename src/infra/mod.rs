//! Infrastructure shared by the protocol layer: byte codec and SPSC rings.
pub mod codec;
pub mod ring;
