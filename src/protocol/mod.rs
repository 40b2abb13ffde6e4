//! High-level components of the host protocol: message structures, bit
//! timing arithmetic, timestamp reconstruction, USB transport and the
//! per-channel bridge engine.
pub mod bridge;
pub mod messages;
pub mod timestamp;
pub mod timing;
pub mod transport;
