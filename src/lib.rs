//! `usbcan-bridge` library: the firmware engine of a USB to CAN/CAN-FD
//! adapter. It moves CAN frames between controller interrupts and the USB
//! bulk endpoints of a host driver in a `no_std` environment.
//!
//! The crate exposes the infrastructure modules (wire codec, SPSC rings),
//! the protocol logic (messages, bit timing, timestamp reconstruction,
//! endpoints) and the bridge engine that ties them together.
#![cfg_attr(not(test), no_std)]
//==================================================================================
/// Core data types shared by the controller abstraction and the wire codec.
pub mod core;
/// Wire, command and endpoint errors.
pub mod error;
/// Byte cursor, message framing traits and lock-free rings.
pub mod infra;
/// Host protocol: messages, bit timing, timestamps, USB transport and the
/// bridge engine.
pub mod protocol;
//==================================================================================
