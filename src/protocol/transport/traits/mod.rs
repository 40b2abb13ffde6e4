//! Abstraction traits consumed by the bridge (CAN controller, USB pipe,
//! timer and status indicator).
pub mod bridge_timer;
pub mod can_controller;
pub mod status_indicator;
pub mod usb_pipe;
