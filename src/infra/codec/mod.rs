//! Byte cursor and the message traits built on top of it.
pub mod cursor;
pub mod traits;
