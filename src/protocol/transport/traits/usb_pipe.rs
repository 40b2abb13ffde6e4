//! Minimal abstraction over a bulk IN endpoint of the USB device stack.

/// Submit side of a bulk IN pipe.
pub trait UsbPipe {
    /// Start sending `data` to the host. The bytes stay untouched until the
    /// stack reports completion through the owning endpoint, so an
    /// implementation may transfer straight from them.
    fn start_transfer(&mut self, data: &[u8]);
}
