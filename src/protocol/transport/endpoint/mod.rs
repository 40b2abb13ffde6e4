//! Double-buffered bulk IN endpoint.
//!
//! Two banks alternate: the active bank collects serialized messages while
//! the other one is in flight to the host. A bank handed to the USB stack is
//! frozen until the transfer-complete notification resets its offset.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::error::EndpointError;
use crate::infra::codec::cursor::ByteOrder;
use crate::infra::codec::traits::ToWire;
use crate::protocol::transport::traits::usb_pipe::UsbPipe;
use crate::protocol::transport::USB_MAX_PACKET_SIZE;

/// Zero bytes appended to a transfer that would otherwise end on a packet
/// boundary. Parsed by the host as an EOF header.
const SHORT_PACKET_PAD: usize = 4;

/// Two transmit banks of `SIZE` bytes with their fill offsets.
pub struct DoubleBuffer<const SIZE: usize> {
    banks: [[u8; SIZE]; 2],
    offsets: [usize; 2],
    active: usize,
}

impl<const SIZE: usize> Default for DoubleBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> DoubleBuffer<SIZE> {
    pub const fn new() -> Self {
        Self {
            banks: [[0; SIZE]; 2],
            offsets: [0; 2],
            active: 0,
        }
    }

    /// The idle bank has been released by the USB stack.
    #[inline]
    pub fn is_send_ready(&self) -> bool {
        self.offsets[self.active ^ 1] == 0
    }

    /// The active bank holds unsent bytes.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.offsets[self.active] > 0
    }

    /// Free bytes left in the active bank.
    #[inline]
    pub fn remaining(&self) -> usize {
        SIZE - self.offsets[self.active]
    }

    /// Bytes accumulated in the active bank.
    pub fn pending(&self) -> &[u8] {
        &self.banks[self.active][..self.offsets[self.active]]
    }

    /// Bytes of the bank currently owned by the USB stack; empty when idle.
    pub fn in_flight(&self) -> &[u8] {
        let idle = self.active ^ 1;
        &self.banks[idle][..self.offsets[idle]]
    }

    /// Copy `bytes` into the active bank. Fails without side effects if they
    /// do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        let start = self.offsets[self.active];
        self.banks[self.active][start..start + bytes.len()].copy_from_slice(bytes);
        self.offsets[self.active] += bytes.len();
        true
    }

    /// Serialize `msg` straight into the active bank. Fails without side
    /// effects if it does not fit.
    pub fn append_message<M: ToWire>(&mut self, msg: &M, order: ByteOrder) -> bool {
        let start = self.offsets[self.active];
        match msg.to_wire(order, &mut self.banks[self.active][start..]) {
            Ok(len) => {
                self.offsets[self.active] += len;
                true
            }
            Err(_) => false,
        }
    }

    /// Hand the active bank to `pipe` and make the other bank active.
    pub fn submit<P: UsbPipe>(&mut self, pipe: &mut P) -> Result<(), EndpointError> {
        if !self.has_pending() {
            return Err(EndpointError::NothingToSend);
        }
        if !self.is_send_ready() {
            return Err(EndpointError::Busy);
        }
        let bank = self.active;
        let len = self.offsets[bank];
        if SIZE > USB_MAX_PACKET_SIZE && len < SIZE && len % USB_MAX_PACKET_SIZE == 0 {
            self.banks[bank][len..len + SHORT_PACKET_PAD].fill(0);
            self.offsets[bank] += SHORT_PACKET_PAD;
        }
        pipe.start_transfer(&self.banks[bank][..self.offsets[bank]]);
        self.active ^= 1;
        debug_assert_eq!(self.offsets[self.active], 0);
        Ok(())
    }

    /// Transfer-complete notification: release the idle bank and keep the
    /// pipe busy with whatever accumulated meanwhile.
    pub fn on_transfer_complete<P: UsbPipe>(&mut self, pipe: &mut P) {
        self.offsets[self.active ^ 1] = 0;
        if self.has_pending() {
            let _ = self.submit(pipe);
        }
    }

    /// Forget what the active bank collected; the in-flight bank is untouched.
    pub fn discard_pending(&mut self) {
        self.offsets[self.active] = 0;
    }

    /// Drop both banks' content.
    pub fn reset(&mut self) {
        self.offsets = [0; 2];
        self.active = 0;
    }
}

//==================================================================================ENDPOINT
/// A double buffer bound to its USB pipe.
pub struct Endpoint<P: UsbPipe, const SIZE: usize> {
    pub buffer: DoubleBuffer<SIZE>,
    pub pipe: P,
}

impl<P: UsbPipe, const SIZE: usize> Endpoint<P, SIZE> {
    pub const fn new(pipe: P) -> Self {
        Self {
            buffer: DoubleBuffer::new(),
            pipe,
        }
    }

    pub fn submit(&mut self) -> Result<(), EndpointError> {
        self.buffer.submit(&mut self.pipe)
    }

    /// Submit if there is something to send and the pipe can take it.
    pub fn flush(&mut self) {
        if self.buffer.has_pending() && self.buffer.is_send_ready() {
            let _ = self.submit();
        }
    }

    pub fn on_transfer_complete(&mut self) {
        self.buffer.on_transfer_complete(&mut self.pipe);
    }

    /// Append a message, submitting the active bank once if it is full.
    pub fn push_message<M: ToWire>(
        &mut self,
        msg: &M,
        order: ByteOrder,
    ) -> Result<(), EndpointError> {
        if self.buffer.append_message(msg, order) {
            return Ok(());
        }
        if !self.buffer.has_pending() {
            return Err(EndpointError::Overflow {
                len: SIZE - self.buffer.remaining(),
                capacity: SIZE,
            });
        }
        self.submit()?;
        if self.buffer.append_message(msg, order) {
            Ok(())
        } else {
            Err(EndpointError::Overflow {
                len: SIZE,
                capacity: SIZE,
            })
        }
    }
}

/// Endpoint shared between the USB callback context and task context. The
/// lock is a critical section held for one append or submit, never across an
/// await point.
pub struct SharedEndpoint<P: UsbPipe, const SIZE: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Endpoint<P, SIZE>>>,
}

impl<P: UsbPipe, const SIZE: usize> SharedEndpoint<P, SIZE> {
    pub const fn new(pipe: P) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Endpoint::new(pipe))),
        }
    }

    /// Run `f` with exclusive access to the endpoint.
    pub fn with<R>(&self, f: impl FnOnce(&mut Endpoint<P, SIZE>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn on_transfer_complete(&self) {
        self.with(|ep| ep.on_transfer_complete());
    }

    pub fn reset(&self) {
        self.with(|ep| ep.buffer.reset());
    }
}
