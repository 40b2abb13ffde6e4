//! Bridge engine: per-channel state, the interrupt-side poller, the bus
//! event aggregator task and the USB-side command processor, tied together
//! by [`Bridge`] which routes USB events to the right channel.
//!
//! ## Endpoint layout
//!
//! Channel `i` owns two bulk pipes:
//!
//! | pipe    | OUT          | IN                    |
//! |---------|--------------|-----------------------|
//! | command | `1 + 2 * i`  | `0x80 \| (1 + 2 * i)` |
//! | CAN     | `2 + 2 * i`  | `0x80 \| (2 + 2 * i)` |
//!
//! ## Wiring
//!
//! ```rust,ignore
//! static CH0: StaticCell<Channel<Fdcan, UsbIn>> = StaticCell::new();
//! let ch0 = CH0.init(Channel::new(0, ChannelConfig::default(), fdcan, cmd_in, can_in));
//! let parts = ch0.split().unwrap();
//!
//! // CAN interrupt: parts.poller.poll();
//! spawner.spawn(aggregator_task(Aggregator::new(parts.queues, EmbassyTimer, led)));
//! let mut bridge = Bridge::new([parts.commands]);
//! // USB callbacks: bridge.on_out(ep, data); bridge.on_in_complete(ep); bridge.mount(); ...
//! ```
pub mod aggregator;
pub mod channel;
pub mod command;
pub mod poller;

use crate::protocol::bridge::channel::Channel;
use crate::protocol::bridge::command::CommandProcessor;
use crate::protocol::transport::traits::can_controller::CanController;
use crate::protocol::transport::traits::usb_pipe::UsbPipe;

/// Direction bit of an IN endpoint address.
pub const EP_DIR_IN: u8 = 0x80;

/// OUT endpoint of the command pipe of channel `index`.
pub const fn cmd_endpoint(index: u8) -> u8 {
    1 + 2 * index
}

/// OUT endpoint of the CAN pipe of channel `index`.
pub const fn can_endpoint(index: u8) -> u8 {
    2 + 2 * index
}

/// Logical pipe of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pipe {
    Command,
    Can,
}

/// Map an endpoint address (either direction) to `(channel, pipe)`.
pub fn route(endpoint: u8) -> Option<(usize, Pipe)> {
    let number = endpoint & !EP_DIR_IN;
    if number == 0 {
        return None;
    }
    let index = ((number - 1) / 2) as usize;
    let pipe = if number % 2 == 1 { Pipe::Command } else { Pipe::Can };
    Some((index, pipe))
}

/// USB-side dispatcher of an `N`-channel adapter.
pub struct Bridge<'a, C: CanController, P: UsbPipe, const N: usize> {
    commands: [CommandProcessor<'a, C, P>; N],
    mounted: bool,
}

impl<'a, C: CanController, P: UsbPipe, const N: usize> Bridge<'a, C, P, N> {
    /// Processors must be given in channel index order.
    pub fn new(commands: [CommandProcessor<'a, C, P>; N]) -> Self {
        debug_assert!(commands
            .iter()
            .enumerate()
            .all(|(i, c)| c.channel().index() as usize == i));
        Self {
            commands,
            mounted: false,
        }
    }

    pub fn channel(&self, index: usize) -> Option<&'a Channel<C, P>> {
        self.commands.get(index).map(|c| c.channel())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn channels(&self) -> impl Iterator<Item = &'a Channel<C, P>> + '_ {
        self.commands.iter().map(|c| c.channel())
    }

    /// Host configured the device.
    pub fn mount(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("mounted");
        self.mounted = true;
        for channel in self.channels() {
            channel.set_mounted(true);
        }
    }

    /// Host detached. Every channel returns to its disabled baseline.
    pub fn unmount(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("unmounted");
        self.detach();
    }

    /// Bus suspended; handled like a detach.
    pub fn suspend(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("suspend");
        self.detach();
    }

    pub fn resume(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("resume");
        self.mount();
    }

    fn detach(&mut self) {
        self.mounted = false;
        for channel in self.channels() {
            channel.reset();
            channel.set_mounted(false);
        }
    }

    /// USB stack re-enumerated: drop whatever the IN banks hold.
    pub fn usb_reset(&mut self) {
        self.mounted = false;
        for channel in self.channels() {
            channel.cmd_endpoint().reset();
            channel.can_endpoint().reset();
            channel.set_mounted(false);
        }
    }

    /// Data received on an OUT endpoint. Unknown endpoints are ignored.
    pub fn on_out(&mut self, endpoint: u8, data: &[u8]) {
        let Some((index, pipe)) = route(endpoint) else {
            return;
        };
        let Some(processor) = self.commands.get_mut(index) else {
            #[cfg(feature = "defmt")]
            defmt::warn!("OUT on unknown endpoint {=u8:#x}", endpoint);
            return;
        };
        match pipe {
            Pipe::Command => processor.process(data),
            Pipe::Can => processor.process_can(data),
        }
    }

    /// Transfer completed on an IN endpoint.
    pub fn on_in_complete(&self, endpoint: u8) {
        let Some((index, pipe)) = route(endpoint) else {
            return;
        };
        let Some(channel) = self.channel(index) else {
            return;
        };
        match pipe {
            Pipe::Command => channel.cmd_endpoint().on_transfer_complete(),
            Pipe::Can => {
                channel.can_endpoint().on_transfer_complete();
                channel.wake();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;
