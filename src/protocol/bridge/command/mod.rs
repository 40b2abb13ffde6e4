//! Host-to-device traffic of a channel, handled synchronously in the USB
//! receive callback.
//!
//! The command pipe carries configuration requests, each answered in the
//! command IN endpoint. The CAN pipe carries transmit requests; those are
//! only answered through TXR messages.
use crate::core::FrameFlags;
use crate::error::CommandError;
use crate::infra::codec::cursor::ByteOrder;
use crate::infra::codec::traits::{FromWire, ToWire};
use crate::protocol::bridge::channel::Channel;
use crate::protocol::messages::{
    id, BusMsg, CanTx, CanTxr, DataBitTiming, ErrorReply, FeaturesMsg, HelloHost, MessageIter,
    NominalBitTiming, RawMessage,
};
use crate::protocol::transport::traits::can_controller::CanController;
use crate::protocol::transport::traits::usb_pipe::UsbPipe;
use crate::protocol::transport::{CMD_BUFFER_SIZE, PROTOCOL_VERSION};

/// Parses OUT transfers of both pipes of one channel.
pub struct CommandProcessor<'a, C: CanController, P: UsbPipe> {
    channel: &'a Channel<C, P>,
}

impl<'a, C: CanController, P: UsbPipe> CommandProcessor<'a, C, P> {
    pub(crate) fn new(channel: &'a Channel<C, P>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &'a Channel<C, P> {
        self.channel
    }

    //==================================================================================COMMAND_PIPE
    /// Process one command-pipe transfer, then submit the replies if the
    /// command IN endpoint is free.
    pub fn process(&mut self, buffer: &[u8]) {
        let channel = self.channel;
        let order = channel.config().byte_order;

        for item in MessageIter::new(buffer) {
            let raw = match item {
                Ok(raw) => raw,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ch{} malformed command buffer: {}", channel.index(), _err);
                    break;
                }
            };
            match raw.id {
                id::HELLO_DEVICE => {
                    self.hello();
                    break;
                }
                id::DEVICE_INFO => self.reply(&channel.device_info()),
                id::CAN_INFO => self.reply(&channel.can_info()),
                id::NM_BITTIMING => {
                    let result = decode::<NominalBitTiming>(&raw, order).map(|msg| {
                        channel.set_nominal_timing(&msg.0);
                    });
                    self.reply_result(result);
                }
                id::DT_BITTIMING => {
                    let result = decode::<DataBitTiming>(&raw, order)
                        .and_then(|msg| channel.set_data_timing(&msg.0).map(|_| ()));
                    self.reply_result(result);
                }
                id::FEATURES => {
                    let result = decode::<FeaturesMsg>(&raw, order)
                        .and_then(|msg| channel.update_features(&msg).map(|_| ()));
                    self.reply_result(result);
                }
                id::BUS => {
                    let result =
                        decode::<BusMsg>(&raw, order).map(|msg| channel.set_bus(msg.on));
                    self.reply_result(result);
                }
                _other => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ch{} unsupported command {=u8:#x}", channel.index(), _other);
                    self.reply_result(Err(CommandError::Unsupported));
                }
            }
        }

        channel.cmd_endpoint().with(|ep| ep.flush());
    }

    /// Reset the channel and replace pending replies with the handshake.
    fn hello(&mut self) {
        let channel = self.channel;
        #[cfg(feature = "defmt")]
        defmt::info!("ch{} hello", channel.index());
        channel.reset();
        let order = channel.config().byte_order;
        let reply = HelloHost {
            proto_version: PROTOCOL_VERSION,
            byte_order: order,
            cmd_buffer_size: CMD_BUFFER_SIZE as u16,
        };
        channel.cmd_endpoint().with(|ep| {
            ep.buffer.discard_pending();
            let _ = ep.buffer.append_message(&reply, order);
        });
    }

    fn reply<M: ToWire>(&self, msg: &M) {
        let channel = self.channel;
        let order = channel.config().byte_order;
        let placed = channel
            .cmd_endpoint()
            .with(|ep| ep.push_message(msg, order));
        if let Err(_err) = placed {
            #[cfg(feature = "defmt")]
            defmt::warn!("ch{} no space for reply: {}", channel.index(), _err);
        }
    }

    fn reply_result(&self, result: Result<(), CommandError>) {
        self.reply(&ErrorReply::from_result(result));
    }

    //==================================================================================CAN_PIPE
    /// Process one CAN-pipe transfer.
    pub fn process_can(&mut self, buffer: &[u8]) {
        for item in MessageIter::new(buffer) {
            let raw = match item {
                Ok(raw) => raw,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ch{} malformed CAN buffer: {}", self.channel.index(), _err);
                    break;
                }
            };
            match raw.id {
                id::CAN_TX => self.transmit(&raw),
                _other => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "ch{} ignoring message {=u8:#x}",
                        self.channel.index(),
                        _other
                    );
                }
            }
        }
    }

    fn transmit(&mut self, raw: &RawMessage<'_>) {
        let channel = self.channel;
        let request: CanTx = match raw.decode(channel.config().byte_order) {
            Ok(request) => request,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("ch{} CAN_TX rejected: {}", channel.index(), _err);
                return;
            }
        };

        if channel.take_tx_credit() {
            let submitted =
                channel.with_controller(|can| can.submit_tx(&request.frame, request.track_id));
            match submitted {
                Ok(()) => return,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "ch{} controller refused frame: {}",
                        channel.index(),
                        defmt::Debug2Format(&_err)
                    );
                    channel.return_tx_credit();
                }
            }
        }
        self.drop_request(request.track_id);
    }

    /// Report a request that never reached the controller.
    fn drop_request(&mut self, track_id: u8) {
        let channel = self.channel;
        let order = channel.config().byte_order;
        channel.count_tx_dropped();
        let txr = CanTxr {
            track_id,
            flags: FrameFlags::DRP,
            timestamp_us: channel.with_controller(|can| can.timestamp_us()),
        };
        let placed = channel
            .can_endpoint()
            .with(|ep| ep.push_message(&txr, order).is_ok());
        if !placed {
            channel.set_desync();
        }
        channel.wake();
    }
}

fn decode<M: FromWire>(raw: &RawMessage<'_>, order: ByteOrder) -> Result<M, CommandError> {
    raw.decode(order).map_err(|err| {
        #[cfg(feature = "defmt")]
        defmt::warn!("command {=u8:#x} rejected: {}", raw.id, err);
        CommandError::from(err)
    })
}
