//! Asynchronous timer abstraction providing the backoff delay and the
//! millisecond clock of the bus event aggregator.
use embassy_time::{Instant, Timer};
use futures_util::Future;

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait BridgeTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl Future<Output = ()> + 'a;
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;
}

/// [`BridgeTimer`] backed by the `embassy-time` driver of the board.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTimer;

impl BridgeTimer for EmbassyTimer {
    async fn delay_ms(&mut self, millis: u32) {
        Timer::after_millis(millis as u64).await;
    }

    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
