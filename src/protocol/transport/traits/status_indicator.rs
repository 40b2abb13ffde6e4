//! Per-channel status and traffic LEDs.

/// States shown by the channel LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedStatus {
    /// Channel off bus.
    #[default]
    Disabled,
    /// On bus, no traffic within the activity window.
    BusOnIdle,
    /// On bus with recent traffic.
    BusOnActive,
    /// Error pending or error-passive (or worse), no traffic.
    ErrorIdle,
    /// Error pending or error-passive (or worse), with traffic.
    ErrorActive,
}

pub trait StatusIndicator {
    fn set_status(&mut self, status: LedStatus);

    /// Light the traffic LED for `duration_ms`, restarting a running burst.
    /// Boards without a traffic LED keep the default.
    fn traffic_burst(&mut self, _duration_ms: u32) {}
}

/// Boards without a status LED.
impl StatusIndicator for () {
    fn set_status(&mut self, _status: LedStatus) {}
}
