//! Periodic hardware blocks.

/// A `ClockSource` is any piece of hardware driven by its own clock
/// rather than directly by the system clock.  Times are in seconds of
/// emulated time.
pub trait ClockSource {
    /// Returns the time until this source's next state-changing
    /// edge, or `f64::INFINITY` if the source is not being clocked.
    fn time_until_edge(&self) -> f64;

    /// Moves the source's phase forward by `time`, performing the
    /// work of every edge crossed along the way.
    fn advance(&mut self, time: f64);
}
