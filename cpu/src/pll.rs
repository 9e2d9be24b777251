//! The per-cog phase-locked loop group.
//!
//! Counter A of each cog can drive a PLL.  Anything clocked from that
//! PLL (in practice, the cog's video generator) is attached to the
//! cog's `PllGroup`, which passes on the PLL frequency and the
//! passage of time.
use tracing::{event, Level};

use super::clock::ClockSource;

/// Something whose clock is the PLL output.
pub trait PllClocked: ClockSource {
    /// Informs the source that the PLL now runs at `frequency` Hz
    /// (zero when the PLL is stopped).
    fn retune(&mut self, frequency: f64);
}

#[derive(Debug)]
pub struct PllGroup<S> {
    frequency: f64,
    attached: Vec<S>,
}

impl<S: PllClocked> PllGroup<S> {
    #[must_use]
    pub fn new() -> PllGroup<S> {
        PllGroup {
            frequency: 0.0,
            attached: Vec::new(),
        }
    }

    pub fn attach(&mut self, mut source: S) {
        source.retune(self.frequency);
        self.attached.push(source);
    }

    /// Detaches every source.  Nothing is clocked by this group after
    /// this call.
    pub fn destroy(&mut self) {
        if !self.attached.is_empty() {
            event!(
                Level::TRACE,
                "detaching {} source(s) from PLL group",
                self.attached.len()
            );
        }
        self.attached.clear();
    }

    /// Sets the output frequency of the PLL, in Hz.
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency != self.frequency {
            self.frequency = frequency;
            for source in self.attached.iter_mut() {
                source.retune(frequency);
            }
        }
    }

    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    #[must_use]
    pub fn attached(&self) -> &[S] {
        &self.attached
    }

    pub fn attached_mut(&mut self) -> &mut [S] {
        &mut self.attached
    }
}

impl<S: PllClocked> Default for PllGroup<S> {
    fn default() -> PllGroup<S> {
        PllGroup::new()
    }
}

impl<S: PllClocked> ClockSource for PllGroup<S> {
    fn time_until_edge(&self) -> f64 {
        self.attached
            .iter()
            .map(|s| s.time_until_edge())
            .fold(f64::INFINITY, f64::min)
    }

    fn advance(&mut self, time: f64) {
        for source in self.attached.iter_mut() {
            source.advance(time);
        }
    }
}
