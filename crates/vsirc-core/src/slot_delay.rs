//! Maps an arbitration slot to the wait before replying.

use std::time::Duration;

/// Sub-linear delay curve `scale * sqrt(slot)`.
///
/// Adding `m` fake responders ahead of a genuine one only grows its wait by
/// `O(sqrt(m))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotDelay {
    scale: Duration,
}

impl SlotDelay {
    pub const DEFAULT_SCALE: Duration = Duration::from_secs(2);

    pub fn new(scale: Duration) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> Duration {
        self.scale
    }

    /// Saturates at [`Duration::MAX`] when the product does not fit.
    pub fn delay_for_slot(&self, slot: usize) -> Duration {
        if slot == 0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.scale.as_secs_f64() * (slot as f64).sqrt())
            .unwrap_or(Duration::MAX)
    }
}

impl Default for SlotDelay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SCALE)
    }
}
