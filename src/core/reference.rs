//! Bounded spread history with a running average

use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Default number of samples in the reference average
pub const DEFAULT_REFERENCE_CAPACITY: usize = 600;

/// FIFO of the most recent spread samples
///
/// Keeps a running sum so `average()` is O(1). Decimal arithmetic is exact,
/// so the sum never drifts from the queue contents.
#[derive(Debug, Clone)]
pub struct ReferenceQueue {
    samples: VecDeque<Decimal>,
    capacity: usize,
    sum: Decimal,
}

impl ReferenceQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: Decimal::ZERO,
        }
    }

    /// Append a sample, dropping the oldest one at capacity
    pub fn push(&mut self, sample: Decimal) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /// Mean of the retained samples, `None` while empty
    pub fn average(&self) -> Option<Decimal> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.sum / Decimal::from(self.samples.len()))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = Decimal::ZERO;
    }
}

impl Default for ReferenceQueue {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_CAPACITY)
    }
}
