//! Sliding Filter
//!
//! Bounded per-metric FIFO windows with an arithmetic-mean readout. All four
//! windows are pushed and evicted together, so they always hold the same
//! number of entries.

use std::collections::VecDeque;

use crate::emission::{FilteredSample, Metric, RawSample};
use crate::error::ConfigError;

// Larger windows grow as samples arrive
const PREALLOC_LIMIT: usize = 64;

/// Moving-average filter over the last `capacity` samples
#[derive(Debug, Clone)]
pub struct SlidingFilter {
    /// Maximum window length W
    capacity: usize,
    /// One window per metric, indexed by [`Metric::index`]
    windows: [VecDeque<f64>; 4],
}

impl SlidingFilter {
    /// Create a filter with window length `capacity` (must be >= 1)
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidWindow(capacity));
        }
        Ok(Self {
            capacity,
            windows: std::array::from_fn(|_| {
                VecDeque::with_capacity(capacity.saturating_add(1).min(PREALLOC_LIMIT))
            }),
        })
    }

    /// Window length W
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently held (same for every metric)
    pub fn len(&self) -> usize {
        self.windows[0].len()
    }

    /// Whether nothing has been pushed yet
    pub fn is_empty(&self) -> bool {
        self.windows[0].is_empty()
    }

    /// Current contents of one metric's window, oldest first
    pub fn window(&self, metric: Metric) -> impl Iterator<Item = f64> + '_ {
        self.windows[metric.index()].iter().copied()
    }

    /// Append a sample, evicting the oldest entry once the window is full
    ///
    /// CO2 enters the window as its emitted (rounded) value.
    pub fn push(&mut self, sample: &RawSample) {
        for metric in Metric::ALL {
            let value = match metric {
                Metric::Co2 => f64::from(sample.co2_ppm()),
                _ => sample.get(metric),
            };
            let window = &mut self.windows[metric.index()];
            window.push_back(value);
            if window.len() > self.capacity {
                window.pop_front();
            }
        }
    }

    /// Mean of the current window per metric; zero before the first push
    pub fn compute_filtered(&self) -> FilteredSample {
        let divisor = self.len().max(1) as f64;
        let mean = |metric: Metric| self.windows[metric.index()].iter().sum::<f64>() / divisor;
        FilteredSample {
            co: mean(Metric::Co),
            nox: mean(Metric::Nox),
            hc: mean(Metric::Hc),
            co2: mean(Metric::Co2),
        }
    }
}
