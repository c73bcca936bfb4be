//! Rolling-window momentum detector
//!
//! Keeps a time-bounded buffer of observations per instrument and reports
//! the move from the oldest to the newest observation in basis points.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

use super::types::{Direction, PriceObservation, Signal};
use crate::config::SignalConfig;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Momentum detector over a rolling price window
pub struct SignalDetector {
    window: Duration,
    min_span: Duration,
    trigger_bps: Decimal,
    buffers: HashMap<String, VecDeque<PriceObservation>>,
}

impl SignalDetector {
    /// Create a new detector with the given configuration
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            window: Duration::seconds(config.window_seconds as i64),
            min_span: Duration::seconds(config.min_span_seconds as i64),
            trigger_bps: config.trigger_bps,
            buffers: HashMap::new(),
        }
    }

    /// Add a new price observation
    ///
    /// Observations older than the newest one already buffered are dropped so
    /// the window stays time-ordered.
    pub fn observe(&mut self, instrument: &str, price: Decimal, timestamp: DateTime<Utc>) {
        let buffer = self.buffers.entry(instrument.to_string()).or_default();

        if let Some(last) = buffer.back() {
            if timestamp < last.timestamp {
                tracing::debug!(instrument, %timestamp, "Dropping out-of-order observation");
                return;
            }
        }

        buffer.push_back(PriceObservation { timestamp, price });

        // Remove old prices outside window
        let cutoff = timestamp - self.window;
        while let Some(front) = buffer.front() {
            if front.timestamp < cutoff {
                buffer.pop_front();
            } else {
                break;
            }
        }
    }

    /// Signal for the current window, if the move clears the trigger
    ///
    /// Returns None if:
    /// 1. Fewer than two observations, or they span less than `min_span_seconds`
    /// 2. The oldest price is not positive
    /// 3. The absolute move is below `trigger_bps`
    pub fn current_signal(&self, instrument: &str) -> Option<Signal> {
        let buffer = self.buffers.get(instrument)?;
        if buffer.len() < 2 {
            return None;
        }

        let oldest = buffer.front()?;
        let latest = buffer.back()?;

        if latest.timestamp - oldest.timestamp < self.min_span {
            return None;
        }
        if oldest.price <= Decimal::ZERO {
            return None;
        }

        let move_bps = (latest.price - oldest.price) / oldest.price * BPS;
        let magnitude = move_bps.abs();
        if magnitude.is_zero() || magnitude < self.trigger_bps {
            return None;
        }

        let direction = if move_bps > Decimal::ZERO {
            Direction::Up
        } else {
            Direction::Down
        };

        Some(Signal {
            timestamp: latest.timestamp,
            direction,
            magnitude_bps: magnitude,
        })
    }

    /// Get the number of observations buffered for an instrument
    pub fn sample_count(&self, instrument: &str) -> usize {
        self.buffers.get(instrument).map_or(0, |b| b.len())
    }

    /// Latest observed price for an instrument
    pub fn latest_price(&self, instrument: &str) -> Option<Decimal> {
        self.buffers
            .get(instrument)
            .and_then(|b| b.back())
            .map(|o| o.price)
    }
}
