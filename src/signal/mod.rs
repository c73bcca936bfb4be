//! Signal generation module
//!
//! Turns the underlying price feed into short-horizon momentum signals

mod detector;
mod types;

pub use detector::SignalDetector;
pub use types::{Direction, PriceObservation, Signal};
