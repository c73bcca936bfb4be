//! Orchestration module
//!
//! Drives the feed, watchlist, decision policies and trade manager on a
//! fixed cadence, one sequential tick at a time.

mod runner;
mod types;

pub use runner::Engine;
pub use types::{Collaborators, TickReport};
