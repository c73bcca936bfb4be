//! Engine types

use std::sync::Arc;

use crate::execution::ExecutionClient;
use crate::market::MarketClient;
use crate::signal::Signal;
use crate::storage::TradeStore;

/// External services the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketClient>,
    pub execution: Arc<dyn ExecutionClient>,
    pub store: Arc<dyn TradeStore>,
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Price observations drained from the feed
    pub observations: usize,
    /// Signal in force during the tick, if any
    pub signal: Option<Signal>,
    pub entries_filled: usize,
    pub entries_rejected: usize,
    /// Entries sent without an answer; settled against the next portfolio
    pub entries_unconfirmed: usize,
    pub exits_filled: usize,
    pub exit_failures: usize,
    pub writes_flushed: usize,
    /// Store was unreachable; writes stay queued
    pub flush_failed: bool,
    /// Tick was cut off by the tick timeout
    pub timed_out: bool,
}
