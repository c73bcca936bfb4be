//! Prometheus metrics
//!
//! Thin wrappers over the `metrics` macros so call sites name a metric by
//! enum instead of by string. Without an installed recorder these are no-ops.

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Whole orchestration tick
    Tick,
    /// Market list or quote request
    MarketRequest,
    /// Order submission or close
    OrderSubmission,
    /// Outbox flush
    StoreFlush,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Signals over the trigger threshold
    SignalsDetected,
    /// Candidates turned away by the eligibility filter
    CandidatesRejected,
    /// Candidates with missing or malformed fields
    CandidatesMalformed,
    /// Entry decisions produced
    EntriesDecided,
    EntriesFilled,
    EntriesRejected,
    /// Entries whose order outcome is not yet known
    EntriesUnconfirmed,
    ExitsRequested,
    ExitsFilled,
    ExitFailures,
    KillSwitchActivations,
    /// Ticks that ran past the tick timeout
    TickTimeouts,
    /// Collaborator calls that failed or timed out
    CollaboratorErrors,
    /// Outbox flushes that left writes queued
    FlushFailures,
    FeedTicksDropped,
    FeedReconnects,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Trades not yet terminal
    ActiveTrades,
    /// Realized P&L today
    DailyPnl,
    /// 1 while the kill switch is in force
    KillSwitchActive,
    PortfolioValue,
    WatchlistSize,
    /// Writes waiting in the outbox
    PendingWrites,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::Tick => "polylatency_tick_latency_ms",
        LatencyMetric::MarketRequest => "polylatency_market_request_latency_ms",
        LatencyMetric::OrderSubmission => "polylatency_order_submission_latency_ms",
        LatencyMetric::StoreFlush => "polylatency_store_flush_latency_ms",
    };

    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Increment a counter by one
pub fn incr(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::SignalsDetected => "polylatency_signals_detected_total",
        CounterMetric::CandidatesRejected => "polylatency_candidates_rejected_total",
        CounterMetric::CandidatesMalformed => "polylatency_candidates_malformed_total",
        CounterMetric::EntriesDecided => "polylatency_entries_decided_total",
        CounterMetric::EntriesFilled => "polylatency_entries_filled_total",
        CounterMetric::EntriesRejected => "polylatency_entries_rejected_total",
        CounterMetric::EntriesUnconfirmed => "polylatency_entries_unconfirmed_total",
        CounterMetric::ExitsRequested => "polylatency_exits_requested_total",
        CounterMetric::ExitsFilled => "polylatency_exits_filled_total",
        CounterMetric::ExitFailures => "polylatency_exit_failures_total",
        CounterMetric::KillSwitchActivations => "polylatency_kill_switch_activations_total",
        CounterMetric::TickTimeouts => "polylatency_tick_timeouts_total",
        CounterMetric::CollaboratorErrors => "polylatency_collaborator_errors_total",
        CounterMetric::FlushFailures => "polylatency_flush_failures_total",
        CounterMetric::FeedTicksDropped => "polylatency_feed_ticks_dropped_total",
        CounterMetric::FeedReconnects => "polylatency_feed_reconnects_total",
    };

    metrics::counter!(metric_name).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::ActiveTrades => "polylatency_active_trades",
        GaugeMetric::DailyPnl => "polylatency_daily_pnl_usd",
        GaugeMetric::KillSwitchActive => "polylatency_kill_switch_active",
        GaugeMetric::PortfolioValue => "polylatency_portfolio_value_usd",
        GaugeMetric::WatchlistSize => "polylatency_watchlist_size",
        GaugeMetric::PendingWrites => "polylatency_pending_writes",
    };

    metrics::gauge!(metric_name).set(value);
}
