//! Trade lifecycle module
//!
//! Trade state machine, risk state and the write-behind outbox

mod manager;
mod outbox;
mod risk;
mod types;

pub use manager::TradeManager;
pub use outbox::{Outbox, PendingWrite};
pub use risk::{BudgetState, RiskState};
pub use types::{
    ExitAttempt, LifecycleError, Trade, TradeId, TradeState, ENTRY_REJECTED, EXIT_FAILED,
};
