//! Decision module
//!
//! Eligibility filtering and the pure entry/exit policies. Nothing here
//! performs I/O or mutates risk state.

mod entry;
mod exit;
mod filter;
mod types;

pub use entry::EntryPolicy;
pub use exit::ExitPolicy;
pub use filter::EligibilityFilter;
pub use types::{
    CandidateError, Eligibility, EntryDecision, EntryRejection, ExitDecision, ExitReason,
    RejectReason,
};
