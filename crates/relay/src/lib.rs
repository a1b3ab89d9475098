//! Outbound relay: mirrors internally created messages and audit updates to
//! the platform their thread is linked to, exactly once per record.

pub mod format;
pub mod worker;

pub use worker::{PassSummary, RelayWorker};
