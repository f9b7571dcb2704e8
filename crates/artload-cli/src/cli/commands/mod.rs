//! CLI command handlers.

mod fetch;
mod ledger;

pub use fetch::{run_fetch, FetchArgs};
pub use ledger::{run_ledger_status, run_ledger_sweep};
