pub mod config;
pub mod logging;

pub mod admission;
pub mod artifact;
pub mod cache;
pub mod fetch;
pub mod ledger;
pub mod lifecycle;
pub mod request;
pub mod retry;
pub mod scheduler;

pub use request::{LoadHandle, LoadRequest, Priority, Submission};
pub use scheduler::{LoadScheduler, SchedulerStats};
