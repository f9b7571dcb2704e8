//! Load scheduler.
//!
//! Accepts [`LoadRequest`](crate::request::LoadRequest)s, orders them by
//! priority, and runs at most `max_concurrent` loads at once. Each load
//! checks the artifact cache, fetches, classifies the response, decodes,
//! and stores the artifact. Retryable failures are re-submitted after a
//! growing delay until the retry budget runs out; every outcome feeds the
//! failure ledger, and suppressed identities are never fetched again.
//! While memory is tight, queued work below the admission cutoff waits.
//!
//! ```text
//! submit ─► precheck ─► admission ─┬─► active ─► cache/fetch/decode ─┬─► completed
//!                                  └─► pending ◄─── drain ◄──────────┤
//!                                         ▲                          ├─► retry wait ─┐
//!                                         └──────────────────────────┼───────────────┘
//!                                                                    └─► failed / suppressed
//! ```

mod builder;
mod queue;
mod service;
mod state;
mod stats;
mod task;


pub use builder::SchedulerBuilder;
pub use service::LoadScheduler;
pub use stats::SchedulerStats;
