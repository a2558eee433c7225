//! Core of the lead-outreach service: session lifecycle supervision and
//! rate-limited batch dispatch over an opaque messaging transport.
//!
//! * [`session::SessionManager`] owns the single transport session: pairing,
//!   reconnection, conflict recovery, bounded retry.
//! * [`dispatch::Dispatcher`] sends templated message sequences to leads at a
//!   human-like pace, continuing past per-lead failures.
//! * [`ratelimit::RateLimiter`] is the persisted sliding-window admission
//!   gate in front of every batch.
//! * [`supervisor::ProcessSupervisor`] reclaims worker processes that hold
//!   the on-disk session directory.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod phone;
pub mod ratelimit;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use dispatch::{Dispatcher, SendReport};
pub use error::{CoreError, Result};
pub use ratelimit::{RateLimitStatus, RateLimiter};
pub use session::{SessionManager, SessionState, SessionStatus};
pub use store::JsonStore;
pub use supervisor::{ProcessBackend, ProcessSupervisor, SystemBackend};
