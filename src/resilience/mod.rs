//! Resilience helpers.
//!
//! Retried operations in this crate are bounded and local: conflict retries
//! in the store and welcome-mail delivery. Both draw their delays from
//! [`backoff::RetryPolicy`].

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
