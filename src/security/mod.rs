//! Request admission.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → shutdown gate (503 once draining has started)
//!     → rate_limit.rs (per-client token bucket, keyed by peer IP)
//!     → handler
//! ```

pub mod rate_limit;

pub use rate_limit::{admission_middleware, AdmissionError, RateLimiter, SweeperHandle};
