//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownCoordinator::trigger
//!
//! Shutdown (shutdown.rs):
//!     Running → stop accepting → Draining (grace period)
//!             → force-close leftovers → WaitingBackground (unbounded)
//!             → Stopped
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{DrainTimeout, ShutdownCoordinator, ShutdownError, ShutdownReport, ShutdownState};
pub use signals::forward_signals;
