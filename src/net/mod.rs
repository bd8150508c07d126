//! Network layer.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (permit-bounded accept)
//!     → connection.rs (active connection tracking)
//!     → hyper connection driven by lifecycle::shutdown
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
