//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! accepted connection (lifecycle::ShutdownCoordinator)
//!     → server.rs (request id, trace span, panic recovery, metrics, timeout)
//!     → security::admission_middleware (draining → 503, bucket → 429)
//!     → request.rs (JSON body, path id, query parsing)
//!     → movies.rs / users.rs / healthcheck.rs
//!     → response.rs (JSON error envelope)
//! ```

pub mod healthcheck;
pub mod movies;
pub mod request;
pub mod response;
pub mod server;
pub mod users;

pub use request::{JsonBody, X_EXPECTED_VERSION, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
