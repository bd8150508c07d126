//! Greenlight: a movie catalogue JSON API with per-client admission control
//! and graceful lifecycle management.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod mailer;
pub mod models;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod tasks;

pub use config::ApiConfig;
pub use http::HttpServer;
pub use lifecycle::ShutdownCoordinator;
