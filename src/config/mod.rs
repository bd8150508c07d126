//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ApiConfig (validated, immutable)
//!     → CLI flag overrides applied in main
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs reloads and validates
//!     → only the admission section is applied live
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdmissionConfig, ApiConfig, Environment, ListenerConfig, LogFormat, MailerConfig,
    ObservabilityConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
