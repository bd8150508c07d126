//! Background work spawned by request handlers.

pub mod background;

pub use background::{BackgroundTasks, TaskFailure};
