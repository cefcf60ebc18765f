//! Upstream subscription supervision

pub mod config;
pub mod core;

pub use self::config::{SupervisorConfig, DEFAULT_HEALTH_CHECK_INTERVAL};
pub use self::core::{Supervisor, SupervisorState};
