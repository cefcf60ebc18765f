//! Frame formatting and fan-out
//!
//! ```text
//! upstream batch ──► format_batch() ──► BroadcastSink::broadcast() ──► every client
//!                                              │
//!                                              └─ failed write ─► registry.remove_session()
//! ```

pub mod format;
pub mod handler;
pub mod sink;

pub use format::{format_batch, RECORD_TERMINATOR};
pub use handler::RelayHandler;
pub use sink::{BroadcastSink, DEFAULT_WRITE_TIMEOUT};
