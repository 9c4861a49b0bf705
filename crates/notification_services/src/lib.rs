//! # Notification Services
//!
//! This crate turns reservation lifecycle facts into per-recipient delivery.
//! The records themselves are persisted by the booking engine inside the
//! transition's own transaction; this crate owns the event bus that decouples
//! the state machine from delivery, the process-local registry of live
//! connections, and the pull API used by recipients without one.

/// Lifecycle event bus between the state machine and the dispatcher.
mod bus;
pub use bus::*;

/// Process-local registry of live push connections.
mod registry;
pub use registry::*;

/// Fan-out of lifecycle facts to live connections and the pull API.
mod dispatcher;
pub use dispatcher::*;
