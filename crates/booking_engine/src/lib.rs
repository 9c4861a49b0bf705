//! # Booking Engine
//!
//! This crate provides the reservation and availability engine for the
//! property booking application. It decides whether a requested date range
//! may be granted, keeps the authoritative record of granted and blocked
//! ranges, and drives reservations through their lifecycle.

/// Date range model and overlap predicate
mod range;
pub use range::*;

/// Domain types: reservations, blocks, notification events
mod types;
pub use types::*;

/// Error taxonomy for booking operations
mod error;
pub use error::*;

/// Storage trait shared by the Postgres and in-memory backends
mod store;
pub use store::*;

/// Postgres-backed store
mod pg_store;
pub use pg_store::*;

/// In-memory store for tests and local development
mod memory_store;
pub use memory_store::*;

/// Resource owner lookups (listing collaborator)
mod directory;
pub use directory::*;

/// Reservation state machine and per-resource locking
mod engine;
pub use engine::*;
