//! # Web Handlers for the Reservation Backend
//!
//! This crate provides the HTTP surface of the reservation and availability
//! engine. Identity arrives as opaque requester/actor ids in the payloads;
//! authentication itself is an external collaborator.

/// Request and response types for reservation endpoints
mod booking_types;
pub use booking_types::*;

/// Reservation creation and lifecycle transition handlers
mod booking_handlers;
pub use booking_handlers::*;

/// Availability query and manual block handlers
mod availability_handlers;
pub use availability_handlers::*;

/// Notification pull API and live SSE channel handlers
mod notification_handlers;
pub use notification_handlers::*;

/// Server-sent-events stream over a live notification connection
mod stream;
pub use stream::*;
