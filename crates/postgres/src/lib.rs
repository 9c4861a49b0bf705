//! # Postgres
//!
//! This crate provides a client for the reservation backend to interact with
//! a PostgreSQL database.

/// Database client for the reservation backend.
pub mod database;
