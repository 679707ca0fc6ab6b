//! Common library for the loyalty service
//!
//! This crate provides the shared infrastructure used by the service
//! binaries: PostgreSQL connection pooling, schema bootstrap and the
//! database error types.

pub mod database;
pub mod error;
