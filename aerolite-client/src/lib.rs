//! # aerolite-client
//!
//! Client library for the Aerospike node protocol.
//!
//! This crate provides:
//! - An async message exchange engine over any tokio byte stream, plus a
//!   blocking mirror over `std::io` streams
//! - Single-record and streaming batch exchanges with result-code-aware
//!   retries
//! - Byte-level resynchronization after node error paths
//! - A high-level key-value API: get, put, delete, incr, batch reads, info

pub mod blocking;
pub mod client;
pub mod commands;
pub mod connection;
pub mod error;
pub mod record;
mod resync;

pub use client::Client;
pub use connection::{ClientConfig, Connection};
pub use error::ClientError;
pub use record::Record;
