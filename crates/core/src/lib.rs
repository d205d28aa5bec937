//! Unimarket Core - Shared domain types.
//!
//! This crate provides the types used across all Unimarket components:
//! - `server` - JSON API, payment webhooks, and admin withdrawal actions
//! - `cli` - Command-line tools for migrations and admin management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Gateway status strings are mapped to internal
//! statuses here so the mapping can be tested without a running gateway.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, rupiah amounts, statuses, and gateway
//!   status mapping

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
