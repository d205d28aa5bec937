//! Core types for Unimarket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod gateway;
pub mod id;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{AmountError, Rupiah};
pub use status::*;
