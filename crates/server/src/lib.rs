//! Unimarket server library.
//!
//! The JSON API, payment webhooks and admin actions live here as a library so
//! the router can be exercised from tests without binding a socket.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod gateways;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
