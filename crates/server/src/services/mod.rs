//! Business logic between route handlers and repositories.
//!
//! - [`auth`] - Registration and password login
//! - [`checkout`] - Midtrans Snap checkouts
//! - [`payouts`] - Withdrawals, admin review, disbursement
//! - [`reconciliation`] - Applying Midtrans, Flip and Xendit callbacks
//! - [`notifier`] / [`realtime`] - Notifications and the SSE fan-out hub

pub mod auth;
pub mod checkout;
pub mod notifier;
pub mod payouts;
pub mod realtime;
pub mod reconciliation;
