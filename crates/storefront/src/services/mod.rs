//! Outbound services.
//!
//! # Services
//!
//! - `backend` - Backend API (cart sync, mark contacted, webhook settings, orders)
//! - `webhook` - Automation webhook dispatch and delivery log
//! - `retry` - Bounded fixed-delay retry shared by both

pub mod backend;
pub mod retry;
pub mod webhook;

pub use backend::{BackendClient, BackendError, CartSync, OrderReceipt};
pub use retry::{RetryError, RetryPolicy, Transient, execute_with_retry};
pub use webhook::{WebhookDispatcher, WebhookError};
