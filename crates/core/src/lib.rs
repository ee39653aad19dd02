//! Atacado Core - wholesale cart domain.
//!
//! This crate holds the rules of the Atacado storefront that do not touch
//! the outside world:
//! - `storefront` - runtime context, persistence, webhooks and JSON API
//! - `cli` - operator tooling over persisted state
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no HTTP
//! clients, no implicit clocks. Anything time-dependent takes `now` as an
//! argument, which keeps every rule testable in isolation.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, quantities and contacts
//! - [`pricing`] - Tier resolution
//! - [`cart`] - Cart rows, mutations and aggregates
//! - [`grouping`] - Per-product display grouping
//! - [`checkout`] - Minimum-order gate and order payload
//! - [`analytics`] - Visitor analytics session
//! - [`abandonment`] - Abandonment policy
//! - [`webhook`] - Webhook envelope, routing and delivery log

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod abandonment;
pub mod analytics;
pub mod cart;
pub mod checkout;
pub mod grouping;
pub mod pricing;
pub mod types;
pub mod webhook;

pub use abandonment::{AbandonmentPolicy, AbandonmentState, Verdict};
pub use analytics::{AnalyticsSession, AnalyticsSnapshot, ContactUpdate};
pub use cart::{Cart, CartChange, CartSummary, LineItem, NewLineItem, UpgradeHint};
pub use checkout::{CheckoutError, CheckoutStatus, Customer, MinimumOrder, OrderItem, OrderRequest};
pub use grouping::{CartGroup, group_items};
pub use pricing::{PriceTier, ResolvedPrice, TierKind, TierSchedule, resolve_price};
pub use types::*;
pub use webhook::{
    DeliveryLog, DeliveryOutcome, DeliveryRecord, WebhookEnvelope, WebhookEventType, WebhookRoute,
    WebhookSetting, WebhookSettings,
};
