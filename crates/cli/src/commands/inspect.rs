//! Offline inspection of a storefront state directory.
//!
//! # Usage
//!
//! ```bash
//! atacado cart --data-dir ./data
//! atacado session --json
//! atacado deliveries --limit 5
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATA_DIR` - State directory (default: ./data)
//! - `MIN_ORDER_UNITS` - Minimum units per order (default: 30)

use std::fmt::Write as _;
use std::path::Path;

use atacado_core::{
    AbandonmentState, AnalyticsSession, Cart, CartGroup, DeliveryLog, DeliveryOutcome,
    DeliveryRecord, MinimumOrder, Quantity, group_items,
};
use atacado_storefront::storage::{
    self, ANALYTICS_KEY, CART_KEY, DELIVERY_LOG_KEY, FileStore, StorageError,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while inspecting state.
#[derive(Debug, Error)]
pub enum InspectError {
    /// State directory could not be opened.
    #[error("Cannot open state directory: {0}")]
    Storage(#[from] StorageError),

    /// Output could not be rendered.
    #[error("Cannot render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Print the persisted cart.
pub async fn cart(data_dir: &Path, min_order_units: u32, json: bool) -> Result<(), InspectError> {
    let store = FileStore::open(data_dir)?;
    let cart: Cart = storage::load_or_default(&store, CART_KEY).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&cart)?);
    } else {
        let minimum = MinimumOrder::new(Quantity::new(min_order_units));
        print!("{}", render_cart(&cart, &minimum));
    }
    Ok(())
}

/// Print the persisted analytics session.
pub async fn session(data_dir: &Path, json: bool) -> Result<(), InspectError> {
    let store = FileStore::open(data_dir)?;
    let Some(session) = storage::load::<AnalyticsSession>(&store, ANALYTICS_KEY).await else {
        println!("No analytics session stored in {}", data_dir.display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        print!("{}", render_session(&session));
    }
    Ok(())
}

/// Print the webhook delivery log, optionally only the last `limit` entries.
pub async fn deliveries(data_dir: &Path, limit: Option<usize>, json: bool) -> Result<(), InspectError> {
    let store = FileStore::open(data_dir)?;
    let log: DeliveryLog = storage::load_or_default(&store, DELIVERY_LOG_KEY).await;
    let entries = tail(log.entries(), limit);

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else if entries.is_empty() {
        println!("No webhook deliveries recorded");
    } else {
        for record in entries {
            println!("{}", render_delivery(record));
        }
    }
    Ok(())
}

fn tail(entries: &[DeliveryRecord], limit: Option<usize>) -> &[DeliveryRecord] {
    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
    entries.get(skip..).unwrap_or_default()
}

fn render_cart(cart: &Cart, minimum: &MinimumOrder) -> String {
    let mut out = String::new();
    if cart.is_empty() {
        out.push_str("Cart is empty\n");
        return out;
    }

    for group in group_items(cart) {
        match &group {
            CartGroup::Single { item } => {
                let _ = writeln!(
                    out,
                    "{:>4} x {} @ {} = {}",
                    item.quantity,
                    item.name,
                    item.unit_price(),
                    item.line_total()
                );
            }
            CartGroup::Variants { name, variants, .. } => {
                let _ = writeln!(
                    out,
                    "{:>4} x {} ({} models) = {}",
                    group.total_quantity(),
                    name,
                    variants.len(),
                    group.total_price()
                );
                for variant in variants {
                    let _ = writeln!(
                        out,
                        "       {:>4} x {} @ {}",
                        variant.quantity,
                        variant.model_name.as_deref().unwrap_or("-"),
                        variant.unit_price()
                    );
                }
            }
        }
    }

    let summary = cart.summary();
    let status = minimum.status(cart);
    let _ = writeln!(out, "Units:    {}", summary.items_count);
    let _ = writeln!(out, "Subtotal: {}", summary.subtotal);
    let _ = writeln!(out, "Savings:  {}", summary.savings);
    if status.allowed {
        let _ = writeln!(out, "Minimum order of {} units reached", status.minimum);
    } else {
        let _ = writeln!(
            out,
            "Below minimum order of {} units ({} more needed)",
            status.minimum, status.remaining
        );
    }
    out
}

fn millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(|| ms.to_string(), |t| t.to_rfc3339())
}

fn render_session(session: &AnalyticsSession) -> String {
    let mut out = String::new();
    let snapshot = session.snapshot();

    let _ = writeln!(out, "Session:       {}", session.session_id);
    let _ = writeln!(out, "Started:       {}", millis(session.start_time));
    let _ = writeln!(out, "Last activity: {}", millis(session.last_activity));
    let _ = writeln!(out, "Time on site:  {}s", session.time_on_site / 1000);
    let _ = writeln!(
        out,
        "WhatsApp:      {}",
        session
            .whatsapp_collected
            .as_ref()
            .map_or("-", |n| n.as_str())
    );
    match AbandonmentState::of(session.last_cart_activity) {
        AbandonmentState::Idle => {
            let _ = writeln!(out, "Abandonment:   idle");
        }
        AbandonmentState::Watching => {
            let _ = writeln!(
                out,
                "Abandonment:   watching since {}",
                millis(session.last_cart_activity)
            );
        }
    }

    if !snapshot.top_categories.is_empty() {
        let _ = writeln!(out, "Top categories:");
        for visit in &snapshot.top_categories {
            let _ = writeln!(out, "  {:>3}  {}", visit.visits, visit.category);
        }
    }
    if !snapshot.top_search_terms.is_empty() {
        let _ = writeln!(out, "Top searches:");
        for term in &snapshot.top_search_terms {
            let _ = writeln!(out, "  {:>3}  {}", term.count, term.term);
        }
    }
    if !snapshot.top_products.is_empty() {
        let _ = writeln!(out, "Top products:");
        for view in &snapshot.top_products {
            let _ = writeln!(out, "  {:>3}  {} ({})", view.views, view.product_name, view.product_id);
        }
    }
    let _ = writeln!(out, "Cart events:   {}", session.cart_events.len());
    out
}

fn render_delivery(record: &DeliveryRecord) -> String {
    let outcome = match &record.outcome {
        DeliveryOutcome::Delivered { status, attempts } => {
            format!("delivered ({status}) after {attempts} attempt(s)")
        }
        DeliveryOutcome::Failed { attempts, error } => {
            format!("FAILED after {attempts} attempt(s): {error}")
        }
        DeliveryOutcome::Skipped => "skipped (disabled)".to_string(),
    };
    format!(
        "{}  {:<18} {:<10} {}",
        record.timestamp.to_rfc3339(),
        record.event,
        record.environment,
        outcome
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atacado_core::{
        NewLineItem, Price, TierSchedule, WebhookEnvironment, WebhookEventType,
    };
    use atacado_storefront::storage::KeyValueStore;

    use super::*;

    fn record(event: WebhookEventType, outcome: DeliveryOutcome) -> DeliveryRecord {
        DeliveryRecord {
            timestamp: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap(),
            event,
            environment: WebhookEnvironment::Test,
            endpoint: None,
            outcome,
        }
    }

    #[test]
    fn test_tail_limits_to_most_recent() {
        let entries = vec![
            record(WebhookEventType::WhatsappCollected, DeliveryOutcome::Skipped),
            record(WebhookEventType::CartAbandoned, DeliveryOutcome::Skipped),
            record(WebhookEventType::OrderCompleted, DeliveryOutcome::Skipped),
        ];

        assert_eq!(tail(&entries, None).len(), 3);
        assert_eq!(tail(&entries, Some(10)).len(), 3);
        let last = tail(&entries, Some(1));
        assert_eq!(last.len(), 1);
        assert_eq!(last.first().unwrap().event, WebhookEventType::OrderCompleted);
    }

    #[test]
    fn test_render_cart_below_minimum() {
        let mut cart = Cart::new();
        cart.add_item(NewLineItem::new(
            "p1",
            "Película 3D",
            Quantity::new(12),
            TierSchedule::retail(Price::from_cents(250)),
        ));

        let text = render_cart(&cart, &MinimumOrder::default());
        assert!(text.contains("Película 3D"));
        assert!(text.contains("Below minimum order of 30 units (18 more needed)"));
    }

    #[test]
    fn test_render_empty_cart() {
        assert_eq!(
            render_cart(&Cart::new(), &MinimumOrder::default()),
            "Cart is empty\n"
        );
    }

    #[test]
    fn test_render_delivery_failure() {
        let line = render_delivery(&record(
            WebhookEventType::CartAbandoned,
            DeliveryOutcome::Failed {
                attempts: 3,
                error: "timeout".to_string(),
            },
        ));
        assert!(line.contains("cartAbandoned"));
        assert!(line.contains("FAILED after 3 attempt(s): timeout"));
    }

    #[tokio::test]
    async fn test_deliveries_reads_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut log = DeliveryLog::default();
        log.push(record(WebhookEventType::CartAbandoned, DeliveryOutcome::Skipped));
        storage::save(&store, DELIVERY_LOG_KEY, &log).await.unwrap();
        assert!(store.get(DELIVERY_LOG_KEY).await.unwrap().is_some());

        deliveries(dir.path(), Some(5), true).await.unwrap();
        deliveries(dir.path(), None, false).await.unwrap();
    }
}
