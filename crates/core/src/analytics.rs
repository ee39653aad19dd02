//! Visitor analytics session.
//!
//! One [`AnalyticsSession`] exists per visitor storage lifetime. It records
//! category visits, searches, product views and cart mutations in bounded,
//! frequency-ranked lists, tracks the last cart activity used by the
//! abandonment policy, and holds the collected WhatsApp contact.
//!
//! All timestamps are epoch milliseconds. `last_cart_activity == 0` means
//! nothing is being watched for abandonment.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartChange;
use crate::types::{CartEventKind, ProductId, Quantity, SessionId, WhatsAppNumber};

/// A session idle for longer than this is replaced by a fresh one.
pub const SESSION_TTL: TimeDelta = TimeDelta::hours(24);

/// Maximum entries kept in `categories_visited`.
pub const MAX_CATEGORIES: usize = 50;
/// Maximum entries kept in `search_terms`.
pub const MAX_SEARCH_TERMS: usize = 50;
/// Maximum entries kept in `products_viewed`.
pub const MAX_PRODUCTS_VIEWED: usize = 50;
/// Maximum entries kept in `cart_events`.
pub const MAX_CART_EVENTS: usize = 100;

const SNAPSHOT_TOP: usize = 10;
const SNAPSHOT_CART_EVENTS: usize = 20;

/// A visited category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryVisit {
    /// Category name.
    pub category: String,
    /// Times visited.
    pub visits: u32,
    /// Last visit.
    pub last_visit: i64,
}

/// A search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTerm {
    /// Normalized term.
    pub term: String,
    /// Times searched.
    pub count: u32,
    /// Last search.
    pub last_search: i64,
}

/// A viewed product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    /// Product.
    pub product_id: ProductId,
    /// Product name at view time.
    pub product_name: String,
    /// Category at view time.
    pub category: String,
    /// Times viewed.
    pub views: u32,
    /// Last view.
    pub last_view: i64,
}

/// A cart mutation in the analytics log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEventRecord {
    /// Mutation kind.
    #[serde(rename = "type")]
    pub kind: CartEventKind,
    /// Product.
    pub product_id: ProductId,
    /// Units left on the row after the mutation.
    pub quantity: Quantity,
    /// When it happened.
    pub timestamp: i64,
}

/// An edit of the collected contact number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChange {
    /// Previous number.
    pub from: WhatsAppNumber,
    /// New number.
    pub to: WhatsAppNumber,
    /// When it changed.
    pub changed_at: i64,
}

/// Result of collecting a WhatsApp number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactUpdate {
    /// First number for this session.
    Collected,
    /// Same number as before; nothing changed.
    Unchanged,
    /// A different number replaced the previous one.
    Changed {
        /// Previous number.
        from: WhatsAppNumber,
    },
}

/// Per-visitor analytics state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSession {
    /// Stable visitor session.
    pub session_id: SessionId,
    /// Session start.
    pub start_time: i64,
    /// Last recorded activity of any kind.
    pub last_activity: i64,
    /// Accumulated time between activities.
    #[serde(default)]
    pub time_on_site: i64,
    /// Visited categories, most frequent first.
    #[serde(default)]
    pub categories_visited: Vec<CategoryVisit>,
    /// Searches, most frequent first.
    #[serde(default)]
    pub search_terms: Vec<SearchTerm>,
    /// Viewed products, most frequent first.
    #[serde(default)]
    pub products_viewed: Vec<ProductView>,
    /// Last cart mutations, oldest first.
    #[serde(default)]
    pub cart_events: Vec<CartEventRecord>,
    /// Last cart mutation; zero when nothing is watched.
    #[serde(default)]
    pub last_cart_activity: i64,
    /// Collected contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_collected: Option<WhatsAppNumber>,
    /// When the contact was first collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_collected_at: Option<i64>,
    /// Edits of the contact.
    #[serde(default)]
    pub whatsapp_history: Vec<ContactChange>,
}

/// Bounded projection of a session sent along with webhooks and syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    /// Session.
    pub session_id: SessionId,
    /// Session start.
    pub start_time: i64,
    /// Last activity.
    pub last_activity: i64,
    /// Accumulated time on site.
    pub time_on_site: i64,
    /// Top categories.
    pub top_categories: Vec<CategoryVisit>,
    /// Top searches.
    pub top_search_terms: Vec<SearchTerm>,
    /// Top products.
    pub top_products: Vec<ProductView>,
    /// Latest cart mutations.
    pub recent_cart_events: Vec<CartEventRecord>,
    /// Last cart mutation.
    pub last_cart_activity: i64,
}

impl AnalyticsSession {
    /// Start a fresh session at `now`.
    #[must_use]
    pub fn start(now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis();
        Self {
            session_id: SessionId::generate(millis),
            start_time: millis,
            last_activity: millis,
            time_on_site: 0,
            categories_visited: Vec::new(),
            search_terms: Vec::new(),
            products_viewed: Vec::new(),
            cart_events: Vec::new(),
            last_cart_activity: 0,
            whatsapp_collected: None,
            whatsapp_collected_at: None,
            whatsapp_history: Vec::new(),
        }
    }

    /// Reuse `stored` unless it is missing or stale, in which case a fresh
    /// session is started. The boolean is `true` when the session is new.
    #[must_use]
    pub fn resume(stored: Option<Self>, now: DateTime<Utc>) -> (Self, bool) {
        match stored {
            Some(session) if !session.is_stale(now) => (session, false),
            _ => (Self::start(now), true),
        }
    }

    /// Whether more than [`SESSION_TTL`] has passed since the last activity.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis().saturating_sub(self.last_activity) > SESSION_TTL.num_milliseconds()
    }

    /// Advance the session clock.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let millis = now.timestamp_millis();
        // Stored stamps are untrusted; saturate instead of overflowing.
        let gap = millis.saturating_sub(self.last_activity).max(0);
        self.time_on_site = self.time_on_site.saturating_add(gap);
        self.last_activity = self.last_activity.max(millis);
    }

    /// Record a category page visit.
    pub fn record_category_visit(&mut self, category: &str, now: DateTime<Utc>) {
        let category = category.trim();
        if category.is_empty() {
            return;
        }
        self.touch(now);
        let at = now.timestamp_millis();

        match self
            .categories_visited
            .iter_mut()
            .find(|c| c.category == category)
        {
            Some(entry) => {
                entry.visits = entry.visits.saturating_add(1);
                entry.last_visit = at;
            }
            None => self.categories_visited.push(CategoryVisit {
                category: category.to_owned(),
                visits: 1,
                last_visit: at,
            }),
        }
        rank(&mut self.categories_visited, |c| (c.visits, c.last_visit));
        self.categories_visited.truncate(MAX_CATEGORIES);
    }

    /// Record a search. Terms are trimmed and lowercased; blank terms are
    /// ignored.
    pub fn record_search(&mut self, term: &str, now: DateTime<Utc>) {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return;
        }
        self.touch(now);
        let at = now.timestamp_millis();

        match self.search_terms.iter_mut().find(|s| s.term == term) {
            Some(entry) => {
                entry.count = entry.count.saturating_add(1);
                entry.last_search = at;
            }
            None => self.search_terms.push(SearchTerm {
                term,
                count: 1,
                last_search: at,
            }),
        }
        rank(&mut self.search_terms, |s| (s.count, s.last_search));
        self.search_terms.truncate(MAX_SEARCH_TERMS);
    }

    /// Record a product page view.
    pub fn record_product_view(
        &mut self,
        product_id: &ProductId,
        product_name: &str,
        category: &str,
        now: DateTime<Utc>,
    ) {
        self.touch(now);
        let at = now.timestamp_millis();

        match self
            .products_viewed
            .iter_mut()
            .find(|p| &p.product_id == product_id)
        {
            Some(entry) => {
                entry.views = entry.views.saturating_add(1);
                entry.last_view = at;
                product_name.clone_into(&mut entry.product_name);
                category.clone_into(&mut entry.category);
            }
            None => self.products_viewed.push(ProductView {
                product_id: product_id.clone(),
                product_name: product_name.to_owned(),
                category: category.to_owned(),
                views: 1,
                last_view: at,
            }),
        }
        rank(&mut self.products_viewed, |p| (p.views, p.last_view));
        self.products_viewed.truncate(MAX_PRODUCTS_VIEWED);
    }

    /// Append a cart mutation and mark cart activity at `now`.
    pub fn record_cart_event(&mut self, change: &CartChange, now: DateTime<Utc>) {
        self.touch(now);
        let at = now.timestamp_millis();
        self.cart_events.push(CartEventRecord {
            kind: change.kind,
            product_id: change.product_id.clone(),
            quantity: change.quantity,
            timestamp: at,
        });
        let overflow = self.cart_events.len().saturating_sub(MAX_CART_EVENTS);
        self.cart_events.drain(..overflow);
        self.last_cart_activity = at;
    }

    /// Stop watching for abandonment.
    pub const fn disarm_abandonment(&mut self) {
        self.last_cart_activity = 0;
    }

    /// Store a contact number.
    ///
    /// The first number is stamped with its collection time. A different
    /// number later on replaces it and leaves an entry in
    /// `whatsapp_history`.
    pub fn collect_whatsapp(&mut self, number: WhatsAppNumber, now: DateTime<Utc>) -> ContactUpdate {
        self.touch(now);
        let at = now.timestamp_millis();

        match self.whatsapp_collected.take() {
            None => {
                self.whatsapp_collected = Some(number);
                self.whatsapp_collected_at = Some(at);
                ContactUpdate::Collected
            }
            Some(previous) if previous == number => {
                self.whatsapp_collected = Some(previous);
                ContactUpdate::Unchanged
            }
            Some(previous) => {
                self.whatsapp_history.push(ContactChange {
                    from: previous.clone(),
                    to: number.clone(),
                    changed_at: at,
                });
                self.whatsapp_collected = Some(number);
                ContactUpdate::Changed { from: previous }
            }
        }
    }

    /// Contact to prefill in checkout.
    #[must_use]
    pub const fn default_contact(&self) -> Option<&WhatsAppNumber> {
        self.whatsapp_collected.as_ref()
    }

    /// Bounded projection for outbound payloads.
    #[must_use]
    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let recent_start = self.cart_events.len().saturating_sub(SNAPSHOT_CART_EVENTS);
        AnalyticsSnapshot {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            last_activity: self.last_activity,
            time_on_site: self.time_on_site,
            top_categories: self.categories_visited.iter().take(SNAPSHOT_TOP).cloned().collect(),
            top_search_terms: self.search_terms.iter().take(SNAPSHOT_TOP).cloned().collect(),
            top_products: self.products_viewed.iter().take(SNAPSHOT_TOP).cloned().collect(),
            recent_cart_events: self.cart_events.iter().skip(recent_start).cloned().collect(),
            last_cart_activity: self.last_cart_activity,
        }
    }
}

/// Most frequent first, most recent first among equals.
fn rank<T>(entries: &mut [T], key: impl Fn(&T) -> (u32, i64)) {
    entries.sort_by(|a, b| {
        let (count_a, seen_a) = key(a);
        let (count_b, seen_b) = key(b);
        count_b.cmp(&count_a).then(seen_b.cmp(&seen_a))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::LineItemId;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn change(product: &str, kind: CartEventKind, quantity: u32) -> CartChange {
        CartChange {
            kind,
            line_id: LineItemId::new("row"),
            product_id: ProductId::new(product),
            quantity: Quantity::new(quantity),
        }
    }

    #[test]
    fn test_resume_keeps_recent_session() {
        let session = AnalyticsSession::start(at(1_000));
        let id = session.session_id.clone();
        let (resumed, fresh) = AnalyticsSession::resume(Some(session), at(1_000 + 3_600_000));
        assert!(!fresh);
        assert_eq!(resumed.session_id, id);
    }

    #[test]
    fn test_resume_replaces_stale_session() {
        let session = AnalyticsSession::start(at(1_000));
        let id = session.session_id.clone();
        let later = at(1_000 + SESSION_TTL.num_milliseconds() + 1);
        let (resumed, fresh) = AnalyticsSession::resume(Some(session), later);
        assert!(fresh);
        assert_ne!(resumed.session_id, id);
        assert_eq!(resumed.last_cart_activity, 0);
    }

    #[test]
    fn test_category_visits_ranked_by_frequency() {
        let mut s = AnalyticsSession::start(at(0));
        s.record_category_visit("Capinhas", at(10));
        s.record_category_visit("Cabos", at(20));
        s.record_category_visit("Cabos", at(30));
        s.record_category_visit("Películas", at(40));

        let names: Vec<&str> = s.categories_visited.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Cabos", "Películas", "Capinhas"]);
        assert_eq!(s.categories_visited.first().unwrap().visits, 2);
        assert_eq!(s.categories_visited.first().unwrap().last_visit, 30);
    }

    #[test]
    fn test_search_terms_normalized() {
        let mut s = AnalyticsSession::start(at(0));
        s.record_search("  Capinha iPhone ", at(10));
        s.record_search("capinha iphone", at(20));
        s.record_search("   ", at(30));
        assert_eq!(s.search_terms.len(), 1);
        assert_eq!(s.search_terms.first().unwrap().count, 2);
    }

    #[test]
    fn test_products_viewed_capped() {
        let mut s = AnalyticsSession::start(at(0));
        for i in 0..60 {
            s.record_product_view(&ProductId::new(format!("P{i}")), "Item", "Cat", at(i));
        }
        assert_eq!(s.products_viewed.len(), MAX_PRODUCTS_VIEWED);
        // Most recent wins among equal counts.
        assert_eq!(s.products_viewed.first().unwrap().product_id, ProductId::new("P59"));
    }

    #[test]
    fn test_cart_events_ring_buffer() {
        let mut s = AnalyticsSession::start(at(0));
        for i in 0..120 {
            s.record_cart_event(&change("P1", CartEventKind::Add, u32::try_from(i).unwrap()), at(i));
        }
        assert_eq!(s.cart_events.len(), MAX_CART_EVENTS);
        assert_eq!(s.cart_events.first().unwrap().timestamp, 20);
        assert_eq!(s.last_cart_activity, 119);
    }

    #[test]
    fn test_cart_event_sets_and_disarm_clears_activity() {
        let mut s = AnalyticsSession::start(at(0));
        s.record_cart_event(&change("P1", CartEventKind::Add, 3), at(500));
        assert_eq!(s.last_cart_activity, 500);
        s.disarm_abandonment();
        assert_eq!(s.last_cart_activity, 0);
    }

    #[test]
    fn test_whatsapp_collection_and_audit_trail() {
        let mut s = AnalyticsSession::start(at(0));
        let first = WhatsAppNumber::parse("11987654321").unwrap();
        let second = WhatsAppNumber::parse("21912345678").unwrap();

        assert_eq!(s.collect_whatsapp(first.clone(), at(10)), ContactUpdate::Collected);
        assert_eq!(s.whatsapp_collected_at, Some(10));
        assert_eq!(s.collect_whatsapp(first.clone(), at(20)), ContactUpdate::Unchanged);
        assert!(s.whatsapp_history.is_empty());

        assert_eq!(
            s.collect_whatsapp(second.clone(), at(30)),
            ContactUpdate::Changed { from: first.clone() }
        );
        assert_eq!(s.default_contact(), Some(&second));
        assert_eq!(s.whatsapp_collected_at, Some(10));
        let entry = s.whatsapp_history.first().unwrap();
        assert_eq!(entry.from, first);
        assert_eq!(entry.to, second);
        assert_eq!(entry.changed_at, 30);
    }

    #[test]
    fn test_time_on_site_accumulates() {
        let mut s = AnalyticsSession::start(at(1_000));
        s.record_search("cabo", at(4_000));
        s.record_search("fonte", at(10_000));
        assert_eq!(s.time_on_site, 9_000);
        assert_eq!(s.last_activity, 10_000);
    }

    #[test]
    fn test_extreme_stored_stamps_do_not_overflow() {
        let mut s: AnalyticsSession = serde_json::from_value(serde_json::json!({
            "sessionId": "session_1_abc",
            "startTime": i64::MIN,
            "lastActivity": i64::MIN,
            "timeOnSite": i64::MAX,
            "lastCartActivity": i64::MIN
        }))
        .unwrap();

        assert!(s.is_stale(at(10_000)));
        s.record_search("cabo", at(10_000));
        assert_eq!(s.time_on_site, i64::MAX);
        assert_eq!(s.last_activity, 10_000);
    }

    #[test]
    fn test_blob_shape() {
        let mut s = AnalyticsSession::start(at(0));
        s.record_cart_event(&change("P1", CartEventKind::Remove, 0), at(5));
        let json = serde_json::to_value(&s).unwrap();
        for key in [
            "sessionId",
            "startTime",
            "lastActivity",
            "timeOnSite",
            "categoriesVisited",
            "searchTerms",
            "productsViewed",
            "cartEvents",
            "lastCartActivity",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["cartEvents"][0]["type"], "remove");
    }

    #[test]
    fn test_snapshot_is_bounded() {
        let mut s = AnalyticsSession::start(at(0));
        for i in 0..30 {
            s.record_search(&format!("termo {i}"), at(i));
            s.record_cart_event(&change("P1", CartEventKind::Add, 1), at(i));
        }
        let snap = s.snapshot();
        assert_eq!(snap.top_search_terms.len(), 10);
        assert_eq!(snap.recent_cart_events.len(), 20);
        assert_eq!(snap.recent_cart_events.last().unwrap().timestamp, 29);
    }
}
