//! Local order snapshots.
//!
//! After a successful checkout the storefront keeps a copy of the new order in
//! the visitor's session under [`session_keys::LOCAL_ORDERS`]. The API stays
//! the source of truth: the order history merges both lists with
//! [`reconcile`], shows snapshots the API does not know yet as awaiting
//! confirmation, and evicts the ones it does.
//!
//! Storage problems never surface as errors. Without a session every operation
//! is a no-op, and a value that fails to parse reads as an empty list.

use std::future::Future;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use bookswap_core::{
    Book, BookId, BookImage, Order, OrderId, OrderStatus, Price, ShippingAddress,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::models::session_keys;

/// Raw key/value storage for the snapshot list (a JSON array string).
pub trait OrderStorage {
    /// Stored value, if any.
    fn read_raw(&self) -> impl Future<Output = Option<String>> + Send;
    /// Replace the stored value. Returns `false` if the write failed.
    fn write_raw(&self, raw: String) -> impl Future<Output = bool> + Send;
    /// Delete the stored value. Returns `false` if the delete failed.
    fn remove(&self) -> impl Future<Output = bool> + Send;
}

impl OrderStorage for Session {
    async fn read_raw(&self) -> Option<String> {
        match self.get::<String>(session_keys::LOCAL_ORDERS).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read local orders from session");
                None
            }
        }
    }

    async fn write_raw(&self, raw: String) -> bool {
        match self.insert(session_keys::LOCAL_ORDERS, raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to write local orders to session");
                false
            }
        }
    }

    async fn remove(&self) -> bool {
        match self.remove_value(session_keys::LOCAL_ORDERS).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear local orders from session");
                false
            }
        }
    }
}

/// Snapshot of an order as it looked when the visitor placed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawLocalOrder")]
pub struct LocalOrder {
    pub id: OrderId,
    pub book_id: Option<BookId>,
    pub book_title: String,
    /// Image reference of the book (resolved at render time).
    pub book_image: Option<String>,
    pub total: Price,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: Option<DateTime<Utc>>,
}

impl LocalOrder {
    /// Snapshot an order returned by the API; `book` fills in what the order
    /// response leaves out. Without either the snapshot has no title or image.
    #[must_use]
    pub fn from_order(order: &Order, book: Option<&Book>) -> Self {
        let source = order.book.as_ref().or(book);
        Self {
            id: order.id,
            book_id: order.book_id.or(source.map(|b| b.id)),
            book_title: source.map(|b| b.title.clone()).unwrap_or_default(),
            book_image: source.and_then(Book::primary_image).map(str::to_string),
            total: order.total,
            status: order.status,
            payment_intent_id: order.payment_intent_id.clone(),
            shipping_address: order.shipping_address.clone(),
            created_at: order.created_at.or_else(|| Some(Utc::now())),
        }
    }
}

/// Every shape the snapshot list has been stored in.
///
/// Older entries nest the book (`book: {id, title, images}`), call the total
/// `total_price` or `amount`, and may have no status at all.
#[derive(Deserialize)]
struct RawLocalOrder {
    id: OrderId,
    #[serde(default)]
    book_id: Option<BookId>,
    #[serde(default, alias = "title")]
    book_title: Option<String>,
    #[serde(default)]
    book_image: Option<String>,
    #[serde(default)]
    book: Option<LegacyBook>,
    #[serde(default, alias = "total_price", alias = "amount")]
    total: Option<Price>,
    #[serde(default)]
    status: Option<OrderStatus>,
    #[serde(default)]
    payment_intent_id: Option<String>,
    #[serde(default)]
    shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct LegacyBook {
    #[serde(default)]
    id: Option<BookId>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    images: Vec<BookImage>,
    #[serde(default, alias = "image")]
    cover_image: Option<String>,
}

impl From<RawLocalOrder> for LocalOrder {
    fn from(raw: RawLocalOrder) -> Self {
        let (legacy_id, legacy_title, legacy_image) = match raw.book {
            Some(book) => {
                let image = book
                    .images
                    .iter()
                    .find(|img| img.is_primary)
                    .or_else(|| book.images.first())
                    .map(|img| img.image.clone())
                    .or(book.cover_image);
                (book.id, book.title, image)
            }
            None => (None, None, None),
        };

        Self {
            id: raw.id,
            book_id: raw.book_id.or(legacy_id),
            book_title: raw.book_title.or(legacy_title).unwrap_or_default(),
            book_image: raw.book_image.or(legacy_image),
            total: raw.total.unwrap_or_default(),
            status: raw.status.unwrap_or_default(),
            payment_intent_id: raw.payment_intent_id,
            shipping_address: raw.shipping_address,
            created_at: raw.created_at,
        }
    }
}

/// The visitor's local order snapshots, most recent first.
pub struct LocalOrders<S> {
    storage: Option<S>,
}

impl<S> LocalOrders<S>
where
    S: OrderStorage + Sync,
{
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// Store with no backing storage; reads are empty and writes do nothing.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self { storage: None }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    /// All snapshots, most recent first.
    pub async fn list(&self) -> Vec<LocalOrder> {
        let Some(storage) = &self.storage else {
            return Vec::new();
        };
        let Some(raw) = storage.read_raw().await else {
            return Vec::new();
        };
        parse_list(&raw)
    }

    /// Snapshot with the given id.
    pub async fn get(&self, id: OrderId) -> Option<LocalOrder> {
        self.list().await.into_iter().find(|order| order.id == id)
    }

    /// Put `order` at the front, replacing any snapshot with the same id.
    pub async fn save(&self, order: LocalOrder) -> bool {
        let mut orders = self.list().await;
        orders.retain(|existing| existing.id != order.id);
        orders.insert(0, order);
        self.write(&orders).await
    }

    /// Change the status of one snapshot. Returns `false` if it is not stored.
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> bool {
        let mut orders = self.list().await;
        let Some(order) = orders.iter_mut().find(|order| order.id == id) else {
            return false;
        };
        if order.status == status {
            return true;
        }
        order.status = status;
        self.write(&orders).await
    }

    /// Drop the snapshots with the given ids.
    pub async fn evict(&self, ids: &[OrderId]) -> bool {
        if ids.is_empty() {
            return true;
        }
        let mut orders = self.list().await;
        let before = orders.len();
        orders.retain(|order| !ids.contains(&order.id));
        if orders.len() == before {
            return true;
        }
        if orders.is_empty() {
            return self.clear().await;
        }
        self.write(&orders).await
    }

    /// Remove every snapshot.
    pub async fn clear(&self) -> bool {
        match &self.storage {
            Some(storage) => storage.remove().await,
            None => false,
        }
    }

    async fn write(&self, orders: &[LocalOrder]) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        match serde_json::to_string(orders) {
            Ok(raw) => storage.write_raw(raw).await,
            Err(e) => {
                warn!(error = %e, "Failed to serialize local orders");
                false
            }
        }
    }
}

/// Parse the stored list, skipping entries that no longer parse.
fn parse_list(raw: &str) -> Vec<LocalOrder> {
    let values: Vec<Value> = match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(e) => {
            debug!(error = %e, "Stored local orders are not a JSON array");
            return Vec::new();
        }
    };
    values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect()
}

impl<S> FromRequestParts<S> for LocalOrders<Session>
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Session>()
            .cloned()
            .map_or_else(Self::unavailable, Self::new))
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// One row of the order history.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// Known to the API.
    Confirmed(Order),
    /// Only known locally; the API has not reported it yet.
    AwaitingConfirmation(LocalOrder),
}

/// Result of merging API orders with local snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    /// Local-only entries first (newest purchases), then the API's list in
    /// its own order.
    pub entries: Vec<HistoryEntry>,
    /// Snapshots the API already knows about and that can be dropped.
    pub evict: Vec<OrderId>,
}

/// Merge the API's order list with local snapshots. The API record wins on
/// id conflict.
#[must_use]
pub fn reconcile(backend: Vec<Order>, local: Vec<LocalOrder>) -> Reconciliation {
    let mut evict = Vec::new();
    let mut entries = Vec::with_capacity(backend.len() + local.len());

    for snapshot in local {
        if backend.iter().any(|order| order.id == snapshot.id) {
            evict.push(snapshot.id);
        } else {
            entries.push(HistoryEntry::AwaitingConfirmation(snapshot));
        }
    }
    entries.extend(backend.into_iter().map(HistoryEntry::Confirmed));

    Reconciliation { entries, evict }
}
