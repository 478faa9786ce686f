//! Display data shared by several templates.

use bookswap_core::{Book, Order, OrderStatus, Review};
use chrono::{DateTime, Utc};

use crate::services::images::{ImageService, ImageView};
use crate::services::local_orders::{HistoryEntry, LocalOrder};

/// Book summary for grids and lists.
#[derive(Debug, Clone)]
pub struct BookCard {
    pub id: String,
    pub title: String,
    pub author: String,
    pub price: String,
    pub condition: &'static str,
    pub category: Option<String>,
    pub seller: Option<String>,
    pub is_available: bool,
    pub image: ImageView,
}

impl BookCard {
    #[must_use]
    pub fn new(book: &Book, images: &ImageService) -> Self {
        Self {
            id: book.id.to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            price: book.price.display(),
            condition: book.condition.label(),
            category: book.category.as_ref().map(|c| c.name.clone()),
            seller: book.owner.as_ref().map(|u| u.display_name().to_string()),
            is_available: book.is_available,
            image: images.view(book.primary_image(), &book.title),
        }
    }

    #[must_use]
    pub fn list(books: &[Book], images: &ImageService) -> Vec<Self> {
        books.iter().map(|book| Self::new(book, images)).collect()
    }
}

/// Review as shown under a book.
#[derive(Debug, Clone)]
pub struct ReviewView {
    pub reviewer: String,
    pub rating: u8,
    pub comment: String,
    pub date: String,
}

impl From<&Review> for ReviewView {
    fn from(review: &Review) -> Self {
        Self {
            reviewer: review
                .reviewer
                .as_ref()
                .map_or_else(|| "A reader".to_string(), |u| u.display_name().to_string()),
            rating: review.rating,
            comment: review.comment.clone(),
            date: format_date(review.created_at),
        }
    }
}

/// One row of the order history, from either source.
#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: String,
    pub title: String,
    pub total: String,
    pub status: &'static str,
    pub status_class: &'static str,
    pub date: String,
    pub image: ImageView,
    /// Known only from the local snapshot.
    pub awaiting_confirmation: bool,
    pub shipping: Option<String>,
    pub payment_reference: Option<String>,
}

impl OrderRow {
    #[must_use]
    pub fn from_order(order: &Order, images: &ImageService) -> Self {
        let book = order.book.as_ref();
        let title = book.map_or_else(
            || order.book_id.map_or_else(|| "Book".to_string(), |id| format!("Book #{id}")),
            |b| b.title.clone(),
        );
        Self {
            id: order.id.to_string(),
            image: images.view(book.and_then(Book::primary_image), &title),
            title,
            total: order.total.display(),
            status: order.status.label(),
            status_class: status_class(order.status),
            date: format_date(order.created_at),
            awaiting_confirmation: false,
            shipping: order.shipping_address.as_ref().map(|a| a.summary()),
            payment_reference: order.payment_intent_id.clone(),
        }
    }

    #[must_use]
    pub fn from_local(order: &LocalOrder, images: &ImageService) -> Self {
        Self {
            id: order.id.to_string(),
            title: order.book_title.clone(),
            total: order.total.display(),
            status: order.status.label(),
            status_class: status_class(order.status),
            date: format_date(order.created_at),
            image: images.view(order.book_image.as_deref(), &order.book_title),
            awaiting_confirmation: true,
            shipping: order.shipping_address.as_ref().map(|a| a.summary()),
            payment_reference: order.payment_intent_id.clone(),
        }
    }

    #[must_use]
    pub fn from_entry(entry: &HistoryEntry, images: &ImageService) -> Self {
        match entry {
            HistoryEntry::Confirmed(order) => Self::from_order(order, images),
            HistoryEntry::AwaitingConfirmation(order) => Self::from_local(order, images),
        }
    }
}

const fn status_class(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered => "status-ok",
        OrderStatus::Cancelled => "status-cancelled",
        OrderStatus::Pending | OrderStatus::Unknown => "status-pending",
    }
}

/// `12 Mar 2025`, or empty when unknown.
#[must_use]
pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%-d %b %Y").to_string())
        .unwrap_or_default()
}

/// Page links for list pages.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub current: u32,
    pub total: u32,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl Pagination {
    /// `base` already carries the other query parameters (`/books?q=x&`).
    #[must_use]
    pub fn new(current: u32, total: u32, base: &str) -> Self {
        let current = current.max(1);
        Self {
            current,
            total: total.max(1),
            prev_url: (current > 1).then(|| format!("{base}page={}", current - 1)),
            next_url: (current < total).then(|| format!("{base}page={}", current + 1)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_links() {
        let p = Pagination::new(2, 3, "/books?q=dune&");
        assert_eq!(p.prev_url.as_deref(), Some("/books?q=dune&page=1"));
        assert_eq!(p.next_url.as_deref(), Some("/books?q=dune&page=3"));

        let p = Pagination::new(1, 1, "/books?");
        assert!(p.prev_url.is_none());
        assert!(p.next_url.is_none());
    }

    #[test]
    fn test_format_date() {
        let date = DateTime::parse_from_rfc3339("2025-03-04T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_date(Some(date)), "4 Mar 2025");
        assert_eq!(format_date(None), "");
    }
}
