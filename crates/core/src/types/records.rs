//! Records mirrored from the BookSwap REST API.
//!
//! These are immutable snapshots fetched per request. Field names follow the
//! API's `snake_case` JSON; aliases cover the older spellings the API still
//! emits on some endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    BookCondition, BookId, BookImageId, CategoryId, OrderId, OrderStatus, Price, ReviewId, UserId,
};

/// A marketplace user (buyer or seller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, alias = "username", alias = "full_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name to show in the UI, falling back to the email's local part.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.email.split('@').next().unwrap_or("Reader")
        } else {
            &self.name
        }
    }
}

/// A book category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// One image attached to a listing.
///
/// The API sends either objects (`{"id": 3, "image": "books/a.jpg",
/// "is_primary": true}`) or bare reference strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBookImage")]
pub struct BookImage {
    pub id: Option<BookImageId>,
    /// Image reference as stored by the backend: absolute URL, relative path,
    /// or bare filename.
    pub image: String,
    pub is_primary: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBookImage {
    Reference(String),
    Object {
        #[serde(default)]
        id: Option<BookImageId>,
        #[serde(alias = "url", alias = "image_url")]
        image: String,
        #[serde(default)]
        is_primary: bool,
    },
}

impl From<RawBookImage> for BookImage {
    fn from(raw: RawBookImage) -> Self {
        match raw {
            RawBookImage::Reference(image) => Self {
                id: None,
                image,
                is_primary: false,
            },
            RawBookImage::Object {
                id,
                image,
                is_primary,
            } => Self {
                id,
                image,
                is_primary,
            },
        }
    }
}

/// A book listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub isbn: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub condition: BookCondition,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub images: Vec<BookImage>,
    /// Single cover reference used by older listings.
    #[serde(default, alias = "image", alias = "cover")]
    pub cover_image: Option<String>,
    #[serde(default, alias = "seller", alias = "user")]
    pub owner: Option<User>,
    #[serde(default = "default_available", alias = "available")]
    pub is_available: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_available() -> bool {
    true
}

impl Book {
    /// Reference of the image to show first: the primary image, else the first
    /// image, else the legacy cover field.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .iter()
            .find(|img| img.is_primary)
            .or_else(|| self.images.first())
            .map(|img| img.image.as_str())
            .or(self.cover_image.as_deref())
    }

    /// Whether `user` listed this book.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner.as_ref().is_some_and(|owner| owner.id == user)
    }
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShippingAddress {
    #[serde(alias = "name")]
    pub full_name: String,
    #[serde(alias = "address_line1", alias = "address")]
    pub line1: String,
    #[serde(default, alias = "address_line2")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, alias = "province")]
    pub state: String,
    #[serde(alias = "zip", alias = "zip_code")]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Single-line summary, e.g. `Ada Lovelace, 1 Main St, Springfield`.
    #[must_use]
    pub fn summary(&self) -> String {
        [self.full_name.as_str(), self.line1.as_str(), self.city.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An order as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub book: Option<Book>,
    #[serde(default)]
    pub book_id: Option<BookId>,
    #[serde(default, alias = "user")]
    pub buyer: Option<User>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(alias = "total_price", alias = "amount")]
    pub total: Price,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A review left on a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    #[serde(default, alias = "book")]
    pub book_id: Option<BookId>,
    #[serde(default, alias = "user")]
    pub reviewer: Option<User>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of a listing endpoint.
///
/// Accepts the paginated envelope (`results`/`data`/`items` with
/// `count`/`total`) as well as a bare JSON array.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Number of pages implied by `total` and `per_page` (at least 1).
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    /// Whether there is a page after this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
enum RawPage<T> {
    Envelope {
        #[serde(alias = "results", alias = "data")]
        items: Vec<T>,
        #[serde(default, alias = "count")]
        total: Option<u64>,
        #[serde(default, alias = "current_page")]
        page: Option<u32>,
        #[serde(default, alias = "page_size", alias = "limit")]
        per_page: Option<u32>,
    },
    List(Vec<T>),
}

impl<'de, T> Deserialize<'de> for Page<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawPage::<T>::deserialize(deserializer)? {
            RawPage::Envelope {
                items,
                total,
                page,
                per_page,
            } => {
                let count = items.len() as u64;
                let per_page = per_page.unwrap_or_else(|| u32::try_from(count).unwrap_or(u32::MAX));
                Self {
                    total: total.unwrap_or(count),
                    page: page.unwrap_or(1),
                    per_page,
                    items,
                }
            }
            RawPage::List(items) => {
                let count = items.len() as u64;
                Self {
                    total: count,
                    page: 1,
                    per_page: u32::try_from(count).unwrap_or(u32::MAX),
                    items,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_book_accepts_string_and_object_images() {
        let book: Book = serde_json::from_value(serde_json::json!({
            "id": 1,
            "title": "Dune",
            "author": "Frank Herbert",
            "price": 9.5,
            "condition": "like_new",
            "images": [
                "books/dune-back.jpg",
                {"id": 4, "image": "books/dune.jpg", "is_primary": true}
            ]
        }))
        .unwrap();

        assert_eq!(book.images.len(), 2);
        assert_eq!(book.primary_image(), Some("books/dune.jpg"));
        assert_eq!(book.condition, BookCondition::LikeNew);
        assert!(book.is_available);
    }

    #[test]
    fn test_book_falls_back_to_legacy_cover() {
        let book: Book = serde_json::from_value(serde_json::json!({
            "id": 2,
            "title": "Emma",
            "price": "3.00",
            "image": "emma.png"
        }))
        .unwrap();
        assert_eq!(book.primary_image(), Some("emma.png"));
    }

    #[test]
    fn test_order_accepts_total_price_alias() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": 10,
            "total_price": "14.00",
            "status": "paid"
        }))
        .unwrap();
        assert_eq!(order.total.display(), "$14.00");
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_page_from_envelope() {
        let page: Page<Category> = serde_json::from_value(serde_json::json!({
            "count": 45,
            "results": [{"id": 1, "name": "Fiction"}],
            "page": 2,
            "page_size": 20
        }))
        .unwrap();
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_page_from_bare_list() {
        let page: Page<Category> =
            serde_json::from_str(r#"[{"id": 1, "name": "Fiction"}, {"id": 2, "name": "Poetry"}]"#)
                .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages(), 1);
        assert!(!page.has_next());
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let user: User =
            serde_json::from_str(r#"{"id": 3, "email": "ada@bookswap.example"}"#).unwrap();
        assert_eq!(user.display_name(), "ada");
    }
}
