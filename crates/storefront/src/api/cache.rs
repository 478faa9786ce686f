//! Cache types for BookSwap API responses.

use bookswap_core::{Book, Category, Page, Review};

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Books(Page<Book>),
    Book(Box<Book>),
    Categories(Vec<Category>),
    Reviews(Vec<Review>),
}
