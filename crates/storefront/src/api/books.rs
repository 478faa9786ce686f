//! Book, category and review endpoints.

use bookswap_core::{
    Book, BookCondition, BookId, Category, CategoryId, Page, Price, Review, UserId,
};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{debug, instrument};

use super::cache::CacheValue;
use super::{ApiClient, ApiError, ApiToken};

/// Filters for `GET books`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<CategoryId>,
    pub owner: Option<UserId>,
    /// 1-based page number; `0` is treated as the first page.
    pub page: u32,
}

impl BookQuery {
    /// Free-text search on the first page.
    #[must_use]
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    /// Listings owned by `user`.
    #[must_use]
    pub fn owned_by(user: UserId) -> Self {
        Self {
            owner: Some(user),
            ..Self::default()
        }
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(owner) = self.owner {
            pairs.push(("owner", owner.to_string()));
        }
        if self.page > 1 {
            pairs.push(("page", self.page.to_string()));
        }
        pairs
    }

    fn cache_key(&self) -> String {
        let pairs = self.pairs();
        let parts: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("books:{}", parts.join("&"))
    }
}

/// One uploaded image file.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A validated listing, ready to send as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct ListingInput {
    pub title: String,
    pub author: String,
    pub description: String,
    pub isbn: Option<String>,
    pub price: Price,
    pub condition: BookCondition,
    pub category: Option<CategoryId>,
    pub images: Vec<ImageUpload>,
}

impl ListingInput {
    fn into_form(self) -> Result<Form, ApiError> {
        let mut form = Form::new()
            .text("title", self.title)
            .text("author", self.author)
            .text("description", self.description)
            .text("price", format!("{:.2}", self.price.amount))
            .text("condition", self.condition.as_str());
        if let Some(isbn) = self.isbn {
            form = form.text("isbn", isbn);
        }
        if let Some(category) = self.category {
            form = form.text("category_id", category.to_string());
        }
        for image in self.images {
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)
                .map_err(|e| ApiError::local(format!("invalid image type: {e}")))?;
            form = form.part("images", part);
        }
        Ok(form)
    }
}

/// Body of `POST books/{id}/reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewInput {
    pub rating: u8,
    pub comment: String,
}

impl ApiClient {
    // =========================================================================
    // Books
    // =========================================================================

    /// List books matching `query`.
    ///
    /// Anonymous queries are cached; owner-scoped listings are not.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error.
    #[instrument(skip(self, token))]
    pub async fn list_books(
        &self,
        query: &BookQuery,
        token: Option<&ApiToken>,
    ) -> Result<Page<Book>, ApiError> {
        let cacheable = token.is_none() && query.owner.is_none();
        let cache_key = query.cache_key();

        if cacheable && let Some(CacheValue::Books(page)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for books");
            return Ok(page);
        }

        let mut page: Page<Book> = self.get_json("books", &query.pairs(), token).await?;
        if page.page == 1 && query.page > 1 {
            page.page = query.page;
        }

        if cacheable {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Books(page.clone()))
                .await;
        }

        Ok(page)
    }

    /// Fetch one book.
    ///
    /// # Errors
    ///
    /// Returns a 404 error if the book does not exist.
    #[instrument(skip(self, token), fields(book_id = %id))]
    pub async fn get_book(&self, id: BookId, token: Option<&ApiToken>) -> Result<Book, ApiError> {
        let cache_key = format!("book:{id}");

        if let Some(CacheValue::Book(book)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for book");
            return Ok(*book);
        }

        let book: Book = self.get_json(&format!("books/{id}"), &[], token).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Book(Box::new(book.clone())))
            .await;

        Ok(book)
    }

    /// Create a listing owned by the token's user.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error; validation failures carry `errors`.
    #[instrument(skip(self, input, token), fields(title = %input.title))]
    pub async fn create_book(&self, input: ListingInput, token: &ApiToken) -> Result<Book, ApiError> {
        let form = input.into_form()?;
        let builder = self
            .request(Method::POST, "books", &[], Some(token))?
            .multipart(form);
        let book = self.send(builder).await?;
        self.invalidate_cache();
        Ok(book)
    }

    /// Update a listing.
    ///
    /// # Errors
    ///
    /// Returns a 403 error if the token's user does not own the listing.
    #[instrument(skip(self, input, token), fields(book_id = %id))]
    pub async fn update_book(
        &self,
        id: BookId,
        input: ListingInput,
        token: &ApiToken,
    ) -> Result<Book, ApiError> {
        let form = input.into_form()?;
        let builder = self
            .request(Method::PATCH, &format!("books/{id}"), &[], Some(token))?
            .multipart(form);
        let book = self.send(builder).await?;
        self.invalidate_cache();
        Ok(book)
    }

    /// Delete a listing.
    ///
    /// # Errors
    ///
    /// Returns a 403 error if the token's user does not own the listing.
    #[instrument(skip(self, token), fields(book_id = %id))]
    pub async fn delete_book(&self, id: BookId, token: &ApiToken) -> Result<(), ApiError> {
        let builder = self.request(Method::DELETE, &format!("books/{id}"), &[], Some(token))?;
        self.send_empty(builder).await?;
        self.invalidate_cache();
        Ok(())
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// All categories.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let cache_key = "categories".to_string();

        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let page: Page<Category> = self.get_json("categories", &[], None).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(page.items.clone()))
            .await;

        Ok(page.items)
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Reviews left on a book, newest first as the API orders them.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn list_reviews(&self, id: BookId) -> Result<Vec<Review>, ApiError> {
        let cache_key = format!("reviews:{id}");

        if let Some(CacheValue::Reviews(reviews)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for reviews");
            return Ok(reviews);
        }

        let page: Page<Review> = self
            .get_json(&format!("books/{id}/reviews"), &[], None)
            .await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Reviews(page.items.clone()))
            .await;

        Ok(page.items)
    }

    /// Leave a review.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error (e.g. 400 when already reviewed).
    #[instrument(skip(self, input, token), fields(book_id = %id))]
    pub async fn create_review(
        &self,
        id: BookId,
        input: &ReviewInput,
        token: &ApiToken,
    ) -> Result<Review, ApiError> {
        let review = self
            .post_json(&format!("books/{id}/reviews"), input, Some(token))
            .await?;
        self.inner.cache.invalidate(&format!("reviews:{id}")).await;
        self.inner.cache.invalidate(&format!("book:{id}")).await;
        Ok(review)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_has_no_pairs() {
        assert!(BookQuery::default().pairs().is_empty());
        assert_eq!(BookQuery::default().cache_key(), "books:");
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let query = BookQuery::search("   ");
        assert!(query.pairs().is_empty());
    }

    #[test]
    fn test_query_pairs_in_stable_order() {
        let query = BookQuery {
            search: Some("dune".to_string()),
            category: Some(CategoryId::new(3)),
            owner: None,
            page: 2,
        };
        assert_eq!(query.cache_key(), "books:search=dune&category=3&page=2");
    }

    #[test]
    fn test_owner_scoped_query() {
        let query = BookQuery::owned_by(UserId::new(9));
        assert_eq!(query.pairs(), vec![("owner", "9".to_string())]);
    }

    #[test]
    fn test_listing_form_rejects_bad_mime() {
        let input = ListingInput {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            description: String::new(),
            isbn: None,
            price: Price::from_cents(950),
            condition: BookCondition::Good,
            category: None,
            images: vec![ImageUpload {
                file_name: "a.jpg".to_string(),
                content_type: "not a mime".to_string(),
                bytes: vec![1, 2, 3],
            }],
        };
        assert!(input.into_form().is_err());
    }
}
