//! Book listing, detail and seller route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use bookswap_core::{Book, BookCondition, BookId, Category, CategoryId};
use serde::Deserialize;
use tracing::instrument;

use crate::api::{ApiError, BookQuery, ErrorKind};
use crate::error::{AppError, Result};
use crate::filters;
use crate::forms::{FieldErrors, ListingForm, ReviewForm, merge_api_errors};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::routes::views::{BookCard, Pagination, ReviewView};
use crate::services::images::ImageView;
use crate::state::AppState;

// =============================================================================
// View Types
// =============================================================================

/// A selectable `<option>`.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

fn condition_options(selected: &str) -> Vec<SelectOption> {
    BookCondition::SELECTABLE
        .iter()
        .map(|c| SelectOption {
            value: c.as_str().to_string(),
            label: c.label().to_string(),
            selected: c.as_str() == selected,
        })
        .collect()
}

fn category_options(categories: &[Category], selected: &str) -> Vec<SelectOption> {
    categories
        .iter()
        .map(|c| {
            let value = c.id.to_string();
            SelectOption {
                selected: value == selected.trim(),
                value,
                label: c.name.clone(),
            }
        })
        .collect()
}

/// Everything the detail page shows about one book.
#[derive(Debug, Clone)]
pub struct BookDetail {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub isbn: Option<String>,
    pub price: String,
    pub condition: &'static str,
    pub category: Option<String>,
    pub seller: Option<String>,
    pub is_available: bool,
    /// Gallery; the first entry is the primary image.
    pub images: Vec<ImageView>,
}

impl BookDetail {
    fn new(book: &Book, state: &AppState) -> Self {
        let images = state.images();
        let mut gallery: Vec<ImageView> = Vec::with_capacity(book.images.len().max(1));
        gallery.push(images.view(book.primary_image(), &book.title));
        gallery.extend(
            book.images
                .iter()
                .filter(|img| Some(img.image.as_str()) != book.primary_image())
                .map(|img| images.view(Some(&img.image), &book.title)),
        );

        Self {
            id: book.id.to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            isbn: book.isbn.clone(),
            price: book.price.display(),
            condition: book.condition.label(),
            category: book.category.as_ref().map(|c| c.name.clone()),
            seller: book.owner.as_ref().map(|u| u.display_name().to_string()),
            is_available: book.is_available,
            images: gallery,
        }
    }
}

fn average_rating(reviews: &[ReviewView]) -> Option<String> {
    if reviews.is_empty() {
        return None;
    }
    let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    #[allow(clippy::cast_precision_loss)]
    let average = f64::from(sum) / reviews.len() as f64;
    Some(format!("{average:.1}"))
}

// =============================================================================
// Templates
// =============================================================================

/// Book list page template.
#[derive(Template, WebTemplate)]
#[template(path = "books/index.html")]
pub struct BooksIndexTemplate {
    pub current_user: Option<CurrentUser>,
    pub books: Vec<BookCard>,
    pub categories: Vec<SelectOption>,
    pub search: String,
    pub total: u64,
    pub pagination: Pagination,
}

/// Book detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "books/show.html")]
pub struct BookShowTemplate {
    pub current_user: Option<CurrentUser>,
    pub book: BookDetail,
    pub reviews: Vec<ReviewView>,
    pub average_rating: Option<String>,
    /// The visitor listed this book.
    pub is_owner: bool,
    /// The visitor may start checkout.
    pub can_buy: bool,
    pub review: ReviewForm,
    pub errors: FieldErrors,
    /// Absolute cover URL for link previews.
    pub og_image: Option<String>,
}

/// Listing create/edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "books/form.html")]
pub struct ListingFormTemplate {
    pub current_user: Option<CurrentUser>,
    pub heading: &'static str,
    /// Form `action`.
    pub action: String,
    pub form: ListingForm,
    pub errors: FieldErrors,
    pub conditions: Vec<SelectOption>,
    pub categories: Vec<SelectOption>,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for the book list.
#[derive(Debug, Default, Deserialize)]
pub struct BooksQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

impl BooksQuery {
    fn to_api(&self) -> BookQuery {
        BookQuery {
            search: self.q.clone(),
            category: self
                .category
                .as_deref()
                .and_then(|c| c.parse::<CategoryId>().ok()),
            owner: None,
            page: self.page.unwrap_or(1).max(1),
        }
    }

    /// Base URL for page links, keeping the other filters.
    fn page_base(&self) -> String {
        let mut base = String::from("/books?");
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            base.push_str(&format!("q={}&", urlencoding::encode(q)));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            base.push_str(&format!("category={}&", urlencoding::encode(category)));
        }
        base
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the book list with search, category filter and paging.
#[instrument(skip(state, current_user))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(current_user): OptionalAuth,
    Query(query): Query<BooksQuery>,
) -> Result<Response> {
    let api_query = query.to_api();
    let token = current_user.as_ref().map(CurrentUser::token);

    let (page, categories) = tokio::join!(
        state.api().list_books(&api_query, token.as_ref()),
        state.api().list_categories(),
    );
    let page = page?;
    let categories = categories.unwrap_or_else(|e| {
        tracing::warn!("Failed to fetch categories: {e}");
        Vec::new()
    });

    Ok(BooksIndexTemplate {
        current_user,
        books: BookCard::list(&page.items, state.images()),
        categories: category_options(&categories, query.category.as_deref().unwrap_or_default()),
        search: query.q.clone().unwrap_or_default(),
        total: page.total,
        pagination: Pagination::new(page.page, page.total_pages(), &query.page_base()),
    }
    .into_response())
}

/// Display one book with its reviews.
#[instrument(skip(state, current_user))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(current_user): OptionalAuth,
    Path(id): Path<BookId>,
) -> Result<Response> {
    render_show(
        &state,
        current_user,
        id,
        ReviewForm::default(),
        FieldErrors::new(),
        StatusCode::OK,
    )
    .await
}

async fn render_show(
    state: &AppState,
    current_user: Option<CurrentUser>,
    id: BookId,
    review: ReviewForm,
    errors: FieldErrors,
    status: StatusCode,
) -> Result<Response> {
    let token = current_user.as_ref().map(CurrentUser::token);
    let (book, reviews) = tokio::join!(
        state.api().get_book(id, token.as_ref()),
        state.api().list_reviews(id),
    );
    let book = book.map_err(|e| not_found_or(e, "Book not found"))?;
    let reviews: Vec<ReviewView> = reviews
        .unwrap_or_else(|e| {
            tracing::warn!(book_id = %id, "Failed to fetch reviews: {e}");
            Vec::new()
        })
        .iter()
        .map(ReviewView::from)
        .collect();

    let is_owner = current_user
        .as_ref()
        .is_some_and(|user| book.is_owned_by(user.id));

    let detail = BookDetail::new(&book, state);
    let og_image = detail
        .images
        .first()
        .and_then(|image| image.resolve_url.as_deref())
        .map(|path| format!("{}{path}", state.config().base_url.trim_end_matches('/')));

    Ok((
        status,
        BookShowTemplate {
            can_buy: book.is_available && !is_owner,
            is_owner,
            book: detail,
            og_image,
            average_rating: average_rating(&reviews),
            reviews,
            review,
            errors,
            current_user,
        },
    )
        .into_response())
}

/// Display the form for a new listing.
#[instrument(skip(state, user))]
pub async fn new_page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Response> {
    let form = ListingForm::default();
    Ok(render_form(&state, user, None, form, FieldErrors::new(), StatusCode::OK).await)
}

/// Create a listing from the multipart form.
#[instrument(skip(state, user, multipart))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Result<Response> {
    let form = ListingForm::from_multipart(multipart).await?;
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok(render_form(&state, user, None, form, errors, StatusCode::UNPROCESSABLE_ENTITY).await);
        }
    };

    match state.api().create_book(input, &user.token()).await {
        Ok(book) => {
            tracing::info!(book_id = %book.id, "Listing created");
            Ok(Redirect::to(&format!("/books/{}", book.id)).into_response())
        }
        Err(e) if is_form_error(&e) => {
            let mut errors = FieldErrors::new();
            merge_api_errors(&mut errors, &e, ListingForm::FIELDS);
            Ok(render_form(&state, user, None, form, errors, StatusCode::UNPROCESSABLE_ENTITY).await)
        }
        Err(e) => Err(e.into()),
    }
}

/// Display the edit form for one of the visitor's listings.
#[instrument(skip(state, user))]
pub async fn edit_page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<BookId>,
) -> Result<Response> {
    let book = owned_book(&state, &user, id).await?;
    let form = ListingForm::from_book(&book);
    Ok(render_form(&state, user, Some(id), form, FieldErrors::new(), StatusCode::OK).await)
}

/// Update one of the visitor's listings.
#[instrument(skip(state, user, multipart))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<BookId>,
    multipart: Multipart,
) -> Result<Response> {
    owned_book(&state, &user, id).await?;

    let form = ListingForm::from_multipart(multipart).await?;
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok(render_form(&state, user, Some(id), form, errors, StatusCode::UNPROCESSABLE_ENTITY).await);
        }
    };

    match state.api().update_book(id, input, &user.token()).await {
        Ok(book) => {
            tracing::info!(book_id = %book.id, "Listing updated");
            Ok(Redirect::to(&format!("/books/{}", book.id)).into_response())
        }
        Err(e) if is_form_error(&e) => {
            let mut errors = FieldErrors::new();
            merge_api_errors(&mut errors, &e, ListingForm::FIELDS);
            Ok(render_form(&state, user, Some(id), form, errors, StatusCode::UNPROCESSABLE_ENTITY).await)
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete one of the visitor's listings.
#[instrument(skip(state, user))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<BookId>,
) -> Result<Response> {
    owned_book(&state, &user, id).await?;
    state.api().delete_book(id, &user.token()).await?;
    tracing::info!(book_id = %id, "Listing deleted");
    Ok(Redirect::to("/account").into_response())
}

/// Post a review; invalid input re-renders the detail page with messages.
#[instrument(skip(state, user, form))]
pub async fn create_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<BookId>,
    Form(form): Form<ReviewForm>,
) -> Result<Response> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return render_show(&state, Some(user), id, form, errors, StatusCode::UNPROCESSABLE_ENTITY)
                .await;
        }
    };

    match state.api().create_review(id, &input, &user.token()).await {
        Ok(_) => Ok(Redirect::to(&format!("/books/{id}#reviews")).into_response()),
        Err(e) if is_form_error(&e) => {
            let mut errors = FieldErrors::new();
            merge_api_errors(&mut errors, &e, ReviewForm::FIELDS);
            render_show(&state, Some(user), id, form, errors, StatusCode::UNPROCESSABLE_ENTITY).await
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn render_form(
    state: &AppState,
    user: CurrentUser,
    editing: Option<BookId>,
    form: ListingForm,
    errors: FieldErrors,
    status: StatusCode,
) -> Response {
    let categories = state.api().list_categories().await.unwrap_or_else(|e| {
        tracing::warn!("Failed to fetch categories: {e}");
        Vec::new()
    });

    let (heading, action) = match editing {
        Some(id) => ("Edit listing", format!("/books/{id}")),
        None => ("List a book", "/books".to_string()),
    };

    (
        status,
        ListingFormTemplate {
            current_user: Some(user),
            heading,
            action,
            conditions: condition_options(&form.condition),
            categories: category_options(&categories, &form.category_id),
            form,
            errors,
        },
    )
        .into_response()
}

/// Fetch a book the visitor owns, or fail with 404/403.
async fn owned_book(state: &AppState, user: &CurrentUser, id: BookId) -> Result<Book> {
    let book = state
        .api()
        .get_book(id, Some(&user.token()))
        .await
        .map_err(|e| not_found_or(e, "Book not found"))?;
    if !book.is_owned_by(user.id) {
        return Err(AppError::Forbidden(
            "You can only change your own listings".to_string(),
        ));
    }
    Ok(book)
}

/// Errors the visitor can fix by editing the form.
fn is_form_error(err: &ApiError) -> bool {
    match err.kind() {
        ErrorKind::Validation => true,
        ErrorKind::Other => err.status.is_some_and(|s| s == 400),
        _ => false,
    }
}

fn not_found_or(err: ApiError, message: &str) -> AppError {
    if err.is_not_found() {
        AppError::NotFound(message.to_string())
    } else {
        err.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_maps_to_api_filters() {
        let query = BooksQuery {
            q: Some("dune".to_string()),
            category: Some("3".to_string()),
            page: Some(0),
        };
        let api = query.to_api();
        assert_eq!(api.search.as_deref(), Some("dune"));
        assert_eq!(api.category, Some(CategoryId::new(3)));
        assert_eq!(api.page, 1);
    }

    #[test]
    fn test_bad_category_is_ignored() {
        let query = BooksQuery {
            category: Some("fiction".to_string()),
            ..BooksQuery::default()
        };
        assert_eq!(query.to_api().category, None);
    }

    #[test]
    fn test_page_base_keeps_filters() {
        let query = BooksQuery {
            q: Some("le guin".to_string()),
            category: Some("2".to_string()),
            page: Some(4),
        };
        assert_eq!(query.page_base(), "/books?q=le%20guin&category=2&");
        assert_eq!(BooksQuery::default().page_base(), "/books?");
    }

    #[test]
    fn test_condition_options_mark_selection() {
        let options = condition_options("like_new");
        assert_eq!(options.len(), BookCondition::SELECTABLE.len());
        let selected: Vec<_> = options.iter().filter(|o| o.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value, "like_new");
    }

    #[test]
    fn test_average_rating() {
        let review = |rating| ReviewView {
            reviewer: "A reader".to_string(),
            rating,
            comment: String::new(),
            date: String::new(),
        };
        assert_eq!(average_rating(&[]), None);
        assert_eq!(
            average_rating(&[review(4), review(5)]).as_deref(),
            Some("4.5")
        );
    }

    #[test]
    fn test_form_errors_are_validation_and_bad_request() {
        let err = |status| ApiError {
            message: String::new(),
            errors: None,
            status: Some(status),
            local: false,
        };
        assert!(is_form_error(&err(422)));
        assert!(is_form_error(&err(400)));
        assert!(!is_form_error(&err(401)));
        assert!(!is_form_error(&err(500)));
    }
}
