//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use bookswap_core::Category;
use tracing::instrument;

use crate::api::BookQuery;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::routes::views::BookCard;
use crate::state::AppState;

/// Number of recent books on the home page.
const RECENT_BOOKS: usize = 8;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub current_user: Option<CurrentUser>,
    /// Newest listings.
    pub books: Vec<BookCard>,
    /// Categories for the browse strip.
    pub categories: Vec<Category>,
    /// Shown when the book service could not be reached.
    pub notice: Option<String>,
}

/// Display the home page.
///
/// The page still renders when the API is down; the grid is replaced by a
/// notice.
#[instrument(skip(state, current_user))]
pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(current_user): OptionalAuth,
) -> impl IntoResponse {
    let token = current_user.as_ref().map(CurrentUser::token);
    let query = BookQuery::default();
    let (books, categories) = tokio::join!(
        state.api().list_books(&query, token.as_ref()),
        state.api().list_categories(),
    );

    let mut notice = None;
    let books = match books {
        Ok(page) => {
            let mut cards = BookCard::list(&page.items, state.images());
            cards.truncate(RECENT_BOOKS);
            cards
        }
        Err(e) => {
            tracing::error!("Failed to fetch recent books: {e}");
            notice = Some(e.user_message());
            Vec::new()
        }
    };

    let categories = categories.unwrap_or_else(|e| {
        tracing::warn!("Failed to fetch categories: {e}");
        Vec::new()
    });

    HomeTemplate {
        current_user,
        books,
        categories,
        notice,
    }
}
