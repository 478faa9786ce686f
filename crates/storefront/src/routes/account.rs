//! Account route handlers.
//!
//! All routes require authentication.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use bookswap_core::OrderId;
use tower_sessions::Session;
use tracing::instrument;

use crate::api::BookQuery;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::routes::views::{BookCard, OrderRow, format_date};
use crate::services::local_orders::{LocalOrders, reconcile};
use crate::state::AppState;

// =============================================================================
// Templates
// =============================================================================

/// Profile as shown on the account page.
#[derive(Debug, Clone)]
pub struct ProfileView {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub member_since: String,
}

/// Account overview template.
#[derive(Template, WebTemplate)]
#[template(path = "account/index.html")]
pub struct AccountIndexTemplate {
    pub current_user: Option<CurrentUser>,
    pub profile: ProfileView,
    /// The visitor's own listings.
    pub listings: Vec<BookCard>,
    pub listings_error: Option<String>,
}

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct OrdersTemplate {
    pub current_user: Option<CurrentUser>,
    pub orders: Vec<OrderRow>,
    /// Set when only local snapshots could be shown.
    pub notice: Option<String>,
    /// Some rows come from local snapshots only.
    pub has_local: bool,
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "account/order.html")]
pub struct OrderDetailTemplate {
    pub current_user: Option<CurrentUser>,
    pub order: OrderRow,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the account overview with the visitor's own listings.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Response> {
    let token = user.token();
    let query = BookQuery::owned_by(user.id);
    let (profile, listings) = tokio::join!(
        state.api().me(&token),
        state.api().list_books(&query, Some(&token)),
    );
    let profile = profile?;

    let (listings, listings_error) = match listings {
        Ok(page) => (BookCard::list(&page.items, state.images()), None),
        Err(e) if e.is_unauthorized() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Failed to fetch own listings: {e}");
            (Vec::new(), Some(e.user_message()))
        }
    };

    Ok(AccountIndexTemplate {
        profile: ProfileView {
            name: profile.display_name().to_string(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            member_since: format_date(profile.created_at),
        },
        listings,
        listings_error,
        current_user: Some(user),
    }
    .into_response())
}

/// Display the order history.
///
/// The API's list is authoritative. Local snapshots it does not know yet are
/// listed first as awaiting confirmation; snapshots it does know are dropped.
#[instrument(skip(state, user, local_orders))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    local_orders: LocalOrders<Session>,
) -> Result<Response> {
    let local = local_orders.list().await;

    let (orders, notice) = match state.api().list_my_orders(&user.token()).await {
        Ok(backend) => {
            let merged = reconcile(backend, local);
            if !merged.evict.is_empty() {
                tracing::debug!(count = merged.evict.len(), "Evicting confirmed local orders");
                local_orders.evict(&merged.evict).await;
            }
            let rows: Vec<OrderRow> = merged
                .entries
                .iter()
                .map(|entry| OrderRow::from_entry(entry, state.images()))
                .collect();
            (rows, None)
        }
        Err(e) if e.is_unauthorized() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Order history unavailable, showing local orders: {e}");
            let rows = local
                .iter()
                .map(|order| OrderRow::from_local(order, state.images()))
                .collect();
            (
                rows,
                Some(format!(
                    "{} Showing orders saved in this browser session only.",
                    e.user_message()
                )),
            )
        }
    };

    Ok(OrdersTemplate {
        has_local: orders.iter().any(|o: &OrderRow| o.awaiting_confirmation),
        orders,
        notice,
        current_user: Some(user),
    }
    .into_response())
}

/// Display one order, falling back to the local snapshot when the API
/// cannot answer.
#[instrument(skip(state, user, local_orders))]
pub async fn order_detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    local_orders: LocalOrders<Session>,
    Path(id): Path<OrderId>,
) -> Result<Response> {
    let order = match state.api().get_order(id, &user.token()).await {
        Ok(order) => OrderRow::from_order(&order, state.images()),
        Err(e) if e.is_unauthorized() => return Err(e.into()),
        Err(e) => match local_orders.get(id).await {
            Some(snapshot) => {
                tracing::info!(order_id = %id, "Showing local snapshot: {e}");
                OrderRow::from_local(&snapshot, state.images())
            }
            None if e.is_not_found() => {
                return Err(AppError::NotFound("Order not found".to_string()));
            }
            None => return Err(e.into()),
        },
    };

    Ok(OrderDetailTemplate {
        current_user: Some(user),
        order,
    }
    .into_response())
}

/// Forget every local order snapshot.
#[instrument(skip(_user, local_orders))]
pub async fn clear_local(
    RequireAuth(_user): RequireAuth,
    local_orders: LocalOrders<Session>,
) -> Response {
    if !local_orders.clear().await {
        tracing::warn!("Failed to clear local orders");
    }
    Redirect::to("/account/orders").into_response()
}
