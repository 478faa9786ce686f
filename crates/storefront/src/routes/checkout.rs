//! Checkout route handlers.
//!
//! The page collects the shipping address and hands card entry to Stripe.js.
//! The script talks to the JSON endpoints here: `intent` creates the payment
//! intent through the API, `confirm` records the paid order and keeps a local
//! snapshot of it for the order history.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bookswap_core::{BookId, Order, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::{
    ApiClient, ApiError, ApiToken, ConfirmPaymentRequest, CreateIntentRequest, ErrorKind,
};
use crate::error::{AppError, Result};
use crate::filters;
use crate::forms::{FieldErrors, ShippingForm, merge_api_errors};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::routes::views::{BookCard, OrderRow};
use crate::services::local_orders::{LocalOrder, LocalOrders, OrderStorage};
use crate::state::AppState;

// =============================================================================
// Templates
// =============================================================================

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub current_user: Option<CurrentUser>,
    pub book: BookCard,
    pub shipping: ShippingForm,
    /// Stripe publishable key; card entry is disabled without one.
    pub publishable_key: Option<String>,
}

/// Order confirmation page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct SuccessTemplate {
    pub current_user: Option<CurrentUser>,
    pub order: Option<OrderRow>,
}

// =============================================================================
// JSON Types
// =============================================================================

/// Response of `POST /checkout/{book_id}/intent`.
#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Amount to display, e.g. `$12.50`.
    pub amount: String,
}

/// Body of `POST /checkout/{book_id}/confirm`.
#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub payment_intent_id: String,
    pub shipping: ShippingForm,
}

/// Response of `POST /checkout/{book_id}/confirm`.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub order_id: OrderId,
    /// Page the script should navigate to.
    pub redirect: String,
}

/// Error body of the JSON endpoints, in the same shape as API errors.
#[derive(Debug, Serialize)]
struct JsonErrorBody {
    message: String,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    errors: FieldErrors,
    status: u16,
}

/// Failure of a checkout JSON endpoint.
#[derive(Debug)]
pub enum CheckoutError {
    /// Shipping address (or API validation) problems, keyed by field.
    Invalid(FieldErrors),
    /// Anything else.
    App(AppError),
}

impl From<AppError> for CheckoutError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<ApiError> for CheckoutError {
    fn from(err: ApiError) -> Self {
        match err.kind() {
            ErrorKind::Validation => {
                let mut errors = FieldErrors::new();
                merge_api_errors(&mut errors, &err, ShippingForm::FIELDS);
                Self::Invalid(errors)
            }
            _ => Self::App(AppError::Api(err)),
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(JsonErrorBody {
                    message: ErrorKind::Validation.default_message().to_string(),
                    errors,
                    status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                }),
            )
                .into_response(),
            Self::App(err) => {
                // Expired tokens are answered by the session expiry middleware
                if matches!(&err, AppError::Api(api) if api.is_unauthorized()) {
                    return err.into_response();
                }
                err.report();
                let status = err.status();
                (
                    status,
                    Json(JsonErrorBody {
                        message: err.user_message(),
                        errors: FieldErrors::new(),
                        status: status.as_u16(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the checkout page for one book.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(book_id): Path<BookId>,
) -> Result<Response> {
    let book = state
        .api()
        .get_book(book_id, Some(&user.token()))
        .await
        .map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound("Book not found".to_string())
            } else {
                e.into()
            }
        })?;

    if book.is_owned_by(user.id) {
        return Err(AppError::BadRequest(
            "You cannot buy your own listing".to_string(),
        ));
    }
    if !book.is_available {
        return Err(AppError::BadRequest(
            "This book has already been sold".to_string(),
        ));
    }

    let shipping = ShippingForm {
        full_name: user.name.clone(),
        ..ShippingForm::default()
    };

    Ok(CheckoutTemplate {
        book: BookCard::new(&book, state.images()),
        shipping,
        publishable_key: state.config().stripe.publishable_key.clone(),
        current_user: Some(user),
    }
    .into_response())
}

/// Create a payment intent for the book and the posted shipping address.
#[instrument(skip(state, user, shipping))]
pub async fn create_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(book_id): Path<BookId>,
    Json(shipping): Json<ShippingForm>,
) -> std::result::Result<Json<IntentResponse>, CheckoutError> {
    let address = shipping.validate().map_err(CheckoutError::Invalid)?;

    let intent = state
        .api()
        .create_payment_intent(
            &CreateIntentRequest {
                book_id,
                shipping_address: &address,
            },
            &user.token(),
        )
        .await?;

    tracing::info!(%book_id, "Payment intent created");

    let amount = match intent.amount {
        Some(amount) => amount.display(),
        None => state
            .api()
            .get_book(book_id, Some(&user.token()))
            .await
            .map(|book| book.price.display())
            .unwrap_or_default(),
    };

    Ok(Json(IntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.payment_intent_id,
        amount,
    }))
}

/// Record a paid order and keep a local snapshot of it.
#[instrument(skip(state, user, local_orders, body))]
pub async fn confirm(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    local_orders: LocalOrders<tower_sessions::Session>,
    Path(book_id): Path<BookId>,
    Json(body): Json<ConfirmBody>,
) -> std::result::Result<Json<ConfirmResponse>, CheckoutError> {
    let address = body.shipping.validate().map_err(CheckoutError::Invalid)?;
    if body.payment_intent_id.trim().is_empty() {
        return Err(AppError::BadRequest("Missing payment reference".to_string()).into());
    }

    let order = record_order(
        state.api(),
        &local_orders,
        &ConfirmPaymentRequest {
            payment_intent_id: body.payment_intent_id.trim(),
            book_id,
            shipping_address: &address,
        },
        &user.token(),
    )
    .await?;

    Ok(Json(ConfirmResponse {
        order_id: order.id,
        redirect: format!("/checkout/success?order={}", order.id),
    }))
}

/// Confirm a payment with the API and keep a local snapshot of the order.
///
/// Once the API has recorded the order nothing else may fail the request:
/// the book is looked up only if the confirmation leaves it out, and a failed
/// lookup leaves the snapshot without title and cover.
async fn record_order<S>(
    api: &ApiClient,
    local_orders: &LocalOrders<S>,
    request: &ConfirmPaymentRequest<'_>,
    token: &ApiToken,
) -> std::result::Result<Order, ApiError>
where
    S: OrderStorage + Sync,
{
    let order = api.confirm_payment(request, token).await?;

    tracing::info!(order_id = %order.id, book_id = %request.book_id, "Order confirmed");
    crate::error::add_breadcrumb("checkout", "Order confirmed", None);

    let book = if order.book.is_some() {
        None
    } else {
        match api.get_book(request.book_id, Some(token)).await {
            Ok(book) => Some(book),
            Err(e) => {
                tracing::warn!(order_id = %order.id, "Book unavailable for order snapshot: {e}");
                None
            }
        }
    };

    let mut snapshot = LocalOrder::from_order(&order, book.as_ref());
    snapshot.book_id.get_or_insert(request.book_id);
    if !local_orders.save(snapshot).await {
        tracing::warn!(order_id = %order.id, "Could not keep local order snapshot");
    }
    Ok(order)
}

/// Query parameters for the confirmation page.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub order: Option<OrderId>,
}

/// Display the order confirmation.
///
/// The API's view of the order refreshes the local snapshot's status; when
/// the API cannot answer yet the snapshot is shown instead.
#[instrument(skip(state, user, local_orders))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    local_orders: LocalOrders<tower_sessions::Session>,
    Query(query): Query<SuccessQuery>,
) -> Result<Response> {
    let Some(order_id) = query.order else {
        return Ok(SuccessTemplate {
            current_user: Some(user),
            order: None,
        }
        .into_response());
    };

    let order = match state.api().get_order(order_id, &user.token()).await {
        Ok(order) => {
            if order.status != OrderStatus::Unknown {
                local_orders.update_status(order.id, order.status).await;
            }
            Some(OrderRow::from_order(&order, state.images()))
        }
        Err(e) if e.is_unauthorized() => return Err(e.into()),
        Err(e) => {
            tracing::warn!(%order_id, "Order not available from the API yet: {e}");
            local_orders
                .get(order_id)
                .await
                .map(|snapshot| OrderRow::from_local(&snapshot, state.images()))
        }
    };

    Ok(SuccessTemplate {
        current_user: Some(user),
        order,
    }
    .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        Router,
        body::to_bytes,
        routing::{get, post},
    };
    use serde_json::json;

    use super::*;
    use crate::config::ApiConfig;

    /// Snapshot storage kept in memory.
    #[derive(Default)]
    struct MemorySlot(Mutex<Option<String>>);

    impl OrderStorage for MemorySlot {
        async fn read_raw(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }

        async fn write_raw(&self, raw: String) -> bool {
            *self.0.lock().unwrap() = Some(raw);
            true
        }

        async fn remove(&self) -> bool {
            *self.0.lock().unwrap() = None;
            true
        }
    }

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    /// API whose book lookups always fail; `confirm` answers with the given
    /// status and order.
    async fn spawn_payments_api(confirm: StatusCode, order: serde_json::Value) -> (ApiClient, CallLog) {
        let calls = CallLog::default();
        let confirm_calls = Arc::clone(&calls);
        let book_calls = Arc::clone(&calls);
        let app = Router::new()
            .route(
                "/api/payments/confirm",
                post(move || {
                    confirm_calls.lock().unwrap().push("confirm");
                    let order = order.clone();
                    async move { (confirm, Json(order)) }
                }),
            )
            .route(
                "/api/books/{id}",
                get(move || {
                    book_calls.lock().unwrap().push("book");
                    async { (StatusCode::SERVICE_UNAVAILABLE, "down") }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = ApiClient::new(&ApiConfig {
            base_url: url::Url::parse(&format!("http://{addr}/api/")).unwrap(),
            timeout: Duration::from_secs(5),
            proxy_upstream: url::Url::parse(&format!("http://{addr}/")).unwrap(),
        })
        .unwrap();
        (api, calls)
    }

    fn address() -> bookswap_core::ShippingAddress {
        serde_json::from_value(json!({
            "full_name": "Ada Reader",
            "line1": "1 Library Lane",
            "city": "Leeds",
            "postal_code": "LS1 1AA",
            "country": "GB"
        }))
        .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_shipping_is_json_422() {
        let errors = ShippingForm::default().validate().unwrap_err();
        let response = CheckoutError::Invalid(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["status"], 422);
        assert_eq!(body["errors"]["city"], "City is required");
    }

    #[tokio::test]
    async fn test_api_errors_are_json() {
        let err = ApiError {
            message: "Book is no longer available".to_string(),
            errors: None,
            status: Some(409),
            local: false,
        };
        let response = CheckoutError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["message"], "Book is no longer available");
        assert!(body.get("errors").is_none());
    }

    #[test]
    fn test_api_validation_maps_to_fields() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("postal_code".to_string(), vec!["Unknown postcode".to_string()]);
        let err = ApiError {
            message: "Invalid".to_string(),
            errors: Some(fields),
            status: Some(422),
            local: false,
        };
        match CheckoutError::from(err) {
            CheckoutError::Invalid(errors) => {
                assert_eq!(errors.get("postal_code").unwrap(), "Unknown postcode");
            }
            CheckoutError::App(_) => panic!("expected field errors"),
        }
    }

    #[tokio::test]
    async fn test_paid_order_is_kept_when_book_lookup_fails() {
        let (api, calls) = spawn_payments_api(
            StatusCode::OK,
            json!({"order": {"id": 41, "total": "9.50", "status": "paid"}}),
        )
        .await;
        let local_orders = LocalOrders::new(MemorySlot::default());
        let shipping = address();

        let order = record_order(
            &api,
            &local_orders,
            &ConfirmPaymentRequest {
                payment_intent_id: "pi_41",
                book_id: BookId::new(2),
                shipping_address: &shipping,
            },
            &ApiToken::new("token"),
        )
        .await
        .unwrap();

        assert_eq!(order.id, OrderId::new(41));
        assert_eq!(*calls.lock().unwrap(), ["confirm", "book"]);
        let snapshot = local_orders.get(OrderId::new(41)).await.unwrap();
        assert_eq!(snapshot.book_id, Some(BookId::new(2)));
        assert_eq!(snapshot.book_title, "");
        assert_eq!(snapshot.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_confirmation_with_book_skips_lookup() {
        let (api, calls) = spawn_payments_api(
            StatusCode::OK,
            json!({"id": 42, "total": "6.00", "book": {"id": 3, "title": "Emma", "price": "6.00"}}),
        )
        .await;
        let local_orders = LocalOrders::new(MemorySlot::default());
        let shipping = address();

        record_order(
            &api,
            &local_orders,
            &ConfirmPaymentRequest {
                payment_intent_id: "pi_42",
                book_id: BookId::new(3),
                shipping_address: &shipping,
            },
            &ApiToken::new("token"),
        )
        .await
        .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["confirm"]);
        let snapshot = local_orders.get(OrderId::new(42)).await.unwrap();
        assert_eq!(snapshot.book_title, "Emma");
    }

    #[tokio::test]
    async fn test_declined_payment_records_nothing() {
        let (api, calls) = spawn_payments_api(
            StatusCode::PAYMENT_REQUIRED,
            json!({"detail": "Card declined"}),
        )
        .await;
        let local_orders = LocalOrders::new(MemorySlot::default());
        let shipping = address();

        let err = record_order(
            &api,
            &local_orders,
            &ConfirmPaymentRequest {
                payment_intent_id: "pi_43",
                book_id: BookId::new(2),
                shipping_address: &shipping,
            },
            &ApiToken::new("token"),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, Some(402));
        assert_eq!(*calls.lock().unwrap(), ["confirm"]);
        assert!(local_orders.list().await.is_empty());
    }

    #[test]
    fn test_expired_token_is_left_to_middleware() {
        let err = ApiError {
            message: "Token expired".to_string(),
            errors: None,
            status: Some(401),
            local: false,
        };
        let response = CheckoutError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(
            response
                .extensions()
                .get::<crate::error::SessionExpired>()
                .is_some()
        );
    }
}
