//! Authentication route handlers.
//!
//! Handles login, registration and logout against the BookSwap API. The API
//! token lives in the session next to the user it belongs to.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::{ApiError, ErrorKind, LoginRequest, RegisterRequest};
use crate::error::{AppError, Result};
use crate::filters;
use crate::forms::{FORM, FieldErrors, LoginForm, RegisterForm, merge_api_errors};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::local_orders::LocalOrders;
use crate::state::AppState;

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters of the login page.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    pub next: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub current_user: Option<CurrentUser>,
    pub email: String,
    pub next: Option<String>,
    /// Banner above the form (e.g. expired session).
    pub notice: Option<String>,
    pub errors: FieldErrors,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub current_user: Option<CurrentUser>,
    pub name: String,
    pub email: String,
    pub errors: FieldErrors,
}

// =============================================================================
// Helpers
// =============================================================================

/// Accept only local paths as a post-login destination.
fn safe_next(next: Option<&str>) -> String {
    next.map(str::trim)
        .filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .filter(|n| !n.starts_with("/auth/"))
        .map_or_else(|| "/".to_string(), str::to_string)
}

fn notice_for(error: Option<&str>) -> Option<String> {
    match error? {
        "session_expired" => Some("Your session has expired. Please sign in again.".to_string()),
        _ => Some("Please sign in to continue.".to_string()),
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    OptionalAuth(current_user): OptionalAuth,
    Query(query): Query<LoginQuery>,
) -> Response {
    if current_user.is_some() {
        return Redirect::to(&safe_next(query.next.as_deref())).into_response();
    }

    LoginTemplate {
        current_user: None,
        email: String::new(),
        notice: notice_for(query.error.as_deref()),
        next: query.next,
        errors: FieldErrors::new(),
    }
    .into_response()
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let rerender = |errors: FieldErrors, status: StatusCode| {
        (
            status,
            LoginTemplate {
                current_user: None,
                email: form.email.clone(),
                next: form.next.clone(),
                notice: None,
                errors,
            },
        )
            .into_response()
    };

    let email = match form.validate() {
        Ok(email) => email,
        Err(errors) => return Ok(rerender(errors, StatusCode::UNPROCESSABLE_ENTITY)),
    };

    let auth = match state
        .api()
        .login(&LoginRequest {
            email: email.as_str(),
            password: &form.password,
        })
        .await
    {
        Ok(auth) => auth,
        Err(e) => {
            tracing::debug!(email = %email.masked(), "Login attempt failed");
            return login_failed(e, rerender);
        }
    };

    let user = CurrentUser::new(&auth.user, &auth.token);
    set_current_user(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Redirect::to(&safe_next(form.next.as_deref())).into_response())
}

fn login_failed(
    err: ApiError,
    rerender: impl FnOnce(FieldErrors, StatusCode) -> Response,
) -> Result<Response> {
    let mut errors = FieldErrors::new();
    match err.kind() {
        // Wrong credentials come back as 401 or 400 depending on the API version
        ErrorKind::Unauthorized | ErrorKind::Other => {
            tracing::info!("Login rejected: {err}");
            errors.insert(FORM, "Invalid email or password".to_string());
            Ok(rerender(errors, StatusCode::UNAUTHORIZED))
        }
        ErrorKind::Validation => {
            merge_api_errors(&mut errors, &err, &["email", "password"]);
            Ok(rerender(errors, StatusCode::UNPROCESSABLE_ENTITY))
        }
        _ => Err(AppError::Api(err)),
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(OptionalAuth(current_user): OptionalAuth) -> Response {
    if current_user.is_some() {
        return Redirect::to("/account").into_response();
    }

    RegisterTemplate {
        current_user: None,
        name: String::new(),
        email: String::new(),
        errors: FieldErrors::new(),
    }
    .into_response()
}

/// Handle registration form submission.
///
/// The API signs the new user in right away, so a successful registration
/// ends on the account page.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let rerender = |errors: FieldErrors| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            RegisterTemplate {
                current_user: None,
                name: form.name.clone(),
                email: form.email.clone(),
                errors,
            },
        )
            .into_response()
    };

    let email = match form.validate() {
        Ok(email) => email,
        Err(errors) => return Ok(rerender(errors)),
    };

    let auth = match state
        .api()
        .register(&RegisterRequest {
            name: form.name.trim(),
            email: email.as_str(),
            password: &form.password,
            password_confirmation: &form.password_confirmation,
        })
        .await
    {
        Ok(auth) => auth,
        Err(e) if matches!(e.kind(), ErrorKind::Validation | ErrorKind::Other) => {
            let mut errors = FieldErrors::new();
            merge_api_errors(&mut errors, &e, RegisterForm::FIELDS);
            return Ok(rerender(errors));
        }
        Err(e) => return Err(e.into()),
    };

    let user = CurrentUser::new(&auth.user, &auth.token);
    set_current_user(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(Redirect::to("/account").into_response())
}

// =============================================================================
// Logout Route
// =============================================================================

/// Handle logout.
///
/// Revokes the token (best effort), forgets the local order snapshots and
/// destroys the session.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(current_user): OptionalAuth,
) -> Response {
    if let Some(user) = current_user
        && let Err(e) = state.api().logout(&user.token()).await
    {
        tracing::warn!("Failed to revoke API token: {}", e);
    }

    let local_orders = LocalOrders::new(session.clone());
    local_orders.clear().await;

    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to clear session: {}", e);
    }

    // Also destroy the entire session
    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {}", e);
    }

    Redirect::to("/").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_local_paths() {
        assert_eq!(safe_next(Some("/books/4")), "/books/4");
        assert_eq!(safe_next(Some("/checkout/4?x=1")), "/checkout/4?x=1");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_safe_next_rejects_other_hosts() {
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(Some("/auth/logout")), "/");
    }

    #[test]
    fn test_notice_for_expired_session() {
        assert!(notice_for(Some("session_expired")).unwrap_or_default().contains("expired"));
        assert!(notice_for(None).is_none());
    }
}
