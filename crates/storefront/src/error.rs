//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! An API 401 is not rendered here: the response is marked with
//! [`SessionExpired`] and the `session_expiry` middleware turns it into a
//! redirect to the login page after dropping the stored token.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::{ApiError, ErrorKind};
use crate::filters;
use crate::models::CurrentUser;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// BookSwap API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Session store operation failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User may not act on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Response extension set when the API rejected the visitor's token.
#[derive(Debug, Clone, Copy)]
pub struct SessionExpired;

/// Generic error page.
#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    /// Error pages render without the account menu.
    pub current_user: Option<CurrentUser>,
    pub status: u16,
    pub title: String,
    pub message: String,
}

impl AppError {
    /// HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api(err) => match err.kind() {
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Server => StatusCode::BAD_GATEWAY,
                ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Other => err
                    .status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(StatusCode::is_client_error)
                    .unwrap_or(StatusCode::BAD_REQUEST),
            },
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show to the visitor.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(_) => "Not found".to_string(),
            Self::Unauthorized(_) => "Please sign in to continue".to_string(),
            Self::Forbidden(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please slow down".to_string(),
        }
    }

    fn is_server_error(&self) -> bool {
        match self {
            Self::Api(err) => matches!(
                err.kind(),
                ErrorKind::Server | ErrorKind::Network | ErrorKind::Internal
            ),
            Self::Session(_) | Self::Internal(_) => true,
            _ => false,
        }
    }
}

impl AppError {
    /// Capture server errors to Sentry and log them.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();

        let status = self.status();

        let mut response = (
            status,
            ErrorTemplate {
                current_user: None,
                status: status.as_u16(),
                title: status
                    .canonical_reason()
                    .unwrap_or("Something went wrong")
                    .to_string(),
                message: self.user_message(),
            },
        )
            .into_response();

        if matches!(&self, Self::Api(err) if err.is_unauthorized()) {
            response.extensions_mut().insert(SessionExpired);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Payment confirmed", Some(&[("book_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api(status: Option<u16>) -> AppError {
        AppError::Api(ApiError {
            message: "nope".to_string(),
            errors: None,
            status,
            local: false,
        })
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("book-123".to_string());
        assert_eq!(err.to_string(), "Not found: book-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(api(Some(404)).status(), StatusCode::NOT_FOUND);
        assert_eq!(api(Some(500)).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(api(None).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api(Some(409)).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Api(ApiError::local("failed to build HTTP client")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_api_error_marks_response() {
        let response = api(Some(401)).into_response();
        assert!(response.extensions().get::<SessionExpired>().is_some());

        let response = api(Some(403)).into_response();
        assert!(response.extensions().get::<SessionExpired>().is_none());
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Internal("db password leaked".to_string());
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_error_page_renders_with_signed_out_nav() {
        let response = AppError::NotFound("book 9".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(html.contains("<p class=\"error-code\">404</p>"));
        assert!(html.contains("href=\"/auth/login\""));
        assert!(!html.contains("book 9"));
    }
}
