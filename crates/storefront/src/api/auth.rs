//! Authentication endpoints.

use bookswap_core::User;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiClient, ApiError, ApiToken};

/// Body of `POST auth/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST auth/register`.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub password_confirmation: &'a str,
}

/// A successful login or registration.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: ApiToken,
    pub user: User,
}

/// Token responses use a handful of key names; some omit the user.
#[derive(Deserialize)]
struct RawAuthResponse {
    #[serde(alias = "access", alias = "access_token", alias = "key")]
    token: String,
    #[serde(default)]
    user: Option<User>,
}

impl ApiClient {
    /// Exchange credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error (401/400 for bad credentials).
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: &LoginRequest<'_>) -> Result<AuthSession, ApiError> {
        let raw: RawAuthResponse = self.post_json("auth/login", request, None).await?;
        self.complete_auth(raw).await
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error; field errors come back as `errors`.
    #[instrument(skip(self, request))]
    pub async fn register(&self, request: &RegisterRequest<'_>) -> Result<AuthSession, ApiError> {
        let raw: RawAuthResponse = self.post_json("auth/register", request, None).await?;
        self.complete_auth(raw).await
    }

    /// Fetch the user the token belongs to.
    ///
    /// # Errors
    ///
    /// Returns a 401 error if the token is no longer valid.
    #[instrument(skip(self, token))]
    pub async fn me(&self, token: &ApiToken) -> Result<User, ApiError> {
        self.get_json("auth/me", &[], Some(token)).await
    }

    /// Revoke the token server-side.
    ///
    /// # Errors
    ///
    /// Returns the normalized API error.
    #[instrument(skip(self, token))]
    pub async fn logout(&self, token: &ApiToken) -> Result<(), ApiError> {
        let builder = self
            .request(reqwest::Method::POST, "auth/logout", &[], Some(token))?;
        self.send_empty(builder).await
    }

    async fn complete_auth(&self, raw: RawAuthResponse) -> Result<AuthSession, ApiError> {
        let token = ApiToken::new(raw.token);
        let user = match raw.user {
            Some(user) => user,
            None => self.me(&token).await?,
        };
        Ok(AuthSession { token, user })
    }
}
