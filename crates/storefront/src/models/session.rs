//! Session-related types.
//!
//! Types stored in the session for authentication state.

use std::fmt;

use bookswap_core::{User, UserId};
use serde::{Deserialize, Serialize};

use crate::api::ApiToken;

/// Session-stored user identity.
///
/// Holds the API bearer token; its `Debug` output never includes it.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's id in the BookSwap API.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    token: String,
}

impl CurrentUser {
    /// Build the session identity from a login response.
    #[must_use]
    pub fn new(user: &User, token: &ApiToken) -> Self {
        Self {
            id: user.id,
            name: user.display_name().to_string(),
            email: user.email.clone(),
            token: token.expose().to_string(),
        }
    }

    /// Bearer token for API calls made on this user's behalf.
    #[must_use]
    pub fn token(&self) -> ApiToken {
        ApiToken::new(self.token.clone())
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user (and API token).
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the visitor's local order snapshots.
    pub const LOCAL_ORDERS: &str = "bookswap_local_orders";
}
