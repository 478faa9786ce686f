//! Storefront-local models.
//!
//! Domain records come from `bookswap_core`; only session state lives here.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
