//! Database access for the storefront.
//!
//! The storefront owns no domain tables: books, orders and users live behind
//! the BookSwap API. `PostgreSQL` only backs the `tower-sessions` store
//! (login token and local order snapshots per visitor).
//!
//! # Migrations
//!
//! The session table is created by:
//! ```bash
//! cargo run -p bookswap-cli -- migrate
//! ```

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
