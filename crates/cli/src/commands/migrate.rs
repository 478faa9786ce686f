//! Database migration commands.
//!
//! The storefront keeps no data of its own apart from sessions, so the only
//! schema is the `tower_sessions` table created by the session store.
//!
//! # Usage
//!
//! ```bash
//! bookswap migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string
//!   (`DATABASE_URL` is accepted as a fallback)

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create the session store schema.
///
/// # Errors
///
/// Returns an error if the database URL is missing or the migration fails.
pub async fn storefront() -> Result<(), MigrationError> {
    let _ = dotenvy::dotenv();

    let database_url = database_url(|key| std::env::var(key).ok())?;

    tracing::info!("Connecting to storefront database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url.expose_secret())
        .await?;

    tracing::info!("Creating session store schema...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}

/// Database URL from `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url<F>(get: F) -> Result<SecretString, MigrationError>
where
    F: Fn(&str) -> Option<String>,
{
    ["STOREFRONT_DATABASE_URL", "DATABASE_URL"]
        .into_iter()
        .find_map(|key| get(key).filter(|v| !v.trim().is_empty()))
        .map(SecretString::from)
        .ok_or(MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_url_wins() {
        let url = database_url(|key| match key {
            "STOREFRONT_DATABASE_URL" => Some("postgres://sf".to_string()),
            "DATABASE_URL" => Some("postgres://generic".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(url.expose_secret(), "postgres://sf");
    }

    #[test]
    fn test_database_url_fallback() {
        let url = database_url(|key| {
            (key == "DATABASE_URL").then(|| "postgres://generic".to_string())
        })
        .unwrap();
        assert_eq!(url.expose_secret(), "postgres://generic");
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = database_url(|_| Some("  ".to_string())).unwrap_err();
        assert!(matches!(err, MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL")));
    }
}
