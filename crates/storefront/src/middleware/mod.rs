//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (per-request hub, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers (CSP, frame, referrer)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Session expiry (turn API 401s into a fresh login)
//! 7. Rate limiting (governor), per route group

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, clear_current_user, login_url, set_current_user};
pub use rate_limit::{auth_rate_limiter, proxy_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::{ContentSecurityPolicy, security_headers_middleware};
pub use session::{create_session_layer, session_expiry_middleware};
