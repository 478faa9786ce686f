//! Business logic services for storefront.
//!
//! # Services
//!
//! - [`images`] - Book image URLs: candidate lists for the browser and
//!   server-side probing with a short-lived cache
//! - [`local_orders`] - Per-visitor order snapshots and their reconciliation
//!   with the API's order history

pub mod images;
pub mod local_orders;
