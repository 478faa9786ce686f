//! Core types for BookSwap.
//!
//! This module provides type-safe wrappers for common domain concepts and
//! the plain records returned by the REST API.

pub mod email;
pub mod id;
pub mod price;
pub mod records;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
pub use records::*;
pub use status::*;
