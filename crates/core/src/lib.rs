//! BookSwap Core - Shared types library.
//!
//! This crate provides the types shared by the BookSwap components:
//! - `storefront` - Public-facing book marketplace site
//! - `cli` - Command-line tools for migrations and image diagnostics
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure logic - no database
//! access and no HTTP clients. Anything that needs the network (such as
//! probing an image URL) is expressed as a trait the caller implements.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, emails, statuses and the records mirrored
//!   from the BookSwap REST API
//! - [`images`] - Candidate URL resolution and the image fallback state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod images;
pub mod types;

pub use types::*;
