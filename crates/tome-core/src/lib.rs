//! Core types, the storage trait and the versioning service for Tome.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures in `store::VersionStore`.
#![allow(async_fn_in_trait)]

pub mod diff;
pub mod entity;
pub mod error;
pub mod field;
pub mod snapshot;
pub mod store;
pub mod versioning;

pub use error::{Error, Result};
pub use versioning::Versioning;
