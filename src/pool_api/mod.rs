//! # Delivery pool public API
//!
//! The `pool_api` module exposes the programmatic API for the delivery pool engine. The API is modular so that
//! clients can pick the functionality they need.
//!
//! * [`patron_api`] manages patron records: first contact, activation, access tokens and the cooldown queries.
//! * [`matchmaker_api`] is the primary API for the request/fulfilment flow, driven by the out-of-scope command
//!   surface.
//!
//! # API usage
//!
//! The pattern for both APIs is the same. An API instance is created by supplying a database backend that implements
//! the backend traits required by the API.
//!
//! ```rust,ignore
//! use delivery_pool_engine::{MatchmakerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = MatchmakerApi::new(db, producers);
//! let (package, fulfiller) = api.request_delivery(&patron_id, Utc::now()).await?;
//! ```

pub mod errors;
pub mod matchmaker_api;
pub mod patron_api;
