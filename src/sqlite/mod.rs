//! SQLite backend for the delivery pool engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
