//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, repository functions,
//! and `PgStore`, the Postgres implementation of the `engine::Store`
//! facade. No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::DbPool;
pub use store::PgStore;
