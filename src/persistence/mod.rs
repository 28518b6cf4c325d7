//! Persistence layer modules.

pub mod chunk_repo;
pub mod db;
pub mod locks;
pub mod retention;
pub mod schema;
pub mod session_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
