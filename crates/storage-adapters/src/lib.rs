//! storage-adapters
//!
//! Persistence implementations of the domain ports.
//! `MemoryStore` is always available; `PgStore` needs `db-postgres`.

pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
