//! domains
//!
//! Entities, error taxonomy and port definitions for school messaging.

pub mod error;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;
