#![deny(missing_docs)]

//! Shared error types and identifiers for CIQ crates.
//!
//! Architecture role:
//! - provides the common [`CiqError`] / [`Result`] contracts used by the
//!   logical-plan and calibration layers
//! - hosts strongly-typed identifier wrappers
//!
//! Key modules:
//! - [`error`]
//! - [`ids`]

/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;

pub use error::{CiqError, Result};
pub use ids::ColumnId;
