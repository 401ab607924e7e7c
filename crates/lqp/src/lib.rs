//! Logical query plan core of the CIQ engine.
//!
//! Architecture role:
//! - type and encoding registry for column metadata
//! - scalar expression trees attached to plan nodes
//! - the shared-DAG logical plan node model with per-kind column,
//!   nullability, and unique-constraint derivation
//! - plan rendering for diagnostics
//!
//! Key modules:
//! - [`data_type`]
//! - [`catalog`]
//! - [`expression`]
//! - [`node`]
//! - [`constraints`]
//! - [`explain`]
//!
//! The plan is a single-threaded, non-blocking structure by contract:
//! producers build bottom-up and publish the root; published plans may be
//! traversed by multiple readers concurrently as long as nobody rewires
//! inputs.

pub mod catalog;
pub mod constraints;
pub mod data_type;
pub mod explain;
pub mod expression;
pub mod node;

pub use catalog::*;
pub use constraints::*;
pub use data_type::*;
pub use explain::*;
pub use expression::*;
pub use node::*;
