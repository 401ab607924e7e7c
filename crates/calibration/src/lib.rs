//! Calibration query generation for the CIQ cost model.
//!
//! Architecture role:
//! - enumerates predicate configurations over a table catalog
//! - synthesises predicate-bearing logical plan fragments for cost-model
//!   training
//!
//! Key modules:
//! - [`configuration`]
//! - [`predicate_generator`]
//!
//! The generator is a pure consumer of the plan layer: given a fixed catalog
//! and configuration it emits an identical, totally ordered sequence of
//! configurations on every call.

pub mod configuration;
pub mod predicate_generator;

pub use configuration::*;
pub use predicate_generator::*;
