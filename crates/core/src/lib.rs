//! Core catalog logic for Locus.
//!
//! This crate contains the location catalog rules with ZERO database
//! dependencies. Persistence is reached only through the async store traits
//! in [`location::store`] and [`location_type::store`].
//!
//! # Modules
//!
//! - `location` - Location nodes, batch reconciliation, path maintenance
//! - `location_type` - Type hierarchy, levels, type batch planning
//! - `pipeline` - Import and bootstrap flows over the store traits
//! - `memory` - In-process store implementations

pub mod error;
pub mod location;
pub mod location_type;
pub mod memory;
pub mod pipeline;
mod tabular;

pub use error::{CatalogError, CatalogResult, CsvError, ValidationError};
pub use tabular::RowViolation;
