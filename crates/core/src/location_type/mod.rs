//! Location type hierarchy.
//!
//! Types form a forest keyed by name: each type names its parent type, and a
//! location of type `T` may only sit under a location whose type is `T`'s
//! parent. Levels are derived in bulk by [`hierarchy::compute_levels`].

pub mod csv_io;
pub mod hierarchy;
pub mod import;
pub mod store;
pub mod types;

pub use hierarchy::{LevelPlan, compute_levels, lowest_level_type_ids, sort_type_chain};
pub use import::{TypePlan, TypeImporter};
pub use store::TypeHierarchyStore;
pub use types::{
    EmptyResult, ImportMode, LocationTypeInput, LocationTypeNode, TypeImportReport, TypeLevel,
    TypeRowOutcome, TypeRowReport,
};
