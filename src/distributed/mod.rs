//! The distributed table and the registry of structures that must refresh
//! after rows migrate.

pub mod dependents;
pub mod table;

pub use dependents::{DependentGuard, DependentRegistry};
pub use table::DistributedTable;
