//! Row storage: fixed-width slot arenas and the hash-mapped table built on
//! top of them.

pub mod mapped;
pub mod row_table;

pub use mapped::HashMappedTable;
pub use row_table::RowTable;
