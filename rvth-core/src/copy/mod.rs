//! Sparse-aware bank-to-image copy engine (§4.8).

pub mod delete;
pub mod extract;
pub mod import;

pub use delete::{delete_bank, undelete_bank};
pub use extract::extract_bank;
pub use import::import_bank;

/// Copy buffer size: 1 MiB, in LBAs.
pub(crate) const COPY_BUF_LBA: u32 = 2048;
/// Sparse-detection granularity: 4 KiB, in LBAs.
pub(crate) const SPARSE_SUBBLOCK_LBA: u32 = 8;
