//! RVT-H NHCD bank table and bank-entry metadata (§4.5-4.7).

pub mod entry;
pub mod table;

pub use entry::{BankEntry, BankType, CryptoType, SigInfo, SigStatus as BankSigStatus, SigType};
pub use table::{NhcdBankEntry, NhcdHeader, BANK_MAX_COUNT, BANK_MIN_COUNT, NHCD_BANKTABLE_LBA, NHCD_MAGIC};
