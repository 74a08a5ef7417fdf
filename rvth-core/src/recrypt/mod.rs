//! PKI recryption engine (§4.9): moving a Wii bank's partitions between the
//! retail, Korean, and debug PKIs, plus the hash-tree verification (§4.9.1)
//! that shares the partition layout this module already parses.

pub mod idblob;
pub mod keys;
pub mod partition_header;
pub mod ticket;
pub mod tmd;
pub mod verify;

pub use keys::{Keys, PkiTarget};
pub use partition_header::{recrypt_bank, CertChain};
pub use verify::{verify_partition, HashMismatches, VerifyReport};
