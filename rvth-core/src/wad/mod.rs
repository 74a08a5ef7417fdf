//! WAD / BroadOn WAD Format container collaborator interface (§4.11):
//! `wad_parse` and `wad_resign` over in-memory buffers. Walking an on-disk
//! NUS directory into (or out of) a WAD is left to the caller.

pub mod header;
pub mod resign;

pub use header::{WadFormat, WadLayout, WAD_DATA_SIZE_MAX, WAD_META_SIZE_MAX, WAD_TICKET_SIZE_MAX, WAD_TMD_SIZE_MAX};
pub use resign::{wad_parse, wad_resign, WadCertChain, WadSections};
