//! Reader abstraction over plain, CISO-compacted, and WBFS disc images (§4.4).
//!
//! All variants share one virtual interface — a trait here, in place of the
//! original tool's `Reader_Vtbl` function-pointer table. LBA arguments are
//! relative to the reader's `start_lba`; callers never see physical offsets.

pub mod ciso;
pub mod plain;
pub mod wbfs;

use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::util::LBA_SIZE;

pub use ciso::CisoReader;
pub use plain::PlainReader;
pub use wbfs::WbfsReader;

/// Common operations every reader variant implements.
///
/// A read must not cross the end of the logical image; a write on a
/// read-only variant (CISO, WBFS) fails with [`Kind::InvalidArgument`].
pub trait Reader {
    /// Read `len` LBAs starting at `lba` (relative to this reader's
    /// logical image) into `dst`, which must be exactly `len * 512` bytes.
    fn read(&mut self, dst: &mut [u8], lba: u32, len: u32) -> Result<u32>;

    /// Write `len` LBAs starting at `lba`. Fails on read-only variants.
    fn write(&mut self, src: &[u8], lba: u32, len: u32) -> Result<u32>;

    fn flush(&mut self) -> Result<()>;

    /// Logical length of the image, in LBAs.
    fn len_lba(&self) -> u32;

    /// True if this variant refuses writes unconditionally.
    fn is_read_only(&self) -> bool { false }
}

fn check_bounds(lba: u32, len: u32, len_lba: u32) -> Result<()> {
    let end = (lba as u64) + (len as u64);
    if end > len_lba as u64 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "read/write crosses end of logical image"));
    }
    Ok(())
}

/// First 4 bytes of a CISO-format image.
const CISO_MAGIC: [u8; 4] = *b"CISO";
/// First 4 bytes of a WBFS-format image.
const WBFS_MAGIC: [u8; 4] = *b"WBFS";

/// SDK pre-image marker: some RVT-R dumps prefix the actual disc image
/// with a 32 KiB SDK header. Fixed bytes at 0x0000 and 0x082C, and a
/// marker byte at 0x0844, identify it.
fn looks_like_sdk_preimage(peek: &[u8]) -> bool {
    peek.len() >= 0x845
        && peek[0..4] == [0x00, 0x00, 0x00, 0x01]
        && peek[0x082C..0x082C + 4] == [0xFF, 0xFF, 0xFF, 0xFF]
        && peek[0x0844] == 0x00
}

/// Probe `file` at byte range `[start_lba*512, ..)` and construct the
/// matching reader variant.
///
/// Devices always use the plain reader (sparse formats don't apply to
/// raw block devices). Otherwise the first 4 KiB is peeked for CISO then
/// WBFS magic; failing both, an SDK pre-image header advances
/// `start_lba` by 32 KiB and falls back to plain.
pub fn open_reader(file: RefFile, start_lba: u32, len_lba: u32) -> Result<Box<dyn Reader>> {
    if file.is_device() {
        return Ok(Box::new(PlainReader::new(file, start_lba, len_lba)));
    }

    let mut peek = vec![0u8; 4096];
    let start_offset = (start_lba as u64) * LBA_SIZE;
    file.read_at(start_offset, &mut peek)?;

    if peek[0..4] == CISO_MAGIC {
        return Ok(Box::new(CisoReader::open(file, start_offset)?));
    }
    if peek[0..4] == WBFS_MAGIC {
        return Ok(Box::new(WbfsReader::open(file, start_offset)?));
    }
    if looks_like_sdk_preimage(&peek) {
        let adjusted_start = start_lba + crate::util::bytes_to_lba(32 * 1024);
        return Ok(Box::new(PlainReader::new(file, adjusted_start, len_lba)));
    }
    Ok(Box::new(PlainReader::new(file, start_lba, len_lba)))
}
