//! CISO (compact ISO) sparse-image reader (§4.4), grounded on
//! `reader_ciso.c`'s header layout and block-map convention.

use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::util::LBA_SIZE;

use super::{check_bounds, Reader};

const CISO_HEADER_SIZE: u64 = 0x8000;
const CISO_MAP_SIZE: usize = 0x7FF8;
const CISO_BLOCK_SIZE_MIN: u32 = 1 << 15;
const CISO_BLOCK_SIZE_MAX: u32 = 1 << 24;

/// Sentinel physical-block index for a sparse (all-zero) logical block.
const SPARSE: u32 = u32::MAX;

pub struct CisoReader {
    file: RefFile,
    /// Byte offset of the CISO image's own header within `file`.
    base_offset: u64,
    block_size: u32,
    block_size_lba: u32,
    /// Physical block index (counting present blocks in map order,
    /// starting at 0) for each logical block, or [`SPARSE`].
    physical_block_of: Vec<u32>,
    len_lba: u32,
}

impl CisoReader {
    /// Open a CISO image whose header starts at `base_offset` in `file`.
    pub fn open(file: RefFile, base_offset: u64) -> Result<CisoReader> {
        let mut header = vec![0u8; CISO_HEADER_SIZE as usize];
        file.read_at(base_offset, &mut header)?;

        if &header[0..4] != b"CISO" {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "not a CISO image"));
        }
        let block_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if !(CISO_BLOCK_SIZE_MIN..=CISO_BLOCK_SIZE_MAX).contains(&block_size) || !block_size.is_power_of_two() {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "CISO block size is not a power of two in range"));
        }
        if block_size as u64 % LBA_SIZE != 0 {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "CISO block size is not LBA-aligned"));
        }

        let map = &header[8..8 + CISO_MAP_SIZE];
        let mut physical_block_of = Vec::with_capacity(CISO_MAP_SIZE);
        let mut next_physical = 0u32;
        let mut highest_present = None;
        for (i, &b) in map.iter().enumerate() {
            match b {
                0 => physical_block_of.push(SPARSE),
                1 => {
                    physical_block_of.push(next_physical);
                    next_physical += 1;
                    highest_present = Some(i);
                }
                _ => return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "invalid CISO block map entry")),
            }
        }
        let num_logical_blocks = highest_present.map(|i| i as u32 + 1).unwrap_or(0);
        physical_block_of.truncate(num_logical_blocks as usize);

        let block_size_lba = (block_size as u64 / LBA_SIZE) as u32;
        let len_lba = num_logical_blocks.saturating_mul(block_size_lba);

        Ok(CisoReader { file, base_offset, block_size, block_size_lba, physical_block_of, len_lba })
    }
}

impl Reader for CisoReader {
    fn read(&mut self, dst: &mut [u8], lba: u32, len: u32) -> Result<u32> {
        check_bounds(lba, len, self.len_lba)?;
        for i in 0..len {
            let cur_lba = lba + i;
            let block = cur_lba / self.block_size_lba;
            let offset_in_block_lba = cur_lba % self.block_size_lba;
            let dst_slice = &mut dst[(i as usize * LBA_SIZE as usize)..((i as usize + 1) * LBA_SIZE as usize)];

            let physical = self.physical_block_of[block as usize];
            if physical == SPARSE {
                dst_slice.fill(0);
            } else {
                let phys_offset = self.base_offset
                    + CISO_HEADER_SIZE
                    + physical as u64 * self.block_size as u64
                    + offset_in_block_lba as u64 * LBA_SIZE;
                self.file.read_at(phys_offset, dst_slice)?;
            }
        }
        Ok(len)
    }

    fn write(&mut self, _src: &[u8], _lba: u32, _len: u32) -> Result<u32> {
        Err(Error::domain_ctx(Kind::InvalidArgument, "CISO images are read-only"))
    }

    fn flush(&mut self) -> Result<()> { Ok(()) }

    fn len_lba(&self) -> u32 { self.len_lba }

    fn is_read_only(&self) -> bool { true }
}
