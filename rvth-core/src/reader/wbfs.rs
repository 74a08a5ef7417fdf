//! WBFS sparse-image reader (§4.4).
//!
//! Analogous to [`super::ciso`], with WBFS's own header and per-disc
//! sector table. RVT-H bank images hold exactly one disc, so only the
//! first disc-info slot is consulted.

use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::util::LBA_SIZE;

use super::{check_bounds, Reader};

const DISC_TABLE_OFFSET: u64 = 0x40;
const SPARSE: u32 = u32::MAX;

pub struct WbfsReader {
    file: RefFile,
    base_offset: u64,
    wbfs_sector_size: u32,
    wbfs_sector_size_lba: u32,
    /// Physical WBFS-sector index (0-based, counted from the start of the
    /// image, header included) for each logical WBFS sector of the disc.
    physical_sector_of: Vec<u32>,
    len_lba: u32,
}

impl WbfsReader {
    pub fn open(file: RefFile, base_offset: u64) -> Result<WbfsReader> {
        let mut header = vec![0u8; 0x100];
        file.read_at(base_offset, &mut header)?;

        if &header[0..4] != b"WBFS" {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "not a WBFS image"));
        }
        let hd_sector_shift = header[8];
        let wbfs_sector_shift = header[13];
        if !(9..=20).contains(&hd_sector_shift) || !(9..=20).contains(&wbfs_sector_shift) {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "implausible WBFS sector shift"));
        }
        let wbfs_sector_size = 1u32 << wbfs_sector_shift;
        if wbfs_sector_size as u64 % LBA_SIZE != 0 {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "WBFS sector size is not LBA-aligned"));
        }

        // First disc-info slot starts at sector index 1 (sector 0 is the
        // header + disc-use table).
        let disc_info_offset = base_offset + wbfs_sector_size as u64;
        let mut disc_info = vec![0u8; wbfs_sector_size as usize];
        file.read_at(disc_info_offset, &mut disc_info)?;

        // The disc-info slot opens with a 0x100-byte copy of the disc
        // header, followed by the big-endian u16 sector table.
        let table = &disc_info[0x100..];
        let mut physical_sector_of = Vec::with_capacity(table.len() / 2);
        let mut highest_present = None;
        for (i, chunk) in table.chunks_exact(2).enumerate() {
            let entry = u16::from_be_bytes([chunk[0], chunk[1]]);
            if entry == 0 {
                physical_sector_of.push(SPARSE);
            } else {
                physical_sector_of.push(entry as u32);
                highest_present = Some(i);
            }
        }
        let num_logical_sectors = highest_present.map(|i| i as u32 + 1).unwrap_or(0);
        physical_sector_of.truncate(num_logical_sectors as usize);

        let wbfs_sector_size_lba = wbfs_sector_size / LBA_SIZE as u32;
        let len_lba = num_logical_sectors.saturating_mul(wbfs_sector_size_lba);

        let _ = DISC_TABLE_OFFSET; // reserved; disc-use bitmap isn't needed for single-disc reads

        Ok(WbfsReader {
            file,
            base_offset,
            wbfs_sector_size,
            wbfs_sector_size_lba,
            physical_sector_of,
            len_lba,
        })
    }
}

impl Reader for WbfsReader {
    fn read(&mut self, dst: &mut [u8], lba: u32, len: u32) -> Result<u32> {
        check_bounds(lba, len, self.len_lba)?;
        for i in 0..len {
            let cur_lba = lba + i;
            let sector = cur_lba / self.wbfs_sector_size_lba;
            let offset_in_sector_lba = cur_lba % self.wbfs_sector_size_lba;
            let dst_slice = &mut dst[(i as usize * LBA_SIZE as usize)..((i as usize + 1) * LBA_SIZE as usize)];

            let physical = self.physical_sector_of[sector as usize];
            if physical == SPARSE {
                dst_slice.fill(0);
            } else {
                let phys_offset = self.base_offset
                    + physical as u64 * self.wbfs_sector_size as u64
                    + offset_in_sector_lba as u64 * LBA_SIZE;
                self.file.read_at(phys_offset, dst_slice)?;
            }
        }
        Ok(len)
    }

    fn write(&mut self, _src: &[u8], _lba: u32, _len: u32) -> Result<u32> {
        Err(Error::domain_ctx(Kind::InvalidArgument, "WBFS images are read-only"))
    }

    fn flush(&mut self) -> Result<()> { Ok(()) }

    fn len_lba(&self) -> u32 { self.len_lba }

    fn is_read_only(&self) -> bool { true }
}
