//! Wii volume-group table and partition-table entries (§4.6, §4.7, §4.9),
//! grounded on `RVL_VolumeGroupTable`/`RVL_PartitionTableEntry` in the
//! original tool's `gcn_structs.h`.

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{FromBytes, FromZeroes};

use crate::error::{Error, Kind, Result};
use crate::util::{bytes_to_rshift2, rshift2_to_bytes};

/// Byte offset of the volume group table on a Wii disc.
pub const VGTBL_ADDRESS: u64 = 0x40000;

#[derive(FromBytes, FromZeroes, Debug, Clone, Copy)]
#[repr(C)]
struct RawVolumeGroup {
    count: U32,
    addr: U32, // rshift-2
}

#[derive(FromBytes, FromZeroes, Debug, Clone, Copy)]
#[repr(C)]
struct RawVolumeGroupTable {
    vg: [RawVolumeGroup; 4],
}

const _: () = assert!(core::mem::size_of::<RawVolumeGroupTable>() == 32);

#[derive(Debug, Clone, Copy)]
pub struct VolumeGroup {
    pub count: u32,
    /// Byte offset (already un-shifted) of this group's partition table.
    pub table_offset: u64,
}

/// The four volume groups at the fixed VGT address.
#[derive(Debug, Clone, Copy)]
pub struct VolumeGroupTable {
    pub groups: [VolumeGroup; 4],
}

impl VolumeGroupTable {
    /// Parse the 32-byte table header (the `vg[4]` array itself, not the
    /// per-group partition-table entries, which live wherever each
    /// group's `addr` points).
    pub fn parse(buf: &[u8]) -> Result<VolumeGroupTable> {
        let raw = RawVolumeGroupTable::read_from_prefix(buf)
            .ok_or_else(|| Error::domain_ctx(Kind::PartitionTableCorrupted, "volume group table buffer too short"))?;
        let mut groups = [VolumeGroup { count: 0, table_offset: 0 }; 4];
        for (i, vg) in raw.vg.iter().enumerate() {
            groups[i] = VolumeGroup { count: vg.count.get(), table_offset: rshift2_to_bytes(vg.addr.get()) };
        }
        Ok(VolumeGroupTable { groups })
    }

    /// The first group with a non-zero partition count whose table
    /// immediately follows the header (`addr == VGTBL_ADDRESS + 32`), as
    /// used by the disc-header recovery path (§4.6).
    pub fn first_nonempty_contiguous(&self) -> Option<&VolumeGroup> {
        self.groups.iter().find(|g| g.count > 0 && g.table_offset == VGTBL_ADDRESS + 32)
    }
}

/// Partition type (`0 == Game, 1 == Update, 2 == Channel Installer, other
/// = title ID`), per `RVL_PartitionTableEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Game,
    Update,
    ChannelInstaller,
    Other(u32),
}

impl PartitionType {
    pub fn from_u32(v: u32) -> PartitionType {
        match v {
            0 => PartitionType::Game,
            1 => PartitionType::Update,
            2 => PartitionType::ChannelInstaller,
            other => PartitionType::Other(other),
        }
    }
}

#[derive(FromBytes, FromZeroes, Debug, Clone, Copy)]
#[repr(C)]
struct RawPartitionTableEntry {
    addr: U32, // rshift-2
    part_type: U32,
}

#[derive(Debug, Clone, Copy)]
pub struct PartitionTableEntry {
    /// Byte offset of this partition's header.
    pub offset: u64,
    pub part_type: PartitionType,
}

/// Parse `count` consecutive 8-byte partition-table entries starting at
/// `table_offset` within `buf` (the buffer covering that region).
pub fn parse_partition_table(buf: &[u8], count: u32) -> Result<Vec<PartitionTableEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let start = i * 8;
        let raw = buf
            .get(start..start + 8)
            .and_then(RawPartitionTableEntry::read_from)
            .ok_or_else(|| Error::domain_ctx(Kind::PartitionTableCorrupted, "truncated partition table"))?;
        entries.push(PartitionTableEntry {
            offset: rshift2_to_bytes(raw.addr.get()),
            part_type: PartitionType::from_u32(raw.part_type.get()),
        });
    }
    Ok(entries)
}

/// Encode a byte offset back to the on-disk rshift-2 representation.
pub fn offset_to_rshift2(offset: u64) -> u32 { bytes_to_rshift2(offset) }

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vgtbl() -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        buf[0..4].copy_from_slice(&1u32.to_be_bytes()); // group 0 count
        buf[4..8].copy_from_slice(&((VGTBL_ADDRESS + 32) >> 2).to_be_bytes()); // group 0 addr
        buf
    }

    #[test]
    fn parses_vgtbl_and_finds_contiguous_group() {
        let buf = sample_vgtbl();
        let vgtbl = VolumeGroupTable::parse(&buf).unwrap();
        assert_eq!(vgtbl.groups[0].count, 1);
        let g = vgtbl.first_nonempty_contiguous().unwrap();
        assert_eq!(g.table_offset, VGTBL_ADDRESS + 32);
    }

    #[test]
    fn parses_partition_table_entries() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&(0x50000u32 >> 2).to_be_bytes());
        buf[4..8].copy_from_slice(&0u32.to_be_bytes()); // Game
        buf[8..12].copy_from_slice(&(0x150000u32 >> 2).to_be_bytes());
        buf[12..16].copy_from_slice(&1u32.to_be_bytes()); // Update
        let entries = parse_partition_table(&buf, 2).unwrap();
        assert_eq!(entries[0].part_type, PartitionType::Game);
        assert_eq!(entries[0].offset, 0x50000);
        assert_eq!(entries[1].part_type, PartitionType::Update);
    }
}
