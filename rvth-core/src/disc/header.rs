//! GameCube/Wii disc header identification (§4.6), grounded on
//! `GCN_DiscHeader` from the original tool's `gcn_structs.h`.

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{FromBytes, FromZeroes};

use crate::error::{Error, Kind, Result};

pub const GCN_MAGIC: u32 = 0xC233_9F3D;
pub const WII_MAGIC: u32 = 0x5D1C_9EA3;

/// Raw on-disk disc header, bytes `0x000..0x068`. All multi-byte fields
/// are big-endian; `zerocopy` lets us read them in place without manual
/// byte swaps.
#[derive(FromBytes, FromZeroes, Debug, Clone, Copy)]
#[repr(C)]
pub struct RawDiscHeader {
    pub id6: [u8; 6],
    pub disc_number: u8,
    pub revision: u8,
    pub audio_streaming: u8,
    pub stream_buffer_size: u8,
    pub reserved1: [u8; 14],
    pub magic_wii: U32,
    pub magic_gcn: U32,
    pub game_title: [u8; 64],
    pub hash_verify: u8,
    pub disc_no_crypt: u8,
    pub reserved2: [u8; 6],
}

const _: () = assert!(core::mem::size_of::<RawDiscHeader>() == 0x68);

/// Which disc format a header identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscFormat {
    GameCube,
    Wii,
}

/// Parsed disc header.
#[derive(Debug, Clone)]
pub struct DiscHeader {
    pub format: DiscFormat,
    pub id6: [u8; 6],
    pub disc_number: u8,
    pub revision: u8,
    pub game_title: [u8; 64],
    /// Wii-only: if non-zero, hash (H0..H4) verification is disabled for
    /// this disc's partitions.
    pub hash_verify_disabled: bool,
    /// Wii-only: if non-zero, the disc's partitions are unencrypted
    /// (RVT-R debug discs, or discs already decrypted for distribution).
    pub disc_no_crypt: bool,
}

impl DiscHeader {
    pub fn game_id(&self) -> String { String::from_utf8_lossy(&self.id6).into_owned() }

    pub fn title(&self) -> String {
        let end = self.game_title.iter().position(|&b| b == 0).unwrap_or(self.game_title.len());
        String::from_utf8_lossy(&self.game_title[..end]).trim_end().to_string()
    }

    /// Identify the format of a disc header read from LBA 0.
    ///
    /// A disc with both magic words zero, or with an unrecognized
    /// combination, is reported as [`Kind::NotWii`] for Wii-only callers;
    /// general callers should treat `Err` here as "not a valid GCN/Wii
    /// disc image".
    pub fn parse(buf: &[u8]) -> Result<DiscHeader> {
        let raw = RawDiscHeader::read_from_prefix(buf)
            .ok_or_else(|| Error::domain_ctx(Kind::PartitionHeaderCorrupted, "disc header buffer too short"))?;
        let format = if raw.magic_wii.get() == WII_MAGIC {
            DiscFormat::Wii
        } else if raw.magic_gcn.get() == GCN_MAGIC {
            DiscFormat::GameCube
        } else {
            return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "no GameCube or Wii magic found"));
        };
        Ok(DiscHeader {
            format,
            id6: raw.id6,
            disc_number: raw.disc_number,
            revision: raw.revision,
            game_title: raw.game_title,
            hash_verify_disabled: raw.hash_verify != 0,
            disc_no_crypt: raw.disc_no_crypt != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(magic_wii: u32, magic_gcn: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 0x68];
        buf[0..6].copy_from_slice(b"GALE01");
        buf[0x18..0x1C].copy_from_slice(&magic_wii.to_be_bytes());
        buf[0x1C..0x20].copy_from_slice(&magic_gcn.to_be_bytes());
        buf[0x20..0x20 + 11].copy_from_slice(b"Test Title\0");
        buf
    }

    #[test]
    fn identifies_wii_disc() {
        let buf = sample(WII_MAGIC, 0);
        let header = DiscHeader::parse(&buf).unwrap();
        assert_eq!(header.format, DiscFormat::Wii);
        assert_eq!(header.game_id(), "GALE01");
        assert_eq!(header.title(), "Test Title");
    }

    #[test]
    fn identifies_gcn_disc() {
        let buf = sample(0, GCN_MAGIC);
        let header = DiscHeader::parse(&buf).unwrap();
        assert_eq!(header.format, DiscFormat::GameCube);
    }

    #[test]
    fn rejects_unknown_magic() {
        let buf = sample(0, 0);
        assert!(DiscHeader::parse(&buf).is_err());
    }

    #[test]
    fn reads_crypto_flags() {
        let mut buf = sample(WII_MAGIC, 0);
        buf[0x60] = 1;
        buf[0x61] = 1;
        let header = DiscHeader::parse(&buf).unwrap();
        assert!(header.hash_verify_disabled);
        assert!(header.disc_no_crypt);
    }
}
