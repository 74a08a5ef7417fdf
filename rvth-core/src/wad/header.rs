//! WAD and BroadOn WAD Format (BWF) headers (§4.11), grounded on
//! `Wii_WAD_Header`/`Wii_WAD_Header_BWF` as referenced from the original
//! tool's `wad-fns.c`/`print-info.c`.
//!
//! Both headers are 32 bytes of eight big-endian `u32` fields, but the
//! fields are ordered differently and carry different meaning: a standard
//! WAD's sections are implied by 64-byte alignment, while a BWF header
//! states its data offset explicitly and aligns sections to 16 bytes.

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::error::{Error, Kind, Result};

/// Declared header size for both layouts.
pub const HEADER_SIZE: u32 = 0x20;

/// Standard WAD type words (the `type` field, compared as a big-endian `u32`).
pub const WAD_TYPE_IS: u32 = 0x4973_0000; // "Is\0\0"
pub const WAD_TYPE_IB: u32 = 0x6962_0000; // "ib\0\0"
pub const WAD_TYPE_BK: u32 = 0x426B_0000; // "Bk\0\0"

pub const WAD_TICKET_SIZE_MAX: usize = 64 * 1024;
pub const WAD_TMD_SIZE_MAX: usize = 1024 * 1024;
pub const WAD_META_SIZE_MAX: usize = 1024 * 1024;
pub const WAD_DATA_SIZE_MAX: usize = 128 * 1024 * 1024;

fn align_up(value: u32, align: u32) -> u32 { (value + align - 1) & !(align - 1) }

/// Raw standard WAD header (`Wii_WAD_Header`).
#[derive(FromBytes, FromZeroes, AsBytes, Debug, Clone, Copy)]
#[repr(C)]
pub struct RawWadHeader {
    pub header_size: U32,
    pub wad_type: U32,
    pub cert_chain_size: U32,
    pub crl_size: U32,
    pub ticket_size: U32,
    pub tmd_size: U32,
    pub data_size: U32,
    pub meta_size: U32,
}

const _: () = assert!(core::mem::size_of::<RawWadHeader>() == 0x20);

/// Raw BroadOn WAD Format header (`Wii_WAD_Header_BWF`). Same size as
/// [`RawWadHeader`], different field order: no type word, an explicit
/// `data_offset`, and a `meta_cid` identifying the metadata content.
#[derive(FromBytes, FromZeroes, AsBytes, Debug, Clone, Copy)]
#[repr(C)]
pub struct RawBwfHeader {
    pub header_size: U32,
    pub data_offset: U32,
    pub cert_chain_size: U32,
    pub ticket_size: U32,
    pub tmd_size: U32,
    pub meta_size: U32,
    pub meta_cid: U32,
    pub crl_size: U32,
}

const _: () = assert!(core::mem::size_of::<RawBwfHeader>() == 0x20);

/// Which of the two header layouts a WAD file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WadFormat {
    Standard,
    Bwf,
}

/// Byte ranges of every section of a parsed WAD file, relative to the
/// start of the buffer it was parsed from.
#[derive(Debug, Clone, Copy)]
pub struct WadLayout {
    pub format: WadFormat,
    pub wad_type: u32,
    pub cert_chain_address: u32,
    pub cert_chain_size: u32,
    pub ticket_address: u32,
    pub ticket_size: u32,
    pub tmd_address: u32,
    pub tmd_size: u32,
    pub data_address: u32,
    /// Declared data size. A standard WAD always states this; a BWF
    /// defers to "rest of the file" and this is filled in by the caller
    /// once the total buffer length is known (see [`WadLayout::resolve_data_size`]).
    pub data_size: u32,
    pub meta_address: u32,
    pub meta_size: u32,
}

impl WadLayout {
    /// Fill in `data_size` from the enclosing buffer's length, for formats
    /// (BWF) whose header doesn't state it directly.
    pub fn resolve_data_size(&mut self, total_len: usize) -> Result<()> {
        if self.format != WadFormat::Bwf {
            return Ok(());
        }
        let total_len = total_len as u32;
        if total_len < self.data_address {
            return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "BWF data offset past end of file"));
        }
        self.data_size = total_len - self.data_address;
        Ok(())
    }

    /// Parse a standard WAD header's section addresses (64-byte alignment,
    /// starting with the certificate chain).
    fn from_standard(header: &RawWadHeader) -> Result<Self> {
        if header.header_size.get() != HEADER_SIZE {
            return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "wrong WAD header size"));
        }
        let wad_type = header.wad_type.get();
        if !matches!(wad_type, WAD_TYPE_IS | WAD_TYPE_IB | WAD_TYPE_BK) {
            return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "unrecognized WAD type"));
        }

        let cert_chain_address = align_up(HEADER_SIZE, 64);
        let cert_chain_size = header.cert_chain_size.get();
        let ticket_address = align_up(cert_chain_address + cert_chain_size, 64);
        let ticket_size = header.ticket_size.get();
        let tmd_address = align_up(ticket_address + ticket_size, 64);
        let tmd_size = header.tmd_size.get();
        let data_address = align_up(tmd_address + tmd_size, 64);
        let data_size = header.data_size.get();
        let meta_size = header.meta_size.get();
        let meta_address = if meta_size != 0 { align_up(data_address + data_size, 64) } else { 0 };

        Ok(WadLayout {
            format: WadFormat::Standard,
            wad_type,
            cert_chain_address,
            cert_chain_size,
            ticket_address,
            ticket_size,
            tmd_address,
            tmd_size,
            data_address,
            data_size,
            meta_address,
            meta_size,
        })
    }

    /// Parse a BWF header's section addresses (16-byte alignment, data
    /// offset stated explicitly rather than implied).
    fn from_bwf(header: &RawBwfHeader) -> Result<Self> {
        if header.header_size.get() != HEADER_SIZE {
            return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "wrong BWF header size"));
        }

        let cert_chain_address = align_up(HEADER_SIZE, 16);
        let cert_chain_size = header.cert_chain_size.get();
        let ticket_address = align_up(cert_chain_address + cert_chain_size, 16);
        let ticket_size = header.ticket_size.get();
        let tmd_address = align_up(ticket_address + ticket_size, 16);
        let tmd_size = header.tmd_size.get();
        let meta_size = header.meta_size.get();
        let meta_address = if meta_size != 0 { align_up(tmd_address + tmd_size, 16) } else { 0 };

        Ok(WadLayout {
            format: WadFormat::Bwf,
            wad_type: WAD_TYPE_BK,
            cert_chain_address,
            cert_chain_size,
            ticket_address,
            ticket_size,
            tmd_address,
            tmd_size,
            data_address: header.data_offset.get(),
            data_size: 0,
            meta_address,
            meta_size,
        })
    }
}

/// Identify and parse a WAD header from the first 32 bytes of `buf`: try
/// the standard layout first, then BWF.
pub fn parse_header(buf: &[u8]) -> Result<WadLayout> {
    if buf.len() < HEADER_SIZE as usize {
        return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "buffer shorter than a WAD header"));
    }
    let wad = RawWadHeader::read_from_prefix(buf).ok_or_else(|| Error::domain_ctx(Kind::WadHeaderInvalid, "header too short"))?;
    if let Ok(layout) = WadLayout::from_standard(&wad) {
        return Ok(layout);
    }
    let bwf = RawBwfHeader::read_from_prefix(buf).ok_or_else(|| Error::domain_ctx(Kind::WadHeaderInvalid, "header too short"))?;
    WadLayout::from_bwf(&bwf)
}
