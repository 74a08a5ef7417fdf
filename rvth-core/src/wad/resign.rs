//! WAD/BWF parsing and re-signing (§4.11), grounded on `resign_wad()` in
//! the original tool's `wadresign/resign-wad.c`.
//!
//! Both entry points operate on in-memory buffers only; walking an on-disk
//! NUS directory (`title.tik`/`title.tmd`/`title.cert`/`*.app`/`*.h3`) to
//! assemble or disassemble a WAD is a collaborator's job, not this crate's.

use zerocopy::AsBytes;

use crate::error::{Error, Kind, Result};
use crate::recrypt::keys::{Keys, PkiTarget};
use crate::recrypt::ticket::{recrypt_ticket, TICKET_SIZE, TITLE_ID_OFFSET};
use crate::recrypt::tmd::recrypt_tmd;

use super::header::{
    parse_header, RawBwfHeader, RawWadHeader, WadFormat, WadLayout, HEADER_SIZE, WAD_DATA_SIZE_MAX, WAD_META_SIZE_MAX,
    WAD_TICKET_SIZE_MAX, WAD_TMD_SIZE_MAX, WAD_TYPE_IB, WAD_TYPE_IS,
};

fn align_up(value: usize, align: usize) -> usize { (value + align - 1) & !(align - 1) }

fn slice(buf: &[u8], address: u32, size: u32) -> Result<&[u8]> {
    let start = address as usize;
    let end = start + size as usize;
    buf.get(start..end).ok_or_else(|| Error::domain_ctx(Kind::WadHeaderInvalid, "WAD section runs past end of buffer"))
}

/// The byte ranges of a parsed WAD's sections (§4.11 `wad_parse`).
pub struct WadSections<'a> {
    pub layout: WadLayout,
    pub cert_chain: &'a [u8],
    pub ticket: &'a [u8],
    pub tmd: &'a [u8],
    pub data: &'a [u8],
    pub meta: &'a [u8],
}

/// Parse `buf` as either a standard WAD or a BWF, returning its section map.
pub fn wad_parse(buf: &[u8]) -> Result<WadSections<'_>> {
    let mut layout = parse_header(buf)?;
    layout.resolve_data_size(buf.len())?;

    validate_section_sizes(&layout)?;

    Ok(WadSections {
        cert_chain: slice(buf, layout.cert_chain_address, layout.cert_chain_size)?,
        ticket: slice(buf, layout.ticket_address, layout.ticket_size)?,
        tmd: slice(buf, layout.tmd_address, layout.tmd_size)?,
        data: slice(buf, layout.data_address, layout.data_size)?,
        meta: if layout.meta_size != 0 { slice(buf, layout.meta_address, layout.meta_size)? } else { &[] },
        layout,
    })
}

fn validate_section_sizes(layout: &WadLayout) -> Result<()> {
    if (layout.ticket_size as usize) < TICKET_SIZE {
        return Err(Error::domain_ctx(Kind::WadHeaderInvalid, "ticket smaller than RVL_Ticket"));
    }
    if layout.ticket_size as usize > WAD_TICKET_SIZE_MAX {
        return Err(Error::domain_ctx(Kind::WadSectionTooBig, "ticket exceeds 64 KiB"));
    }
    if layout.tmd_size as usize > WAD_TMD_SIZE_MAX {
        return Err(Error::domain_ctx(Kind::WadSectionTooBig, "TMD exceeds 1 MiB"));
    }
    if layout.meta_size as usize > WAD_META_SIZE_MAX {
        return Err(Error::domain_ctx(Kind::WadSectionTooBig, "metadata exceeds 1 MiB"));
    }
    if layout.data_size as usize > WAD_DATA_SIZE_MAX {
        return Err(Error::domain_ctx(Kind::WadSectionTooBig, "data exceeds 128 MiB"));
    }
    Ok(())
}

/// The four (or, for a debug target, five) raw certificate blobs a
/// resigned WAD's cert chain is built from, in the order §4.11 requires:
/// CA, TMD, Ticket, and (debug only) the Mastering Server cert. This crate
/// holds no Nintendo certificates, so the caller supplies the exact bytes
/// for the target PKI.
pub struct WadCertChain<'a> {
    pub ca: &'a [u8],
    pub tmd: &'a [u8],
    pub ticket: &'a [u8],
    /// Mastering Server certificate; required when `target` is [`PkiTarget::Debug`].
    pub ms: Option<&'a [u8]>,
}

impl WadCertChain<'_> {
    fn total_len(&self) -> usize {
        self.ca.len() + self.tmd.len() + self.ticket.len() + self.ms.map_or(0, |c| c.len())
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ca);
        out.extend_from_slice(self.tmd);
        out.extend_from_slice(self.ticket);
        if let Some(ms) = self.ms {
            out.extend_from_slice(ms);
        }
    }
}

/// Re-sign a WAD or BWF buffer for `target`, emitting `output_format`.
///
/// Loads the ticket and TMD, recrypts the ticket's title key and rewrites
/// both issuers via the same [`crate::recrypt::ticket::recrypt_ticket`] and
/// [`crate::recrypt::tmd::recrypt_tmd`] the partition-header recrypt engine
/// uses, replaces the certificate chain with `certs` (already in the
/// correct PKI order), and streams the content data through unmodified —
/// the title key changes, but the per-content keys derived from it are
/// unaffected, so re-encrypting the data itself is never necessary.
pub fn wad_resign(src: &[u8], target: PkiTarget, output_format: WadFormat, keys: &Keys, certs: &WadCertChain) -> Result<Vec<u8>> {
    let sections = wad_parse(src)?;

    let mut ticket = sections.ticket.to_vec();
    recrypt_ticket(&mut ticket[..TICKET_SIZE], target, keys)?;

    let mut tmd = sections.tmd.to_vec();
    recrypt_tmd(&mut tmd, target, keys)?;

    let cert_chain_size = certs.total_len() as u32;
    let mut out = Vec::with_capacity(src.len());

    match output_format {
        WadFormat::Standard => {
            let wad_type = if is_boot2_title(&ticket) { WAD_TYPE_IB } else { WAD_TYPE_IS };
            let header = RawWadHeader {
                header_size: HEADER_SIZE.into(),
                wad_type: wad_type.into(),
                cert_chain_size: cert_chain_size.into(),
                crl_size: 0u32.into(),
                ticket_size: (ticket.len() as u32).into(),
                tmd_size: (tmd.len() as u32).into(),
                data_size: (sections.data.len() as u32).into(),
                meta_size: (sections.meta.len() as u32).into(),
            };
            write_standard(&mut out, &header, certs, &ticket, &tmd, sections.data, sections.meta);
        }
        WadFormat::Bwf => {
            let data_offset = HEADER_SIZE as usize
                + align_up(cert_chain_size as usize, 16)
                + align_up(ticket.len(), 16)
                + align_up(tmd.len(), 16);
            let header = RawBwfHeader {
                header_size: HEADER_SIZE.into(),
                data_offset: (data_offset as u32).into(),
                cert_chain_size: cert_chain_size.into(),
                ticket_size: (ticket.len() as u32).into(),
                tmd_size: (tmd.len() as u32).into(),
                meta_size: 0u32.into(),
                meta_cid: 0u32.into(),
                crl_size: 0u32.into(),
            };
            write_bwf(&mut out, &header, certs, &ticket, &tmd, sections.data);
        }
    }

    Ok(out)
}

/// A title ID of `00000001-00000001` is boot2; every other title gets the
/// generic installable-WAD type word.
fn is_boot2_title(ticket: &[u8]) -> bool {
    ticket.get(TITLE_ID_OFFSET..TITLE_ID_OFFSET + 8) == Some(&[0, 0, 0, 1, 0, 0, 0, 1])
}

fn pad_to(out: &mut Vec<u8>, align: usize) {
    let rem = out.len() % align;
    if rem != 0 {
        out.resize(out.len() + (align - rem), 0);
    }
}

fn write_standard(out: &mut Vec<u8>, header: &RawWadHeader, certs: &WadCertChain, ticket: &[u8], tmd: &[u8], data: &[u8], meta: &[u8]) {
    out.extend_from_slice(header.as_bytes());
    pad_to(out, 64);
    certs.write_into(out);
    pad_to(out, 64);
    out.extend_from_slice(ticket);
    pad_to(out, 64);
    out.extend_from_slice(tmd);
    pad_to(out, 64);
    out.extend_from_slice(data);
    if !meta.is_empty() {
        pad_to(out, 64);
        out.extend_from_slice(meta);
    }
    pad_to(out, 64);
}

fn write_bwf(out: &mut Vec<u8>, header: &RawBwfHeader, certs: &WadCertChain, ticket: &[u8], tmd: &[u8], data: &[u8]) {
    out.extend_from_slice(header.as_bytes());
    pad_to(out, 16);
    certs.write_into(out);
    pad_to(out, 16);
    out.extend_from_slice(ticket);
    pad_to(out, 16);
    out.extend_from_slice(tmd);
    pad_to(out, 16);
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes::aes128_cbc_encrypt;

    fn sample_cert(len: usize, fill: u8) -> Vec<u8> { vec![fill; len] }

    fn build_wad(issuer: &str, common_key_index: u8, title_id: [u8; 8], key: [u8; 16], common_key: [u8; 16]) -> Vec<u8> {
        let mut ticket = vec![0u8; TICKET_SIZE];
        ticket[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        ticket[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        ticket[TITLE_ID_OFFSET..TITLE_ID_OFFSET + 8].copy_from_slice(&title_id);
        let mut iv = [0u8; 16];
        iv[0..8].copy_from_slice(&title_id);
        let mut encrypted_key = key;
        aes128_cbc_encrypt(&common_key, &iv, &mut encrypted_key).unwrap();
        ticket[0x1BF..0x1BF + 16].copy_from_slice(&encrypted_key);
        ticket[0x1F1] = common_key_index;

        let mut tmd = vec![0u8; 0x1E4];
        tmd[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());

        let cert_chain = sample_cert(0x400 + 0x300 + 0x300, 0xAB);
        let data = vec![0x42u8; 0x100];

        let header = RawWadHeader {
            header_size: HEADER_SIZE.into(),
            wad_type: WAD_TYPE_IS.into(),
            cert_chain_size: (cert_chain.len() as u32).into(),
            crl_size: 0u32.into(),
            ticket_size: (ticket.len() as u32).into(),
            tmd_size: (tmd.len() as u32).into(),
            data_size: (data.len() as u32).into(),
            meta_size: 0u32.into(),
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(header.as_bytes());
        pad_to(&mut buf, 64);
        buf.extend_from_slice(&cert_chain);
        pad_to(&mut buf, 64);
        buf.extend_from_slice(&ticket);
        pad_to(&mut buf, 64);
        buf.extend_from_slice(&tmd);
        pad_to(&mut buf, 64);
        buf.extend_from_slice(&data);
        pad_to(&mut buf, 64);
        buf
    }

    fn test_keys() -> Keys { Keys::with_common_keys([0x11; 16], [0x22; 16], [0x33; 16]) }

    #[test]
    fn parses_standard_wad_sections() {
        let keys = test_keys();
        let title_id = [0, 0, 0, 1, 0, 0, 0, 5];
        let buf = build_wad("Root-CA00000001-XS00000003", 0, title_id, [0x99; 16], keys.common_retail);
        let sections = wad_parse(&buf).unwrap();
        assert_eq!(sections.ticket.len(), TICKET_SIZE);
        assert_eq!(sections.data, &[0x42u8; 0x100][..]);
    }

    #[test]
    fn resign_to_debug_rewrites_issuers_and_cert_chain_order() {
        let keys = test_keys();
        let title_id = [0, 0, 0, 1, 0, 0, 0, 7];
        let src = build_wad("Root-CA00000001-XS00000003", 0, title_id, [0x99; 16], keys.common_retail);

        let ca = sample_cert(0x400, 1);
        let tmd_cert = sample_cert(0x300, 2);
        let ticket_cert = sample_cert(0x300, 3);
        let ms = sample_cert(0x300, 4);
        let certs = WadCertChain { ca: &ca, tmd: &tmd_cert, ticket: &ticket_cert, ms: Some(&ms) };

        let out = wad_resign(&src, PkiTarget::Debug, WadFormat::Standard, &keys, &certs).unwrap();
        let sections = wad_parse(&out).unwrap();

        let issuer_end = sections.ticket[0x140..0x140 + 0x40].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&sections.ticket[0x140..0x140 + issuer_end], b"Root-CA00000002-XS00000006");

        assert_eq!(sections.cert_chain.len(), ca.len() + tmd_cert.len() + ticket_cert.len() + ms.len());
        assert_eq!(&sections.cert_chain[0..ca.len()], &ca[..]);
        assert_eq!(&sections.cert_chain[ca.len()..ca.len() + tmd_cert.len()], &tmd_cert[..]);
        assert_eq!(&sections.cert_chain[ca.len() + tmd_cert.len()..ca.len() + tmd_cert.len() + ticket_cert.len()], &ticket_cert[..]);
        assert_eq!(&sections.cert_chain[ca.len() + tmd_cert.len() + ticket_cert.len()..], &ms[..]);
    }

    #[test]
    fn resign_to_bwf_uses_explicit_data_offset() {
        let keys = test_keys();
        let title_id = [0, 0, 0, 1, 0, 0, 0, 9];
        let src = build_wad("Root-CA00000002-XS00000006", 0, title_id, [0x55; 16], keys.common_debug);

        let ca = sample_cert(0x400, 1);
        let tmd_cert = sample_cert(0x300, 2);
        let ticket_cert = sample_cert(0x300, 3);
        let certs = WadCertChain { ca: &ca, tmd: &tmd_cert, ticket: &ticket_cert, ms: None };

        let out = wad_resign(&src, PkiTarget::Retail, WadFormat::Bwf, &keys, &certs).unwrap();
        let sections = wad_parse(&out).unwrap();
        assert_eq!(sections.layout.format, WadFormat::Bwf);
        assert_eq!(sections.layout.data_address % 16, 0);
        assert_eq!(sections.data.len(), 0x100);
    }

    #[test]
    fn rejects_oversized_tmd() {
        let keys = test_keys();
        let title_id = [0u8; 8];
        let mut buf = build_wad("Root-CA00000001-XS00000003", 0, title_id, [0; 16], keys.common_retail);
        // Claim a TMD size larger than the 1 MiB limit.
        buf[20..24].copy_from_slice(&(WAD_TMD_SIZE_MAX as u32 + 1).to_be_bytes());
        assert!(wad_parse(&buf).is_err());
    }
}
