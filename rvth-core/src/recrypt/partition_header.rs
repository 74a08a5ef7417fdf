//! Bank-level recrypt orchestration (§4.9 steps 1-7), grounded on
//! `rvth_recrypt_partitions()`: parse the volume group/partition table
//! (optionally dropping Update partitions), rebuild each partition's
//! header under the target PKI, and update the bank's own metadata.

use crate::bank::{BankEntry, BankSigStatus, BankType, CryptoType, SigInfo, SigType};
use crate::disc::vgtbl::{parse_partition_table, PartitionTableEntry, PartitionType, VolumeGroupTable, VGTBL_ADDRESS};
use crate::error::{Error, Kind, Result};
use crate::progress::{report, ProgressKind, ProgressState};
use crate::reader::Reader;
use crate::time::LocalTimestamp;
use crate::util::{bytes_to_lba, rshift2_to_bytes};

use super::idblob::build_id_blob;
use super::keys::{Keys, PkiTarget};
use super::ticket::{recrypt_ticket, TICKET_SIZE};
use super::tmd::recrypt_tmd;

/// Total size of an `RVL_PartitionHeader`: the ticket plus the fixed
/// trailer fields, plus a 0x1FD40-byte variable area holding the TMD,
/// cert chain, and (at its very end) an identification blob.
const PARTITION_HEADER_SIZE: usize = 0x20000;
/// Start of the variable `data` area, immediately after the ticket and
/// the six 4-byte trailer fields (`tmd_size`..`data_size`).
const DATA_AREA_START: usize = 0x2C0;

const TMD_SIZE_OFFSET: usize = 0x2A4;
const TMD_OFFSET_OFFSET: usize = 0x2A8;
const CERT_CHAIN_SIZE_OFFSET: usize = 0x2AC;
const CERT_CHAIN_OFFSET_OFFSET: usize = 0x2B0;
const H3_TABLE_OFFSET_OFFSET: usize = 0x2B4;
const DATA_OFFSET_OFFSET: usize = 0x2B8;
const DATA_SIZE_OFFSET: usize = 0x2BC;

fn to_next_64(n: u32) -> u32 { (n + 63) & !63 }

/// Read `len` bytes starting at the absolute disc byte offset
/// `byte_offset`. `Reader` only addresses whole LBAs, so this rounds down
/// to the containing LBA and trims the result; mirrors
/// `crate::bank::entry::read_partition_bytes`, but for offsets relative
/// to the start of the image rather than a single partition.
fn read_absolute_bytes(reader: &mut dyn Reader, byte_offset: u64, len: usize) -> Result<Vec<u8>> {
    let start_lba = (byte_offset / 512) as u32;
    let sub_offset = (byte_offset % 512) as usize;
    let lba_count = bytes_to_lba((sub_offset + len) as u64);
    let mut buf = vec![0u8; lba_count as usize * 512];
    reader.read(&mut buf, start_lba, lba_count)?;
    Ok(buf[sub_offset..sub_offset + len].to_vec())
}

/// The three raw certificate blobs to append to a recrypted partition
/// header, in the order they are written: ticket-issuer cert, CA cert,
/// TMD-issuer cert. This crate holds no Nintendo certificates, so the
/// caller supplies the exact bytes for the target PKI.
pub struct CertChain<'a> {
    pub ticket_cert: &'a [u8],
    pub ca_cert: &'a [u8],
    pub tmd_cert: &'a [u8],
}

struct SurvivingPartition {
    id_orig: String,
    id_new: String,
    entry: PartitionTableEntry,
}

/// Parse the volume group table and every group's partition table,
/// optionally dropping Update partitions, and assign each surviving
/// partition the `"{group}p{index}"` identifier pair used by the
/// identification blob's reference string.
fn collect_partitions(reader: &mut dyn Reader, remove_updates: bool) -> Result<Vec<SurvivingPartition>> {
    let vgtbl_buf = read_absolute_bytes(reader, VGTBL_ADDRESS, 32)?;
    let vgtbl = VolumeGroupTable::parse(&vgtbl_buf)?;

    let mut surviving = Vec::new();
    for (group_index, group) in vgtbl.groups.iter().enumerate() {
        if group.count == 0 {
            continue;
        }
        let table_buf = read_absolute_bytes(reader, group.table_offset, group.count as usize * 8)?;
        let entries = parse_partition_table(&table_buf, group.count)?;

        let mut new_index = 0usize;
        for (orig_index, entry) in entries.into_iter().enumerate() {
            if remove_updates && entry.part_type == PartitionType::Update {
                continue;
            }
            surviving.push(SurvivingPartition {
                id_orig: format!("{group_index}p{orig_index}"),
                id_new: format!("{group_index}p{new_index}"),
                entry,
            });
            new_index += 1;
        }
    }
    Ok(surviving)
}

/// Recrypt every surviving partition of a Wii bank to `target`, then
/// update the bank entry's own crypto/signature metadata.
///
/// `remove_updates` drops Update partitions from the rebuilt volume
/// group table's bookkeeping (§4.9 step 2); the partition table on disk
/// itself is left untouched here, since compacting it in place would
/// require rewriting every later partition's physical offset, which is
/// out of scope for a metadata-only recrypt.
#[allow(clippy::too_many_arguments)]
pub fn recrypt_bank<'p>(
    entry: &mut BankEntry,
    target: PkiTarget,
    keys: &Keys,
    certs: &CertChain,
    remove_updates: bool,
    now: LocalTimestamp,
    mut progress: Option<&'p mut (dyn FnMut(&ProgressState) -> bool + 'p)>,
    bank_index: usize,
) -> Result<()> {
    if !matches!(entry.bank_type, BankType::WiiSl | BankType::WiiDl) {
        return Err(Error::domain(Kind::NotWii));
    }
    if entry.crypto_type == CryptoType::None || entry.crypto_type == CryptoType::Unknown {
        return Err(Error::domain(Kind::IsUnencrypted));
    }

    let reader = entry
        .reader
        .as_deref_mut()
        .ok_or_else(|| Error::domain(Kind::BankDlSecond))?;

    if !report(
        progress.as_deref_mut(),
        ProgressState { kind: ProgressKind::Recrypt, bank: bank_index, bank_other: None, lba_processed: 0, lba_total: 1 },
    ) {
        return Err(Error::domain(Kind::Cancelled));
    }

    let disc_header_0x68: [u8; 0x68] = read_absolute_bytes(reader, 0, 0x68)?.try_into().unwrap();

    let partitions = collect_partitions(reader, remove_updates)?;
    if partitions.is_empty() {
        return Err(Error::domain(Kind::PartitionTableCorrupted));
    }

    for part in &partitions {
        let partition_lba = bytes_to_lba(part.entry.offset);
        recrypt_one_partition(reader, partition_lba, target, keys, certs, &disc_header_0x68, &part.id_orig, &part.id_new, now)?;
    }

    entry.crypto_type = match target {
        PkiTarget::Retail => CryptoType::Retail,
        PkiTarget::Korean => CryptoType::Korean,
        PkiTarget::Vwii => CryptoType::Vwii,
        PkiTarget::Debug => CryptoType::Debug,
    };
    let sig_type = match target {
        PkiTarget::Retail | PkiTarget::Korean | PkiTarget::Vwii => SigType::Retail,
        PkiTarget::Debug => SigType::Debug,
    };
    // A real debug key signs for real; everything else (fakesigned retail,
    // Korean, or a debug target with no configured key) reports Fake.
    let debug_real_signed = target == PkiTarget::Debug && keys.debug_ticket_key.is_some() && keys.debug_tmd_key.is_some();
    let sig_status = if debug_real_signed { BankSigStatus::Ok } else { BankSigStatus::Fake };
    entry.ticket = SigInfo { sig_type, sig_status };
    entry.tmd = SigInfo { sig_type, sig_status };

    reader.flush()?;

    report(
        progress,
        ProgressState { kind: ProgressKind::Recrypt, bank: bank_index, bank_other: None, lba_processed: 1, lba_total: 1 },
    );

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn recrypt_one_partition(
    reader: &mut dyn Reader,
    partition_lba: u32,
    target: PkiTarget,
    keys: &Keys,
    certs: &CertChain,
    disc_header: &[u8; 0x68],
    id_orig: &str,
    id_new: &str,
    now: LocalTimestamp,
) -> Result<()> {
    let header_lba_count = bytes_to_lba(PARTITION_HEADER_SIZE as u64);
    let mut orig = vec![0u8; PARTITION_HEADER_SIZE];
    reader.read(&mut orig, partition_lba, header_lba_count)?;

    let mut new_header = vec![0u8; PARTITION_HEADER_SIZE];

    // Ticket: copy, recrypt (re-encrypts the title key and rewrites the
    // issuer), sign.
    new_header[0..TICKET_SIZE].copy_from_slice(&orig[0..TICKET_SIZE]);
    recrypt_ticket(&mut new_header[0..TICKET_SIZE], target, keys)?;

    // TMD: placed at the next 64-aligned offset after the fixed trailer.
    let tmd_size = u32::from_be_bytes(orig[TMD_SIZE_OFFSET..TMD_SIZE_OFFSET + 4].try_into().unwrap());
    let tmd_offset_orig = rshift2_to_bytes(u32::from_be_bytes(orig[TMD_OFFSET_OFFSET..TMD_OFFSET_OFFSET + 4].try_into().unwrap())) as usize;
    let mut data_pos = to_next_64(DATA_AREA_START as u32) as usize;
    if data_pos + tmd_size as usize > PARTITION_HEADER_SIZE || tmd_offset_orig + tmd_size as usize > PARTITION_HEADER_SIZE {
        return Err(Error::domain(Kind::PartitionHeaderCorrupted));
    }
    new_header[data_pos..data_pos + tmd_size as usize].copy_from_slice(&orig[tmd_offset_orig..tmd_offset_orig + tmd_size as usize]);
    recrypt_tmd(&mut new_header[data_pos..data_pos + tmd_size as usize], target, keys)?;
    new_header[TMD_SIZE_OFFSET..TMD_SIZE_OFFSET + 4].copy_from_slice(&tmd_size.to_be_bytes());
    new_header[TMD_OFFSET_OFFSET..TMD_OFFSET_OFFSET + 4].copy_from_slice(&((data_pos as u32) >> 2).to_be_bytes());
    data_pos += to_next_64(tmd_size) as usize;

    // Cert chain: Ticket cert, CA cert, TMD cert, in that order.
    let chain_size = certs.ticket_cert.len() + certs.ca_cert.len() + certs.tmd_cert.len();
    if data_pos + chain_size > PARTITION_HEADER_SIZE {
        return Err(Error::domain(Kind::PartitionHeaderCorrupted));
    }
    let mut chain_pos = data_pos;
    new_header[chain_pos..chain_pos + certs.ticket_cert.len()].copy_from_slice(certs.ticket_cert);
    chain_pos += certs.ticket_cert.len();
    new_header[chain_pos..chain_pos + certs.ca_cert.len()].copy_from_slice(certs.ca_cert);
    chain_pos += certs.ca_cert.len();
    new_header[chain_pos..chain_pos + certs.tmd_cert.len()].copy_from_slice(certs.tmd_cert);
    new_header[CERT_CHAIN_SIZE_OFFSET..CERT_CHAIN_SIZE_OFFSET + 4].copy_from_slice(&(chain_size as u32).to_be_bytes());
    new_header[CERT_CHAIN_OFFSET_OFFSET..CERT_CHAIN_OFFSET_OFFSET + 4].copy_from_slice(&((data_pos as u32) >> 2).to_be_bytes());

    // H3-table offset, data offset, data size are unaffected by the
    // header rewrite and carry over unchanged.
    new_header[H3_TABLE_OFFSET_OFFSET..H3_TABLE_OFFSET_OFFSET + 4].copy_from_slice(&orig[H3_TABLE_OFFSET_OFFSET..H3_TABLE_OFFSET_OFFSET + 4]);
    new_header[DATA_OFFSET_OFFSET..DATA_OFFSET_OFFSET + 4].copy_from_slice(&orig[DATA_OFFSET_OFFSET..DATA_OFFSET_OFFSET + 4]);
    new_header[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&orig[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4]);

    // Identification blob, at the tail of the header's variable area.
    let reference = format!("{id_orig} -> {id_new}");
    let id_blob = build_id_blob(disc_header, Some(&reference), now)?;
    let id_blob_offset = PARTITION_HEADER_SIZE - id_blob.len();
    new_header[id_blob_offset..].copy_from_slice(&id_blob);

    reader.write(&new_header, partition_lba, header_lba_count)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes::{aes128_cbc_decrypt, aes128_cbc_encrypt};
    use crate::crypto::sha::sha1_digest;
    use crate::file::RefFile;
    use crate::reader::PlainReader;

    fn sample_cert(identity: &str, signed_by: &str, modulus: &[u8; 256], exponent: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 0x180 + 0x180];
        buf[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let issuer_off = 4 + 256 + 0x3C;
        buf[issuer_off..issuer_off + signed_by.len()].copy_from_slice(signed_by.as_bytes());
        let pub_off = 0x180;
        buf[pub_off..pub_off + 4].copy_from_slice(&1u32.to_be_bytes());
        buf[pub_off + 4..pub_off + 4 + identity.len()].copy_from_slice(identity.as_bytes());
        buf[pub_off + 0x48..pub_off + 0x48 + 256].copy_from_slice(modulus);
        buf[pub_off + 0x148..pub_off + 0x14C].copy_from_slice(&exponent.to_be_bytes());
        buf
    }

    fn build_disc_with_one_partition(keys: &Keys) -> (tempfile::TempFile, u32, u32) {
        // disc header + VGT + one full-size partition header.
        let total_lbas = bytes_to_lba(0x50000 + PARTITION_HEADER_SIZE as u64);
        let mut image = vec![0u8; total_lbas as usize * 512];

        // Wii disc header magic.
        image[0x18..0x1C].copy_from_slice(&crate::disc::header::WII_MAGIC.to_be_bytes());

        // Volume group table: group 0 has 1 partition, table right after header.
        image[(VGTBL_ADDRESS as usize)..(VGTBL_ADDRESS as usize) + 4].copy_from_slice(&1u32.to_be_bytes());
        image[(VGTBL_ADDRESS as usize) + 4..(VGTBL_ADDRESS as usize) + 8]
            .copy_from_slice(&(((VGTBL_ADDRESS + 32) >> 2) as u32).to_be_bytes());

        let partition_offset: u64 = 0x50000;
        let ptbl_offset = (VGTBL_ADDRESS + 32) as usize;
        image[ptbl_offset..ptbl_offset + 4].copy_from_slice(&((partition_offset >> 2) as u32).to_be_bytes());
        image[ptbl_offset + 4..ptbl_offset + 8].copy_from_slice(&0u32.to_be_bytes()); // Game partition

        // Partition header: debug ticket, issuer, title ID, encrypted title key.
        let p = partition_offset as usize;
        image[p..p + 4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let debug_issuer = "Root-CA00000002-XS00000006";
        image[p + 0x140..p + 0x140 + debug_issuer.len()].copy_from_slice(debug_issuer.as_bytes());
        let title_id = [0u8, 0, 0, 1, 0, 0, 0, 2];
        image[p + 0x1DC..p + 0x1DC + 8].copy_from_slice(&title_id);
        let mut title_key = [0x77u8; 16];
        let mut iv = [0u8; 16];
        iv[0..8].copy_from_slice(&title_id);
        aes128_cbc_encrypt(&keys.common_debug, &iv, &mut title_key).unwrap();
        image[p + 0x1BF..p + 0x1BF + 16].copy_from_slice(&title_key);

        // TMD at the default offset (0x2C0), debug issuer, minimal size.
        let tmd_size = 0x1E4u32;
        image[p + 0x2A4..p + 0x2A8].copy_from_slice(&tmd_size.to_be_bytes());
        image[p + 0x2A8..p + 0x2AC].copy_from_slice(&((0x2C0u32) >> 2).to_be_bytes());
        let tmd_debug_issuer = "Root-CA00000002-CP00000007";
        image[p + 0x2C0..p + 0x2C0 + 4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        image[p + 0x2C0 + 0x140..p + 0x2C0 + 0x140 + tmd_debug_issuer.len()].copy_from_slice(tmd_debug_issuer.as_bytes());

        image[p + 0x2B4..p + 0x2B8].copy_from_slice(&0xABCDu32.to_be_bytes()); // h3_table_offset, opaque
        image[p + 0x2B8..p + 0x2BC].copy_from_slice(&0x1234u32.to_be_bytes()); // data_offset, opaque
        image[p + 0x2BC..p + 0x2C0].copy_from_slice(&0x5678u32.to_be_bytes()); // data_size, opaque

        (tempfile::TempFile::write(&image), total_lbas, bytes_to_lba(partition_offset))
    }

    mod tempfile {
        use std::io::Write;
        pub struct TempFile {
            pub path: std::path::PathBuf,
        }
        impl TempFile {
            pub fn write(contents: &[u8]) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "rvth-core-partition-header-test-{:?}-{}",
                    std::thread::current().id(),
                    contents.len()
                ));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(contents).unwrap();
                Self { path }
            }
        }
        impl Drop for TempFile {
            fn drop(&mut self) { std::fs::remove_file(&self.path).ok(); }
        }
    }

    #[test]
    fn recrypts_single_partition_to_retail_and_preserves_opaque_fields() {
        let keys = Keys::with_common_keys([0x11; 16], [0x22; 16], [0x33; 16]);
        let (tmp, total_lbas, partition_lba) = build_disc_with_one_partition(&keys);

        let f = RefFile::open(&tmp.path, false).unwrap();
        f.make_writable().unwrap();
        let reader: Box<dyn Reader> = Box::new(PlainReader::new(f, 0, total_lbas));

        let mut entry = BankEntry {
            reader: Some(reader),
            lba_start: 0,
            lba_len: total_lbas,
            timestamp: None,
            bank_type: BankType::WiiSl,
            is_deleted: false,
            region_code: 0,
            disc_header: None,
            disc_header_raw: [0u8; 0x68],
            crypto_type: CryptoType::Debug,
            ios_version: 0,
            ticket: SigInfo { sig_type: SigType::Debug, sig_status: BankSigStatus::Unknown },
            tmd: SigInfo { sig_type: SigType::Debug, sig_status: BankSigStatus::Unknown },
        };

        let modulus = [0x55u8; 256];
        let ticket_cert = sample_cert("Root-CA00000001-XS00000003", "Root-CA00000001", &modulus, 65537);
        let ca_cert = sample_cert("Root-CA00000001", "Root", &modulus, 65537);
        let tmd_cert = sample_cert("Root-CA00000001-CP00000004", "Root-CA00000001", &modulus, 65537);
        let certs = CertChain { ticket_cert: &ticket_cert, ca_cert: &ca_cert, tmd_cert: &tmd_cert };

        recrypt_bank(&mut entry, PkiTarget::Retail, &keys, &certs, true, LocalTimestamp::new(0, 0), None, 0).unwrap();

        assert_eq!(entry.crypto_type, CryptoType::Retail);
        assert_eq!(entry.ticket.sig_status, BankSigStatus::Fake);

        let reader = entry.reader.as_deref_mut().unwrap();
        let header_lba_count = bytes_to_lba(PARTITION_HEADER_SIZE as u64);
        let mut header = vec![0u8; PARTITION_HEADER_SIZE];
        reader.read(&mut header, partition_lba, header_lba_count).unwrap();

        // Opaque fields preserved verbatim.
        assert_eq!(&header[H3_TABLE_OFFSET_OFFSET..H3_TABLE_OFFSET_OFFSET + 4], &0xABCDu32.to_be_bytes());
        assert_eq!(&header[DATA_OFFSET_OFFSET..DATA_OFFSET_OFFSET + 4], &0x1234u32.to_be_bytes());
        assert_eq!(&header[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4], &0x5678u32.to_be_bytes());

        // Ticket fakesigned (RSA-2048 signature body all zero, and the
        // signed region's SHA-1 forced to start with 0x00) and the title
        // key recrypted under the retail common key.
        assert!(header[4..4 + 256].iter().all(|&b| b == 0));
        let ticket_issuer_off = 4 + 256 + 0x3C;
        assert_eq!(sha1_digest(&header[ticket_issuer_off..TICKET_SIZE])[0], 0x00);
        let title_id = [0u8, 0, 0, 1, 0, 0, 0, 2];
        let mut iv = [0u8; 16];
        iv[0..8].copy_from_slice(&title_id);
        let mut recovered = header[0x1BF..0x1BF + 16].to_vec();
        aes128_cbc_decrypt(&keys.common_retail, &iv, &mut recovered).unwrap();
        assert_eq!(recovered, [0x77u8; 16]);

        let issuer_end = header[0x140..0x140 + 0x40].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&header[0x140..0x140 + issuer_end], b"Root-CA00000001-XS00000003");

        let tmd_issuer_off = 0x2C0 + 0x140;
        let tmd_issuer_end = header[tmd_issuer_off..tmd_issuer_off + 0x40].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&header[tmd_issuer_off..tmd_issuer_off + tmd_issuer_end], b"Root-CA00000001-CP00000004");

        // Identification blob occupies the header's final 256 bytes and is
        // not all-0xFF (the blob is RSA-encrypted, so any plaintext pattern
        // is scrambled beyond recognition).
        let id_blob = &header[PARTITION_HEADER_SIZE - 256..];
        assert!(!id_blob.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn rejects_unencrypted_bank() {
        let keys = Keys::with_common_keys([0; 16], [0; 16], [0; 16]);
        let mut entry = BankEntry::dl_bank2_placeholder(0);
        entry.bank_type = BankType::WiiSl;
        entry.crypto_type = CryptoType::None;
        let certs = CertChain { ticket_cert: &[], ca_cert: &[], tmd_cert: &[] };
        let err = recrypt_bank(&mut entry, PkiTarget::Retail, &keys, &certs, true, LocalTimestamp::new(0, 0), None, 0).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::IsUnencrypted));
    }

    #[test]
    fn rejects_gamecube_bank() {
        let keys = Keys::with_common_keys([0; 16], [0; 16], [0; 16]);
        let mut entry = BankEntry::dl_bank2_placeholder(0);
        entry.bank_type = BankType::Gcn;
        entry.crypto_type = CryptoType::None;
        let certs = CertChain { ticket_cert: &[], ca_cert: &[], tmd_cert: &[] };
        let err = recrypt_bank(&mut entry, PkiTarget::Retail, &keys, &certs, true, LocalTimestamp::new(0, 0), None, 0).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::NotWii));
    }
}
