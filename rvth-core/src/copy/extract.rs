//! Extract a bank to a standalone, sparse disc image (§4.8), grounded on
//! `rvth_extract.c`'s buffered, sub-block-sparse copy loop.

use crate::bank::BankEntry;
use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::progress::{report, ProgressKind, ProgressState};
use crate::util::is_block_empty;

use super::{COPY_BUF_LBA, SPARSE_SUBBLOCK_LBA};

/// Extract `entry`'s bank contents into `dest`, a writable, empty file.
///
/// `dest` is pre-sized (sparse) to the bank's full logical length; only
/// non-zero 4 KiB sub-blocks are actually written, so the resulting file's
/// on-disk size reflects real content while its logical size matches the
/// bank exactly.
pub fn extract_bank<'p>(
    entry: &mut BankEntry,
    dest: &RefFile,
    bank_index: usize,
    mut progress: Option<&'p mut (dyn FnMut(&ProgressState) -> bool + 'p)>,
) -> Result<()> {
    if entry.is_empty() {
        return Err(Error::domain(Kind::BankEmpty));
    }
    let reader = entry.reader.as_deref_mut().ok_or_else(|| Error::domain(Kind::BankDlSecond))?;
    let total_lba = reader.len_lba();

    dest.make_writable()?;
    dest.make_sparse(total_lba as u64 * 512)?;

    let mut buf = vec![0u8; COPY_BUF_LBA as usize * 512];
    let mut lba_processed = 0u32;

    while lba_processed < total_lba {
        let this_buf_lba = COPY_BUF_LBA.min(total_lba - lba_processed);
        let buf_slice = &mut buf[0..this_buf_lba as usize * 512];
        reader.read(buf_slice, lba_processed, this_buf_lba)?;

        let mut sub_off = 0u32;
        while sub_off < this_buf_lba {
            let this_sub = SPARSE_SUBBLOCK_LBA.min(this_buf_lba - sub_off);
            let start = sub_off as usize * 512;
            let len = this_sub as usize * 512;
            let chunk = &buf_slice[start..start + len];
            if !is_block_empty(chunk) {
                let dest_offset = (lba_processed + sub_off) as u64 * 512;
                dest.write_at(dest_offset, chunk)?;
            }
            sub_off += this_sub;
        }

        lba_processed += this_buf_lba;
        let keep_going = report(
            progress.as_deref_mut(),
            ProgressState { kind: ProgressKind::Extract, bank: bank_index, bank_other: None, lba_processed, lba_total: total_lba },
        );
        if !keep_going {
            return Err(Error::domain(Kind::Cancelled));
        }
    }

    dest.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::entry::{BankType, CryptoType, SigInfo};
    use crate::reader::PlainReader;

    fn src_file(data: &[u8]) -> RefFile {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rvth-core-extract-src-{:?}", std::thread::current().id()));
        std::fs::write(&path, data).unwrap();
        RefFile::open(&path, false).unwrap()
    }

    fn dest_file() -> (RefFile, std::path::PathBuf) {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rvth-core-extract-dst-{:?}", std::thread::current().id()));
        (RefFile::open(&path, true).unwrap(), path)
    }

    fn bank_with_data(data: &[u8], total_lba: u32) -> BankEntry {
        let file = src_file(data);
        let reader = Box::new(PlainReader::new(file, 0, total_lba));
        BankEntry {
            reader: Some(reader),
            lba_start: 0,
            lba_len: total_lba,
            timestamp: None,
            bank_type: BankType::Gcn,
            is_deleted: false,
            region_code: 0,
            disc_header: None,
            disc_header_raw: [0u8; 0x68],
            crypto_type: CryptoType::None,
            ios_version: 0,
            ticket: SigInfo::default(),
            tmd: SigInfo::default(),
        }
    }

    #[test]
    fn extracts_and_skips_zero_subblocks() {
        let total_lba = 16u32;
        let mut data = vec![0u8; total_lba as usize * 512];
        data[0] = 0xAA; // first sub-block non-empty
        let mut entry = bank_with_data(&data, total_lba);
        let (dest, path) = dest_file();
        extract_bank(&mut entry, &dest, 0, None).unwrap();
        assert_eq!(dest.size().unwrap(), total_lba as u64 * 512);
        let mut readback = vec![0u8; total_lba as usize * 512];
        dest.read_at(0, &mut readback).unwrap();
        assert_eq!(readback, data);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_empty_bank() {
        let mut entry = bank_with_data(&[0u8; 512], 1);
        entry.bank_type = BankType::Empty;
        let (dest, path) = dest_file();
        assert!(extract_bank(&mut entry, &dest, 0, None).is_err());
        std::fs::remove_file(&path).ok();
    }
}
