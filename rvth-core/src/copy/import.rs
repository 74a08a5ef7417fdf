//! Import a standalone disc image into an HDD bank (§4.8).

use crate::bank::entry::{BankType, CryptoType};
use crate::bank::BankEntry;
use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::progress::{report, ProgressKind, ProgressState};

use super::COPY_BUF_LBA;

/// Import `src` (already opened, `src_lba_len` LBAs long) into `dest`
/// (a bank entry's underlying writer), which must be Empty or Deleted.
///
/// Refuses sources larger than the destination bank and Wii sources whose
/// crypto is neither `None` nor `Debug` (the recrypt engine must run
/// first). Unlike extraction, no sparsity detection is performed: the
/// exact source length is copied.
pub fn import_bank<'p>(
    dest_entry: &BankEntry,
    dest_writer: &mut dyn crate::reader::Reader,
    src: &RefFile,
    src_lba_len: u32,
    src_crypto: Option<CryptoType>,
    bank_index: usize,
    mut progress: Option<&'p mut (dyn FnMut(&ProgressState) -> bool + 'p)>,
) -> Result<()> {
    if !matches!(dest_entry.bank_type, BankType::Empty) && !dest_entry.is_deleted {
        return Err(Error::domain(Kind::BankNotEmptyOrDeleted));
    }
    if let Some(crypto) = src_crypto {
        if !matches!(crypto, CryptoType::None | CryptoType::Debug) {
            return Err(Error::domain_ctx(Kind::AlreadyEncrypted, "source must be recrypted to None or Debug before import"));
        }
    }
    if src_lba_len > dest_writer.len_lba() {
        return Err(Error::domain(Kind::ImageTooBig));
    }

    let mut buf = vec![0u8; COPY_BUF_LBA as usize * 512];
    let mut lba_processed = 0u32;
    while lba_processed < src_lba_len {
        let this_lba = COPY_BUF_LBA.min(src_lba_len - lba_processed);
        let buf_slice = &mut buf[0..this_lba as usize * 512];
        src.read_at(lba_processed as u64 * 512, buf_slice)?;
        dest_writer.write(buf_slice, lba_processed, this_lba)?;

        lba_processed += this_lba;
        let keep_going = report(
            progress.as_deref_mut(),
            ProgressState { kind: ProgressKind::Import, bank: bank_index, bank_other: None, lba_processed, lba_total: src_lba_len },
        );
        if !keep_going {
            return Err(Error::domain(Kind::Cancelled));
        }
    }
    dest_writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::entry::SigInfo;
    use crate::reader::PlainReader;

    fn file_with(data: &[u8]) -> RefFile {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rvth-core-import-test-{:?}", std::thread::current().id()));
        std::fs::write(&path, data).unwrap();
        RefFile::open(&path, true).unwrap()
    }

    fn empty_entry() -> BankEntry {
        BankEntry {
            reader: None,
            lba_start: 0,
            lba_len: 8,
            timestamp: None,
            bank_type: BankType::Empty,
            is_deleted: false,
            region_code: 0xFF,
            disc_header: None,
            disc_header_raw: [0u8; 0x68],
            crypto_type: CryptoType::Unknown,
            ios_version: 0,
            ticket: SigInfo::default(),
            tmd: SigInfo::default(),
        }
    }

    #[test]
    fn imports_into_empty_bank() {
        let dest_entry = empty_entry();
        let dest_file = file_with(&vec![0u8; 8 * 512]);
        let mut dest_writer = PlainReader::new(dest_file.clone(), 0, 8);

        let src_data = vec![0x77u8; 4 * 512];
        let src = file_with(&src_data);

        import_bank(&dest_entry, &mut dest_writer, &src, 4, Some(CryptoType::None), 0, None).unwrap();
        let mut readback = vec![0u8; 4 * 512];
        dest_file.read_at(0, &mut readback).unwrap();
        assert_eq!(readback, src_data);
    }

    #[test]
    fn rejects_oversized_source() {
        let dest_entry = empty_entry();
        let dest_file = file_with(&vec![0u8; 8 * 512]);
        let mut dest_writer = PlainReader::new(dest_file, 0, 8);
        let src = file_with(&vec![0u8; 16 * 512]);
        assert!(import_bank(&dest_entry, &mut dest_writer, &src, 16, None, 0, None).is_err());
    }

    #[test]
    fn rejects_encrypted_source() {
        let dest_entry = empty_entry();
        let dest_file = file_with(&vec![0u8; 8 * 512]);
        let mut dest_writer = PlainReader::new(dest_file, 0, 8);
        let src = file_with(&vec![0u8; 4 * 512]);
        assert!(import_bank(&dest_entry, &mut dest_writer, &src, 4, Some(CryptoType::Retail), 0, None).is_err());
    }
}
