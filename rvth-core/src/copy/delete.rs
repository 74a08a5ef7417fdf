//! Delete/undelete a bank-table slot (§4.8).

use crate::bank::entry::BankType;
use crate::bank::table::{
    self, NhcdBankEntry, NHCD_BANK_TYPE_EMPTY, NHCD_BANK_TYPE_GCN, NHCD_BANK_TYPE_WII_DL, NHCD_BANK_TYPE_WII_SL,
};
use crate::bank::BankEntry;
use crate::error::{Error, Kind, Result};
use crate::file::RefFile;
use crate::time::emit_timestamp;

/// Mark `entry` deleted and zero its NHCD table slot. The bank's content
/// is untouched; only the table entry and the in-memory flag change.
pub fn delete_bank(hdd_file: &RefFile, bank_index: u32, entry: &mut BankEntry) -> Result<()> {
    if entry.is_deleted {
        return Err(Error::domain(Kind::BankAlreadyDeleted));
    }
    if matches!(entry.bank_type, BankType::Empty) {
        return Err(Error::domain(Kind::BankEmpty));
    }
    hdd_file.make_writable()?;
    table::zero_bank_entry(hdd_file, bank_index)?;
    entry.is_deleted = true;
    Ok(())
}

/// Clear the deleted flag, restore the cached disc header to LBA 0 of the
/// bank if its on-disk content differs, and rewrite the table entry.
pub fn undelete_bank(hdd_file: &RefFile, bank_index: u32, entry: &mut BankEntry) -> Result<()> {
    if !entry.is_deleted {
        return Err(Error::domain(Kind::BankNotDeleted));
    }

    if let Some(reader) = entry.reader.as_deref_mut() {
        let mut current = [0u8; 512];
        reader.read(&mut current, 0, 1)?;
        if current[0..0x68] != entry.disc_header_raw {
            let mut restored = [0u8; 512];
            restored[0..0x68].copy_from_slice(&entry.disc_header_raw);
            restored[0x68..].copy_from_slice(&current[0x68..]);
            reader.write(&restored, 0, 1)?;
        }
    }

    hdd_file.make_writable()?;
    let nhcd_type = match entry.bank_type {
        BankType::Gcn => NHCD_BANK_TYPE_GCN,
        BankType::WiiSl => NHCD_BANK_TYPE_WII_SL,
        BankType::WiiDl => NHCD_BANK_TYPE_WII_DL,
        _ => NHCD_BANK_TYPE_EMPTY,
    };
    let mut timestamp = [0u8; 14];
    if let Some(ts) = entry.timestamp {
        timestamp.copy_from_slice(emit_timestamp(ts).as_bytes());
    }
    table::write_bank_entry(
        hdd_file,
        bank_index,
        &NhcdBankEntry { bank_type: nhcd_type, timestamp, lba_start: entry.lba_start, lba_len: entry.lba_len },
    )?;
    entry.is_deleted = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::entry::{CryptoType, SigInfo};
    use crate::bank::table::{encode_nhcd_header, NhcdHeader, NHCD_BANKTABLE_LBA};

    fn fixture() -> RefFile {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rvth-core-delete-test-{:?}", std::thread::current().id()));
        let total_lba = NHCD_BANKTABLE_LBA + 1 + 8;
        let mut data = vec![0u8; total_lba as usize * 512];
        let off = NHCD_BANKTABLE_LBA as usize * 512;
        data[off..off + 512].copy_from_slice(&encode_nhcd_header(&NhcdHeader { version: 1, bank_count: 8 }));
        std::fs::write(&path, &data).unwrap();
        RefFile::open(&path, false).unwrap()
    }

    fn entry(bank_type: BankType, is_deleted: bool) -> BankEntry {
        BankEntry {
            reader: None,
            lba_start: 0x400000,
            lba_len: 100,
            timestamp: Some(0),
            bank_type,
            is_deleted,
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
    fn delete_zeroes_slot_and_marks_flag() {
        let file = fixture();
        let mut e = entry(BankType::Gcn, false);
        delete_bank(&file, 0, &mut e).unwrap();
        assert!(e.is_deleted);
        let raw = table::read_bank_entry(&file, 0).unwrap();
        assert_eq!(raw.bank_type, 0);
        assert_eq!(raw.lba_start, 0);
    }

    #[test]
    fn delete_twice_fails() {
        let file = fixture();
        let mut e = entry(BankType::Gcn, true);
        assert!(delete_bank(&file, 0, &mut e).is_err());
    }

    #[test]
    fn undelete_rewrites_entry() {
        let file = fixture();
        let mut e = entry(BankType::Gcn, true);
        undelete_bank(&file, 0, &mut e).unwrap();
        assert!(!e.is_deleted);
        let raw = table::read_bank_entry(&file, 0).unwrap();
        assert_eq!(raw.bank_type, NHCD_BANK_TYPE_GCN);
        assert_eq!(raw.lba_start, 0x400000);
        assert_eq!(raw.lba_len, 100);
    }
}
