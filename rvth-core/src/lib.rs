//! Core library for reading, copying, and re-signing Nintendo RVT-H Reader
//! disc images and bank tables.
//!
//! Currently supported containers:
//! - RVT-H HDD images (multi-bank, NHCD table)
//! - Standalone GameCube/Wii disc images (GCM, CISO, WBFS)
//!
//! # Examples
//!
//! Listing the banks of an HDD image:
//!
//! ```no_run
//! let rvth = rvth_core::RvtH::open("rvth.img", rvth_core::OpenOptions::default())
//!     .expect("failed to open image");
//! for (i, bank) in rvth.banks().iter().enumerate() {
//!     println!("bank {i}: {:?}", bank.bank_type);
//! }
//! ```

use std::path::Path;

pub mod bank;
pub mod cert;
pub mod copy;
pub mod crypto;
pub mod disc;
pub mod error;
pub mod file;
pub mod progress;
pub mod reader;
pub mod recrypt;
pub mod time;
pub mod util;
pub mod wad;

pub use bank::{BankEntry, BankSigStatus, BankType, CryptoType, SigInfo, SigType};
pub use cert::CertStore;
pub use error::{Error, ErrorContext, Kind, Result, ResultContext};
pub use progress::{ProgressKind, ProgressState};
pub use recrypt::{Keys, PkiTarget};
pub use wad::{wad_parse, wad_resign, WadCertChain, WadFormat};

use bank::table::{
    self, NhcdBankEntry, NHCD_BANK_TYPE_GCN, NHCD_BANK_TYPE_WII_DL, NHCD_BANK_TYPE_WII_SL, BANK_GCN_SIZE_LBA,
    BANK_WII_DL_SIZE_LBA, BANK_WII_SL_SIZE_LBA, EXTBANKTABLE_BANK1_SIZE_LBA,
};
use file::RefFile;
use reader::open_reader;
use recrypt::CertChain;
use time::{emit_timestamp, parse_timestamp};

/// Options controlling how an image is opened and how later operations on
/// it behave.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Verify ticket/TMD signatures against `cert_store` while deriving bank
    /// metadata (§4.7). When `false`, crypto type is still derived from the
    /// common-key index and ticket issuer, but signature status is always
    /// reported as `Unknown`.
    pub validate_signatures: bool,
    /// Certificate chain used for signature verification. Empty by default:
    /// this crate ships no embedded Nintendo certificates, so a caller that
    /// wants real verification must supply one (see [`CertStore::from_bytes`]).
    pub cert_store: CertStore,
}

impl Default for OpenOptions {
    fn default() -> Self { OpenOptions { validate_signatures: true, cert_store: CertStore::empty() } }
}

/// An open RVT-H image: either a multi-bank HDD image or a standalone
/// single-bank disc image.
pub struct RvtH {
    file: RefFile,
    is_hdd: bool,
    banks: Vec<BankEntry>,
    cert_store: CertStore,
}

fn default_bank_len(bank_type: u32, index: u32, bank_count: u32) -> u32 {
    match bank_type {
        NHCD_BANK_TYPE_GCN => {
            if index == 1 && bank_count > table::BANK_MIN_COUNT {
                EXTBANKTABLE_BANK1_SIZE_LBA
            } else {
                BANK_GCN_SIZE_LBA
            }
        }
        NHCD_BANK_TYPE_WII_DL => BANK_WII_DL_SIZE_LBA,
        _ => BANK_WII_SL_SIZE_LBA,
    }
}

impl RvtH {
    /// Open an RVT-H HDD image or standalone disc image from `path`.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<RvtH> {
        let file = RefFile::open(&path, false)?;
        // Signature verification is entirely driven by which certificates
        // `derive_crypto` can see; disabling it means presenting an empty
        // store so every `cert_verify` call resolves to `SigStatus::Unknown`.
        let cert_store = if options.validate_signatures { options.cert_store } else { CertStore::empty() };
        match table::read_nhcd_header(&file)? {
            Some(header) => Self::open_hdd(file, header.bank_count, cert_store),
            None => Self::open_standalone(file, cert_store),
        }
    }

    fn open_hdd(file: RefFile, bank_count: u32, cert_store: CertStore) -> Result<RvtH> {
        let mut banks = Vec::with_capacity(bank_count as usize);
        let mut index = 0u32;
        while index < bank_count {
            let raw: NhcdBankEntry = table::read_bank_entry(&file, index)?;
            let lba_start = if raw.lba_start != 0 { raw.lba_start } else { table::default_bank_start_lba(index, bank_count) };
            let lba_len = if raw.lba_len != 0 { raw.lba_len } else { default_bank_len(raw.bank_type, index, bank_count) };
            let timestamp = parse_timestamp(&raw.timestamp);

            let reader = open_reader(file.clone(), lba_start, lba_len)?;
            let entry = BankEntry::from_reader(reader, lba_start, timestamp, &cert_store)?;
            let is_dl = matches!(entry.bank_type, BankType::WiiDl);
            banks.push(entry);
            index += 1;

            if is_dl && index < bank_count {
                banks.push(BankEntry::dl_bank2_placeholder(lba_start + BANK_WII_SL_SIZE_LBA));
                index += 1;
            }
        }
        Ok(RvtH { file, is_hdd: true, banks, cert_store })
    }

    fn open_standalone(file: RefFile, cert_store: CertStore) -> Result<RvtH> {
        let size = file.size()?;
        let lba_len = (size / 512) as u32;
        let reader = open_reader(file.clone(), 0, lba_len)?;
        let timestamp = file.mtime().ok();
        let entry = BankEntry::from_reader(reader, 0, timestamp, &cert_store)?;
        Ok(RvtH { file, is_hdd: false, banks: vec![entry], cert_store })
    }

    /// True if this image is a multi-bank RVT-H HDD image rather than a
    /// standalone disc image.
    pub fn is_hdd(&self) -> bool { self.is_hdd }

    /// All banks, in table order. A standalone image always has exactly one.
    pub fn banks(&self) -> &[BankEntry] { &self.banks }

    /// The bank at `index`, if it exists.
    pub fn bank(&self, index: usize) -> Result<&BankEntry> {
        self.banks.get(index).ok_or_else(|| Error::domain(Kind::BankNumberOutOfRange))
    }

    /// The bank at `index`, mutably, if it exists.
    pub fn bank_mut(&mut self, index: usize) -> Result<&mut BankEntry> {
        self.banks.get_mut(index).ok_or_else(|| Error::domain(Kind::BankNumberOutOfRange))
    }

    fn nhcd_type_for(bank_type: BankType) -> u32 {
        match bank_type {
            BankType::Gcn => NHCD_BANK_TYPE_GCN,
            BankType::WiiSl => NHCD_BANK_TYPE_WII_SL,
            BankType::WiiDl => NHCD_BANK_TYPE_WII_DL,
            _ => 0,
        }
    }

    /// Rewrite bank `index`'s NHCD table slot from its current in-memory
    /// state. No-op on a standalone image.
    fn rewrite_table_entry(&self, index: usize) -> Result<()> {
        if !self.is_hdd {
            return Ok(());
        }
        let entry = self.bank(index)?;
        self.file.make_writable()?;
        let mut timestamp = [0u8; 14];
        if let Some(ts) = entry.timestamp {
            timestamp.copy_from_slice(emit_timestamp(ts).as_bytes());
        }
        table::write_bank_entry(
            &self.file,
            index as u32,
            &NhcdBankEntry {
                bank_type: Self::nhcd_type_for(entry.bank_type),
                timestamp,
                lba_start: entry.lba_start,
                lba_len: entry.lba_len,
            },
        )
    }

    /// Extract bank `index` to a standalone file at `dest_path` (§4.8).
    pub fn extract(
        &mut self,
        index: usize,
        dest_path: impl AsRef<Path>,
        progress: Option<&mut dyn FnMut(&ProgressState) -> bool>,
    ) -> Result<()> {
        let dest = RefFile::open(dest_path, true)?;
        let entry = self.bank_mut(index)?;
        copy::extract_bank(entry, &dest, index, progress)
    }

    /// Import a standalone disc image at `src_path` into bank `index`
    /// (§4.8). `index` must currently be Empty or Deleted.
    pub fn import(
        &mut self,
        index: usize,
        src_path: impl AsRef<Path>,
        src_crypto: Option<CryptoType>,
        progress: Option<&mut dyn FnMut(&ProgressState) -> bool>,
    ) -> Result<()> {
        let src = RefFile::open(src_path, false)?;
        let src_lba_len = (src.size()? / 512) as u32;

        let lba_start = self.bank(index)?.lba_start;
        let lba_len = self.bank(index)?.lba_len;
        {
            let entry = self.bank(index)?;
            let mut dest_writer = open_reader(self.file.clone(), lba_start, lba_len)?;
            copy::import_bank(entry, dest_writer.as_mut(), &src, src_lba_len, src_crypto, index, progress)?;
        }

        // Re-derive the bank's full metadata from its freshly written
        // content rather than patching fields by hand.
        let reader = open_reader(self.file.clone(), lba_start, lba_len)?;
        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).ok();
        *self.bank_mut(index)? = BankEntry::from_reader(reader, lba_start, now, &self.cert_store)?;
        self.rewrite_table_entry(index)
    }

    /// Delete bank `index` (§4.8). Requires an HDD image.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        if !self.is_hdd {
            return Err(Error::domain(Kind::NotHddImage));
        }
        let bank_index = index as u32;
        let file = self.file.clone();
        let entry = self.bank_mut(index)?;
        copy::delete_bank(&file, bank_index, entry)
    }

    /// Undelete bank `index` (§4.8). Requires an HDD image.
    pub fn undelete(&mut self, index: usize) -> Result<()> {
        if !self.is_hdd {
            return Err(Error::domain(Kind::NotHddImage));
        }
        let bank_index = index as u32;
        let file = self.file.clone();
        let entry = self.bank_mut(index)?;
        copy::undelete_bank(&file, bank_index, entry)
    }

    /// Re-encrypt bank `index`'s Wii partitions to `target`'s PKI (§4.9).
    #[allow(clippy::too_many_arguments)]
    pub fn recrypt(
        &mut self,
        index: usize,
        target: PkiTarget,
        keys: &Keys,
        certs: &CertChain,
        remove_updates: bool,
        now: time::LocalTimestamp,
        progress: Option<&mut dyn FnMut(&ProgressState) -> bool>,
    ) -> Result<()> {
        let entry = self.bank_mut(index)?;
        recrypt::recrypt_bank(entry, target, keys, certs, remove_updates, now, progress, index)?;
        self.rewrite_table_entry(index)
    }
}
