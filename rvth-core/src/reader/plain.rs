//! Direct passthrough reader (§4.4).
//!
//! Used for raw block devices and uncompacted disc images. Every
//! operation seeks explicitly first since the underlying [`RefFile`]
//! handle may be shared with other readers or bank entries.

use crate::error::Result;
use crate::file::RefFile;
use crate::util::LBA_SIZE;

use super::{check_bounds, Reader};

pub struct PlainReader {
    file: RefFile,
    start_lba: u32,
    len_lba: u32,
}

impl PlainReader {
    pub fn new(file: RefFile, start_lba: u32, len_lba: u32) -> PlainReader {
        PlainReader { file, start_lba, len_lba }
    }
}

impl Reader for PlainReader {
    fn read(&mut self, dst: &mut [u8], lba: u32, len: u32) -> Result<u32> {
        check_bounds(lba, len, self.len_lba)?;
        let offset = (self.start_lba as u64 + lba as u64) * LBA_SIZE;
        self.file.read_at(offset, &mut dst[..(len as u64 * LBA_SIZE) as usize])?;
        Ok(len)
    }

    fn write(&mut self, src: &[u8], lba: u32, len: u32) -> Result<u32> {
        check_bounds(lba, len, self.len_lba)?;
        self.file.make_writable()?;
        let offset = (self.start_lba as u64 + lba as u64) * LBA_SIZE;
        self.file.write_at(offset, &src[..(len as u64 * LBA_SIZE) as usize])?;
        Ok(len)
    }

    fn flush(&mut self) -> Result<()> { self.file.flush() }

    fn len_lba(&self) -> u32 { self.len_lba }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(data: &[u8]) -> RefFile {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rvth-core-plain-reader-test-{:?}", std::thread::current().id()));
        std::fs::write(&path, data).unwrap();
        RefFile::open(&path, false).unwrap()
    }

    #[test]
    fn reads_within_bounds() {
        let data = vec![0xAB; 4 * 512];
        let file = fixture(&data);
        let mut reader = PlainReader::new(file, 0, 4);
        let mut dst = vec![0u8; 2 * 512];
        let n = reader.read(&mut dst, 1, 2).unwrap();
        assert_eq!(n, 2);
        assert!(dst.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn rejects_out_of_bounds_read() {
        let data = vec![0u8; 2 * 512];
        let file = fixture(&data);
        let mut reader = PlainReader::new(file, 0, 2);
        let mut dst = vec![0u8; 2 * 512];
        assert!(reader.read(&mut dst, 1, 2).is_err());
    }
}
