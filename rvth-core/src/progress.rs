//! Progress callback contract (§4.12, §6) shared by the copy and recrypt engines.

/// Which long-running operation a [`ProgressState`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Extracting a bank to a standalone disc image.
    Extract,
    /// Importing a standalone disc image into a bank.
    Import,
    /// Recrypting a Wii bank's partitions.
    Recrypt,
}

/// A progress update, reported in LBAs (512-byte sectors).
///
/// For [`ProgressKind::Recrypt`] with `lba_total == 1`, the operation is
/// metadata-only (no partition data is being encrypted or decrypted):
/// `lba_processed == 0` means "starting", `1` means "done".
#[derive(Debug, Clone, Copy)]
pub struct ProgressState {
    /// Which operation this update belongs to.
    pub kind: ProgressKind,
    /// Bank number within the primary image.
    pub bank: usize,
    /// Bank number within a secondary (GCM) image, if any (extract/import).
    pub bank_other: Option<usize>,
    /// LBAs processed so far.
    pub lba_processed: u32,
    /// Total LBAs for this operation.
    pub lba_total: u32,
}

/// A progress callback. Returning `false` requests cancellation; engines
/// check the return value after each buffer-sized unit of work and convert
/// a `false` into [`crate::Error`] with [`crate::Kind::Cancelled`].
///
/// `Send` so a GUI collaborator may move a channel sender into this
/// closure from its own device-listener thread (§5); not `Sync`, since the
/// core itself never calls it concurrently.
pub trait ProgressCallback: FnMut(&ProgressState) -> bool + Send {}
impl<F: FnMut(&ProgressState) -> bool + Send> ProgressCallback for F {}

/// Invoke an optional callback, treating "no callback" as "always continue".
pub(crate) fn report<'a, 'b: 'a>(
    callback: Option<&'a mut (dyn FnMut(&ProgressState) -> bool + 'b)>,
    state: ProgressState,
) -> bool {
    match callback {
        Some(cb) => cb(&state),
        None => true,
    }
}
