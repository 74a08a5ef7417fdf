//! Crate-wide error and result types.

use std::fmt;

/// Domain-specific error kinds.
///
/// These correspond to the positive "domain" return codes of the original
/// tool; unlike that tool, they never share a namespace with OS errno
/// values. See [`Error`] for how the two are unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The bank is empty (type word is all zero).
    BankEmpty,
    /// The bank's type word is not recognized.
    BankUnknown,
    /// The bank is the second half of a dual-layer pair and has no reader.
    BankDlSecond,
    /// The bank is already marked deleted.
    BankAlreadyDeleted,
    /// The bank is not marked deleted.
    BankNotDeleted,
    /// Bank number is out of range for this image.
    BankNumberOutOfRange,
    /// Operation requires a standalone disc image, not an HDD image.
    IsHddImage,
    /// Operation requires an HDD image, not a standalone disc image.
    NotHddImage,
    /// Source image is larger than the destination bank can hold.
    ImageTooBig,
    /// Destination bank is neither Empty nor Deleted.
    BankNotEmptyOrDeleted,
    /// Operation is Wii-only but the image is GameCube.
    NotWii,
    /// Partition (or disc) is not encrypted; recrypt requires an encrypted source.
    IsUnencrypted,
    /// Partition is already encrypted with the requested key.
    AlreadyEncrypted,
    /// The Wii volume group / partition table failed to parse.
    PartitionTableCorrupted,
    /// A Wii partition header failed to parse.
    PartitionHeaderCorrupted,
    /// The issuer string in a signature does not match a known certificate.
    UnknownIssuer,
    /// The signature type field is not RSA-2048 or RSA-4096.
    UnsupportedSignatureType,
    /// A decoded signature does not match expected padding or magic bytes.
    SignatureInvalid,
    /// A decoded signature is fakesigned (SHA-1 mismatch, but leading byte zero).
    ///
    /// Returned as an informational status, not necessarily a hard failure.
    SignatureFakesigned,
    /// Importing the second bank of a dual-layer image into bank 1 of an
    /// extended (>8 bank) table, which is too small.
    DlCannotUseBank1,
    /// Importing a dual-layer image into the last bank (no room for bank 2).
    DlCannotUseLastBank,
    /// The bank following the intended DL bank is not Empty/Deleted.
    DlSecondBankNotFree,
    /// The two halves of a DL import target are not contiguous.
    DlBanksNotContiguous,
    /// Image does not have an NHCD table; the requested write is disabled.
    NoNhcdTable,
    /// Invalid argument passed to a core function.
    InvalidArgument,
    /// The operation was cancelled by the progress callback.
    Cancelled,
    /// A WAD/BWF header's magic, size, or type field didn't parse.
    WadHeaderInvalid,
    /// A WAD section (ticket, TMD, meta, or data) exceeds its maximum size.
    WadSectionTooBig,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::BankEmpty => "bank is empty",
            Kind::BankUnknown => "bank type is unknown",
            Kind::BankDlSecond => "bank is the second half of a dual-layer image",
            Kind::BankAlreadyDeleted => "bank is already deleted",
            Kind::BankNotDeleted => "bank is not deleted",
            Kind::BankNumberOutOfRange => "bank number is out of range",
            Kind::IsHddImage => "operation requires a standalone disc image",
            Kind::NotHddImage => "operation requires an HDD image",
            Kind::ImageTooBig => "image is too big for the destination bank",
            Kind::BankNotEmptyOrDeleted => "destination bank is not empty or deleted",
            Kind::NotWii => "operation is Wii-only",
            Kind::IsUnencrypted => "partition is not encrypted",
            Kind::AlreadyEncrypted => "partition is already encrypted with this key",
            Kind::PartitionTableCorrupted => "partition table is corrupted",
            Kind::PartitionHeaderCorrupted => "partition header is corrupted",
            Kind::UnknownIssuer => "unknown certificate issuer",
            Kind::UnsupportedSignatureType => "unsupported signature type",
            Kind::SignatureInvalid => "signature is invalid",
            Kind::SignatureFakesigned => "signature is fakesigned",
            Kind::DlCannotUseBank1 => "cannot use bank 1 of an extended table for a DL image",
            Kind::DlCannotUseLastBank => "cannot use the last bank for a DL image",
            Kind::DlSecondBankNotFree => "second DL bank is not empty or deleted",
            Kind::DlBanksNotContiguous => "DL destination banks are not contiguous",
            Kind::NoNhcdTable => "image has no NHCD bank table",
            Kind::InvalidArgument => "invalid argument",
            Kind::Cancelled => "operation cancelled",
            Kind::WadHeaderInvalid => "WAD/BWF header is invalid",
            Kind::WadSectionTooBig => "WAD section exceeds its maximum size",
        };
        f.write_str(s)
    }
}

/// Error type for all fallible operations in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A domain-specific error, with an optional human-readable context string.
    #[error("{0}: {1}")]
    Domain(Kind, String),
    /// An I/O error, with context describing what was being attempted.
    #[error("{0}: {1}")]
    Io(String, #[source] std::io::Error),
    /// An unstructured error, used sparingly for conditions not worth a
    /// dedicated [`Kind`].
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Construct a domain error with no extra context.
    pub fn domain(kind: Kind) -> Error { Error::Domain(kind, kind.to_string()) }

    /// Construct a domain error with extra context.
    pub fn domain_ctx(kind: Kind, context: impl Into<String>) -> Error {
        Error::Domain(kind, context.into())
    }

    /// The domain [`Kind`] of this error, if any.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Error::Domain(kind, _) => Some(*kind),
            _ => None,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error { Error::Other(s.to_string()) }
}

impl From<String> for Error {
    fn from(s: String) -> Error { Error::Other(s) }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Helper trait for adding context to errors.
pub trait ErrorContext {
    /// Adds context to an error.
    fn context(self, context: impl Into<String>) -> Error;
}

impl ErrorContext for std::io::Error {
    fn context(self, context: impl Into<String>) -> Error { Error::Io(context.into(), self) }
}

/// Helper trait for adding context to result errors.
pub trait ResultContext<T> {
    /// Adds context to a result error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context to a result error using a closure.
    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String;
}

impl<T> ResultContext<T> for core::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String {
        self.map_err(|e| e.context(f()))
    }
}
