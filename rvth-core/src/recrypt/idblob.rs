//! Identification blob embedding (§4.10), grounded on `rvth_create_id()`:
//! a small plaintext record (free-text note plus a disc-header copy)
//! encrypted under a fixed RSA public key and stamped into the recrypted
//! partition header so a re-encrypted image can be traced back to the
//! tool run that produced it.
//!
//! The embedded key below is the original tool's own identification key,
//! not PKI material — it has no relationship to any Nintendo signing or
//! common key and is not sensitive.

use crate::error::{Error, Kind, Result};
use crate::time::ymdhms;

use super::super::crypto::rsa::RsaPublicKey;

/// Size of the plaintext record before encryption.
const ID_PLAIN_SIZE: usize = 256 - 16;
/// Size of the encrypted blob (matches the key's modulus length).
pub const ID_BLOB_SIZE: usize = 256;

const ID_HDR_XOR: u8 = 0x69;
const ID_HDR: [u8; 10] = [0x1B, 0x1F, 0x1D, 0x01, 0x1D, 0x06, 0x06, 0x05, 0x53, 0x49];

const FREE_TEXT_OFFSET: usize = 10;
const FREE_TEXT_LEN: usize = 0x40 - FREE_TEXT_OFFSET;
const DISC_HEADER_OFFSET: usize = 0x40;
const DISC_HEADER_LEN: usize = 0x68;

const ID_EXPONENT: u32 = 0x0001_0001;

#[rustfmt::skip]
const ID_PUB: [u8; 256] = [
    0xB5, 0xBC, 0x70, 0x4C, 0x75, 0x3D, 0xCF, 0x02, 0x67, 0x04, 0x1A, 0xAB, 0xC3, 0xC8, 0x20, 0xD6,
    0x51, 0xE8, 0xE2, 0xCC, 0x6A, 0x08, 0xCF, 0x70, 0xEE, 0xCF, 0x45, 0x20, 0x27, 0xCC, 0x81, 0x77,
    0x98, 0xBB, 0x22, 0x82, 0x61, 0xA4, 0x1B, 0x52, 0x19, 0xC0, 0x3F, 0x50, 0xAF, 0xCE, 0x6E, 0xAB,
    0x22, 0xF8, 0xC2, 0x23, 0xC0, 0xCF, 0x18, 0x82, 0x72, 0xDD, 0xFC, 0xF9, 0xB9, 0x7C, 0x73, 0x1E,
    0xBF, 0xAB, 0xDF, 0x49, 0x1F, 0xCC, 0x73, 0x53, 0xDF, 0xB9, 0x01, 0xDA, 0x13, 0x5C, 0x11, 0x9E,
    0xA0, 0x1E, 0x7B, 0xFA, 0x61, 0x2F, 0x50, 0xB1, 0xDA, 0x98, 0x8F, 0xB5, 0x29, 0x60, 0x30, 0x44,
    0x80, 0x01, 0x20, 0xE1, 0x03, 0x24, 0xFB, 0xBA, 0xDC, 0x07, 0xA0, 0xBB, 0x57, 0x6F, 0x37, 0x38,
    0xD2, 0xD2, 0x44, 0x81, 0x5C, 0xE5, 0xF4, 0xF6, 0xDC, 0x68, 0x58, 0x19, 0x3D, 0x8B, 0xD8, 0xEC,
    0x5D, 0x8F, 0x46, 0x11, 0x46, 0x0E, 0x2C, 0xDA, 0x00, 0x47, 0x0B, 0xD7, 0x24, 0x70, 0x7E, 0x5B,
    0x6E, 0xEF, 0x7B, 0xF0, 0x3C, 0x5A, 0x55, 0xD4, 0x42, 0xA2, 0x03, 0x88, 0x0C, 0x2C, 0xB2, 0xEB,
    0x98, 0x96, 0x15, 0xAD, 0xEE, 0x99, 0xAD, 0x9D, 0x1B, 0xD6, 0x16, 0xF8, 0x70, 0x55, 0xF1, 0x43,
    0x12, 0x5B, 0x2B, 0x51, 0x1C, 0x09, 0x05, 0xBC, 0xD3, 0xEA, 0xD9, 0x35, 0xEA, 0x20, 0x54, 0x1D,
    0x86, 0xF2, 0xC1, 0xD1, 0x60, 0xEE, 0x66, 0x39, 0xA2, 0x75, 0xCB, 0x65, 0xEC, 0x53, 0x24, 0x5C,
    0x8F, 0x06, 0x25, 0xD9, 0xC1, 0x88, 0x03, 0xEC, 0xC3, 0x0A, 0xC2, 0x72, 0x49, 0x4C, 0x45, 0xEF,
    0xAB, 0x2F, 0x66, 0xA1, 0x3C, 0xDC, 0x28, 0x39, 0xFD, 0x64, 0x33, 0xDF, 0x72, 0x43, 0xD9, 0x65,
    0x2B, 0xDF, 0x94, 0x14, 0x0A, 0x7B, 0xE0, 0xBA, 0x40, 0x29, 0xC5, 0x23, 0x30, 0x2C, 0x14, 0xC1,
];

/// Build the 256-byte identification blob for a recrypt run.
///
/// `extra` is an optional caller-supplied free-text tag prepended to the
/// timestamp (mirrors a command-line comment in the original tool);
/// `local` is the run's wall-clock time, already resolved to a UTC
/// timestamp plus offset. `disc_header_raw` is the 0x68-byte disc header
/// copied verbatim into the blob.
pub fn build_id_blob(disc_header_raw: &[u8; DISC_HEADER_LEN], extra: Option<&str>, local: crate::time::LocalTimestamp) -> Result<[u8; ID_BLOB_SIZE]> {
    let mut plain = [0xFFu8; ID_PLAIN_SIZE];

    for (i, b) in ID_HDR.iter().enumerate() {
        plain[i] = b ^ ID_HDR_XOR;
    }

    let (y, mo, d, h, mi, s) = ymdhms(local.local());
    let off = local.utc_offset_secs;
    let tzsign = if off < 0 { "-" } else { "" };
    let off_abs = off.unsigned_abs();
    let tzval = format!("{tzsign}{:02}{:02}", off_abs / 3600, (off_abs % 3600) / 60);
    let local_time = format!("{y:04}/{mo:02}/{d:02} {h:02}:{mi:02}:{s:02}");
    let text = match extra {
        Some(extra) => format!("{extra}, {local_time} {tzval}"),
        None => format!("{local_time} {tzval}"),
    };
    let text_bytes = text.as_bytes();
    let copy_len = text_bytes.len().min(FREE_TEXT_LEN);
    plain[FREE_TEXT_OFFSET..FREE_TEXT_OFFSET + copy_len].copy_from_slice(&text_bytes[..copy_len]);

    plain[DISC_HEADER_OFFSET..DISC_HEADER_OFFSET + DISC_HEADER_LEN].copy_from_slice(disc_header_raw);

    let key = RsaPublicKey::from_be_bytes(&ID_PUB, ID_EXPONENT)?;
    let encrypted = key.encrypt_pkcs1v15(&plain)?;
    if encrypted.len() != ID_BLOB_SIZE {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "identification blob encrypted to unexpected length"));
    }
    let mut out = [0u8; ID_BLOB_SIZE];
    out.copy_from_slice(&encrypted);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::LocalTimestamp;

    #[test]
    fn builds_blob_of_expected_size() {
        let disc_header = [0x42u8; DISC_HEADER_LEN];
        let local = LocalTimestamp::new(1_600_000_000, 0);
        let blob = build_id_blob(&disc_header, None, local).unwrap();
        assert_eq!(blob.len(), ID_BLOB_SIZE);
    }

    #[test]
    fn negative_offset_gets_sign_positive_does_not() {
        // Exercised indirectly: build two blobs with opposite-sign offsets
        // and confirm they differ (the plaintext bytes are encrypted, so we
        // can't inspect the formatted string directly, but a change in
        // input must change the ciphertext).
        let disc_header = [0u8; DISC_HEADER_LEN];
        let positive = LocalTimestamp::new(0, 3600);
        let negative = LocalTimestamp::new(0, -3600);
        let blob_pos = build_id_blob(&disc_header, None, positive).unwrap();
        let blob_neg = build_id_blob(&disc_header, None, negative).unwrap();
        assert_ne!(blob_pos, blob_neg);
    }

    #[test]
    fn extra_text_changes_output() {
        let disc_header = [0u8; DISC_HEADER_LEN];
        let local = LocalTimestamp::new(0, 0);
        let without = build_id_blob(&disc_header, None, local).unwrap();
        let with = build_id_blob(&disc_header, Some("test run"), local).unwrap();
        assert_ne!(without, with);
    }
}
