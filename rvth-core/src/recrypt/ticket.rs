//! Ticket recryption (§4.9 step 4c), grounded on `RVL_Ticket` and
//! `rvth_recrypt_partition()`'s title-key re-encryption.

use crate::cert::{cert_fakesign, cert_sign};
use crate::crypto::aes::{aes128_cbc_decrypt, aes128_cbc_encrypt};
use crate::error::{Error, Kind, Result};

use super::keys::{Keys, PkiTarget};

/// Total size of an `RVL_Ticket`, matching the `tmd_size` field's offset
/// in the enclosing partition header.
pub const TICKET_SIZE: usize = 0x2A4;

const ISSUER_OFFSET: usize = 0x140;
const ISSUER_LEN: usize = 0x40;
const ENCRYPTED_TITLE_KEY_OFFSET: usize = 0x1BF;
pub(crate) const TITLE_ID_OFFSET: usize = 0x1DC;
const COMMON_KEY_INDEX_OFFSET: usize = 0x1F1;

const RETAIL_TICKET_ISSUER: &str = "Root-CA00000001-XS00000003";
const DEBUG_TICKET_ISSUER: &str = "Root-CA00000002-XS00000006";
const VWII_COMMON_KEY_INDEX: u8 = 2;

fn read_nul_terminated(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn source_common_key(keys: &Keys, issuer: &str, common_key_index: u8) -> Result<[u8; 16]> {
    match issuer {
        RETAIL_TICKET_ISSUER => match common_key_index {
            0 => Ok(keys.common_retail),
            1 => Ok(keys.common_korean),
            VWII_COMMON_KEY_INDEX => {
                keys.common_vwii.ok_or_else(|| Error::domain_ctx(Kind::InvalidArgument, "vWii common key not supplied"))
            }
            other => Err(Error::domain_ctx(Kind::InvalidArgument, format!("unsupported common key index {other:#x}"))),
        },
        DEBUG_TICKET_ISSUER => Ok(keys.common_debug),
        other => Err(Error::domain_ctx(Kind::UnknownIssuer, format!("unrecognized ticket issuer `{other}`"))),
    }
}

fn target_issuer_and_key(target: PkiTarget, keys: &Keys) -> Result<(&'static str, u8, [u8; 16])> {
    match target {
        PkiTarget::Retail => Ok((RETAIL_TICKET_ISSUER, 0, keys.common_retail)),
        PkiTarget::Korean => Ok((RETAIL_TICKET_ISSUER, 1, keys.common_korean)),
        PkiTarget::Vwii => keys
            .common_vwii
            .map(|key| (RETAIL_TICKET_ISSUER, VWII_COMMON_KEY_INDEX, key))
            .ok_or_else(|| Error::domain_ctx(Kind::InvalidArgument, "vWii common key not supplied")),
        PkiTarget::Debug => Ok((DEBUG_TICKET_ISSUER, 0, keys.common_debug)),
    }
}

/// Recrypt `ticket` (an `RVL_Ticket`-shaped buffer of at least
/// [`TICKET_SIZE`] bytes) in place for `target`. Returns `true` if the
/// ticket was modified, `false` if it already targeted the requested PKI
/// (idempotent no-op, per the testable property in §8).
pub fn recrypt_ticket(ticket: &mut [u8], target: PkiTarget, keys: &Keys) -> Result<bool> {
    if ticket.len() < TICKET_SIZE {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "ticket buffer shorter than RVL_Ticket"));
    }

    let issuer = read_nul_terminated(&ticket[ISSUER_OFFSET..ISSUER_OFFSET + ISSUER_LEN]);
    let common_key_index = ticket[COMMON_KEY_INDEX_OFFSET];
    let (target_issuer, target_common_key_index, target_key) = target_issuer_and_key(target, keys)?;

    if issuer == target_issuer && common_key_index == target_common_key_index {
        return Ok(false);
    }

    let source_key = source_common_key(keys, &issuer, common_key_index)?;

    let mut iv = [0u8; 16];
    iv[0..8].copy_from_slice(&ticket[TITLE_ID_OFFSET..TITLE_ID_OFFSET + 8]);

    let mut title_key = ticket[ENCRYPTED_TITLE_KEY_OFFSET..ENCRYPTED_TITLE_KEY_OFFSET + 16].to_vec();
    aes128_cbc_decrypt(&source_key, &iv, &mut title_key)?;
    aes128_cbc_encrypt(&target_key, &iv, &mut title_key)?;
    ticket[ENCRYPTED_TITLE_KEY_OFFSET..ENCRYPTED_TITLE_KEY_OFFSET + 16].copy_from_slice(&title_key);

    ticket[ISSUER_OFFSET..ISSUER_OFFSET + ISSUER_LEN].fill(0);
    ticket[ISSUER_OFFSET..ISSUER_OFFSET + target_issuer.len()].copy_from_slice(target_issuer.as_bytes());
    ticket[COMMON_KEY_INDEX_OFFSET] = target_common_key_index;

    match target {
        PkiTarget::Retail | PkiTarget::Korean | PkiTarget::Vwii => cert_fakesign(ticket)?,
        PkiTarget::Debug => match &keys.debug_ticket_key {
            Some(key) => cert_sign(key, true, ticket)?,
            None => cert_fakesign(ticket)?,
        },
    }

    Ok(true)
}
