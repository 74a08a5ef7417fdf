//! AES-128-CBC, used for Wii title-key and partition-data
//! encryption/decryption (§4.2, §4.9).

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{Error, Kind, Result};

pub type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
pub type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Decrypt `data` in place with AES-128-CBC. `data.len()` must be a
/// multiple of 16; the original tool's `aesw_decrypt` silently rejected
/// non-block-sized input by returning 0 bytes processed, which we surface
/// as [`Kind::InvalidArgument`] instead.
pub fn aes128_cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "AES data length not a multiple of 16"));
    }
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| Error::Other(format!("AES-CBC decrypt failed: {e}")))?;
    Ok(())
}

/// Encrypt `data` in place with AES-128-CBC. Same block-alignment
/// requirement as [`aes128_cbc_decrypt`].
pub fn aes128_cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "AES data length not a multiple of 16"));
    }
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, data.len())
        .map_err(|e| Error::Other(format!("AES-CBC encrypt failed: {e}")))?;
    Ok(())
}
