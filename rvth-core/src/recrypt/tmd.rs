//! TMD issuer rewrite and re-signing (§4.9 step 4d), grounded on the TMD
//! issuer/signature fields already parsed for metadata in
//! `crate::bank::entry::derive_crypto`.

use crate::cert::{cert_fakesign, cert_sign};
use crate::error::{Error, Kind, Result};

use super::keys::{Keys, PkiTarget};

const ISSUER_OFFSET: usize = 0x140;
const ISSUER_LEN: usize = 0x40;

const RETAIL_TMD_ISSUER: &str = "Root-CA00000001-CP00000004";
const DEBUG_TMD_ISSUER: &str = "Root-CA00000002-CP00000007";

fn target_issuer(target: PkiTarget) -> &'static str {
    match target {
        PkiTarget::Retail | PkiTarget::Korean | PkiTarget::Vwii => RETAIL_TMD_ISSUER,
        PkiTarget::Debug => DEBUG_TMD_ISSUER,
    }
}

/// Rewrite `tmd`'s issuer for `target` and sign it: fakesign for a retail
/// or Korean target, real-sign with the supplied debug key (falling back
/// to fakesign if none was provided) for a debug target.
///
/// `tmd` must be at least `0x140 + 0x40` bytes (through the issuer field)
/// and cover the full signed region up to its own `tmd_size`.
pub fn recrypt_tmd(tmd: &mut [u8], target: PkiTarget, keys: &Keys) -> Result<()> {
    if tmd.len() < ISSUER_OFFSET + ISSUER_LEN {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "TMD buffer shorter than its issuer field"));
    }
    let issuer = target_issuer(target);
    tmd[ISSUER_OFFSET..ISSUER_OFFSET + ISSUER_LEN].fill(0);
    tmd[ISSUER_OFFSET..ISSUER_OFFSET + issuer.len()].copy_from_slice(issuer.as_bytes());

    match target {
        PkiTarget::Retail | PkiTarget::Korean | PkiTarget::Vwii => cert_fakesign(tmd)?,
        PkiTarget::Debug => match &keys.debug_tmd_key {
            Some(key) => cert_sign(key, true, tmd)?,
            None => cert_fakesign(tmd)?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recrypt::keys::Keys;

    fn sample_tmd() -> Vec<u8> {
        let mut t = vec![0u8; 0x1E4];
        t[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        t[ISSUER_OFFSET..ISSUER_OFFSET + DEBUG_TMD_ISSUER.len()].copy_from_slice(DEBUG_TMD_ISSUER.as_bytes());
        t
    }

    #[test]
    fn rewrites_issuer_for_retail_target() {
        let keys = Keys::with_common_keys([0; 16], [0; 16], [0; 16]);
        let mut tmd = sample_tmd();
        recrypt_tmd(&mut tmd, PkiTarget::Retail, &keys).unwrap();
        let end = tmd[ISSUER_OFFSET..ISSUER_OFFSET + ISSUER_LEN].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&tmd[ISSUER_OFFSET..ISSUER_OFFSET + end], RETAIL_TMD_ISSUER.as_bytes());
        assert!(tmd[4..4 + 256].iter().all(|&b| b == 0));
    }

    #[test]
    fn korean_target_uses_retail_tmd_issuer() {
        let keys = Keys::with_common_keys([0; 16], [0; 16], [0; 16]);
        let mut tmd = sample_tmd();
        recrypt_tmd(&mut tmd, PkiTarget::Korean, &keys).unwrap();
        let end = tmd[ISSUER_OFFSET..ISSUER_OFFSET + ISSUER_LEN].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&tmd[ISSUER_OFFSET..ISSUER_OFFSET + end], RETAIL_TMD_ISSUER.as_bytes());
    }
}
