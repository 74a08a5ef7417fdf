//! PKI key material for recryption (§4.9), grounded on `priv_key_store.h`'s
//! `rvth_privkey_debug_ticket`/`rvth_privkey_debug_tmd` declarations and the
//! common-key selection in `rvth_init_BankEntry_crypto()`.
//!
//! This crate ships no embedded Nintendo keys, common or private — the
//! same policy [`crate::cert::CertStore`] applies to certificates. Debug
//! signing keys are stored there only as `(p, q)`, per the header's own
//! comment that the CRT parameters aren't worth persisting; [`Keys`]
//! mirrors that by taking a constructed [`RsaPrivateKey`] rather than raw
//! primes, so the caller decides how those primes are stored at rest.

use crate::crypto::rsa::RsaPrivateKey;

/// Which PKI a partition's ticket/TMD should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiTarget {
    Retail,
    Korean,
    /// The vWii common key, used by partitions running under Wii U's Wii
    /// backward-compatibility mode (common-key index 2 on a retail ticket).
    Vwii,
    Debug,
}

/// Caller-supplied AES common keys and (optional) debug RSA signing keys.
///
/// The AES-128 common keys decrypt/re-encrypt a ticket's title key; without
/// the matching pair for both the source and target PKI,
/// [`super::ticket::recrypt_ticket`] cannot proceed. `common_vwii` is
/// optional since most callers never recrypt to/from vWii; supplying it
/// enables [`PkiTarget::Vwii`]. The debug signing keys are only needed when
/// the target is [`PkiTarget::Debug`] and a real (non-fake) signature is
/// requested.
pub struct Keys {
    pub common_retail: [u8; 16],
    pub common_korean: [u8; 16],
    pub common_vwii: Option<[u8; 16]>,
    pub common_debug: [u8; 16],
    pub debug_ticket_key: Option<RsaPrivateKey>,
    pub debug_tmd_key: Option<RsaPrivateKey>,
}

impl Keys {
    /// Construct with only the AES common keys; debug targets will fall
    /// back to fakesigning (see [`super::ticket::recrypt_ticket`]), and
    /// [`PkiTarget::Vwii`] is unavailable until [`Keys::with_vwii_key`] is
    /// also called.
    pub fn with_common_keys(retail: [u8; 16], korean: [u8; 16], debug: [u8; 16]) -> Self {
        Keys { common_retail: retail, common_korean: korean, common_vwii: None, common_debug: debug, debug_ticket_key: None, debug_tmd_key: None }
    }

    /// Supply the vWii common key, enabling [`PkiTarget::Vwii`] as a recrypt
    /// target.
    pub fn with_vwii_key(mut self, key: [u8; 16]) -> Self {
        self.common_vwii = Some(key);
        self
    }
}
