//! Raw RSA "decryption" (public-key modular exponentiation) used to
//! recover a signature's padded digest (§4.2, §4.3).
//!
//! Wii signatures do not use a standard padding scheme (PKCS#1 v1.5 or
//! PSS) that the `rsa` crate's higher-level `verify()` would check — the
//! magic/padding/fixed-data layout is bespoke (see [`crate::cert::sig`]).
//! We only need the raw `sig^e mod n` operation, so we go through
//! `rsa`'s `BigUint` directly rather than its `RsaPublicKey::verify` API.

use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::BigUint;

use crate::error::{Error, Kind, Result};

/// Supported RSA signature sizes, matching the two key types the PKI uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaSignatureSize {
    Rsa2048,
    Rsa4096,
}

impl RsaSignatureSize {
    pub fn byte_len(self) -> usize {
        match self {
            RsaSignatureSize::Rsa2048 => 2048 / 8,
            RsaSignatureSize::Rsa4096 => 4096 / 8,
        }
    }
}

/// A public key as stored in the certificate chain: big-endian modulus
/// bytes plus a (typically small, e.g. 0x10001) exponent.
pub struct RsaPublicKey {
    inner: rsa::RsaPublicKey,
    modulus_len: usize,
}

impl RsaPublicKey {
    pub fn from_be_bytes(modulus: &[u8], exponent: u32) -> Result<Self> {
        let n = BigUint::from_bytes_be(modulus);
        let e = BigUint::from(exponent);
        let modulus_len = modulus.len();
        let inner = rsa::RsaPublicKey::new(n, e)
            .map_err(|err| Error::Other(format!("invalid RSA public key: {err}")))?;
        Ok(RsaPublicKey { inner, modulus_len })
    }

    pub fn modulus_len(&self) -> usize { self.modulus_len }

    /// PKCS#1 v1.5 encrypt `data` (which must be short enough to leave
    /// room for the scheme's own header: `modulus_len - 11` bytes max).
    /// Used for the identification blob (§4.10), the one place this PKI
    /// needs standard RSA encryption rather than the bespoke signature
    /// padding [`rsa_verify_raw`]/[`rsa_sign_raw`] implement.
    pub fn encrypt_pkcs1v15(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        self.inner
            .encrypt(&mut rng, rsa::Pkcs1v15Encrypt, data)
            .map_err(|err| Error::Other(format!("RSA PKCS#1 v1.5 encrypt failed: {err}")))
    }
}

/// Raw RSA public-key operation: `sig^e mod n`, written as a big-endian
/// byte string padded (with leading zeros) to `modulus_len` bytes.
///
/// Matches `rsaw_decrypt_signature`'s contract: the signature must be
/// exactly as long as the modulus, and the result's length always equals
/// the modulus length.
pub fn rsa_verify_raw(key: &RsaPublicKey, sig: &[u8]) -> Result<Vec<u8>> {
    if sig.len() != key.modulus_len() {
        return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "signature length does not match key length"));
    }
    let c = BigUint::from_bytes_be(sig);
    let n = key.inner.n();
    if &c >= n {
        return Err(Error::domain_ctx(Kind::SignatureInvalid, "signature is not reduced modulo the key"));
    }
    let m = c.modpow(key.inner.e(), n);
    let mut out = m.to_bytes_be();
    if out.len() < key.modulus_len() {
        let mut padded = vec![0u8; key.modulus_len() - out.len()];
        padded.append(&mut out);
        out = padded;
    }
    Ok(out)
}

/// A private key in the `(p, q)` prime-factor representation, as the
/// debug PKI's signing keys are stored: only the two primes are kept, and
/// the CRT parameters (d, dp, dq, qinv) are derived on load rather than
/// stored alongside them.
pub struct RsaPrivateKey {
    inner: rsa::RsaPrivateKey,
    modulus_len: usize,
}

impl RsaPrivateKey {
    /// Construct from big-endian prime factors `p` and `q` and the public
    /// exponent (always 0x10001 in this PKI).
    pub fn from_primes(p: &[u8], q: &[u8], exponent: u32) -> Result<Self> {
        let p_big = BigUint::from_bytes_be(p);
        let q_big = BigUint::from_bytes_be(q);
        let e = BigUint::from(exponent);
        let modulus_len = p.len() + q.len();
        let inner = rsa::RsaPrivateKey::from_p_q(p_big, q_big, e)
            .map_err(|err| Error::Other(format!("invalid RSA private key: {err}")))?;
        Ok(RsaPrivateKey { inner, modulus_len })
    }

    pub fn modulus_len(&self) -> usize { self.modulus_len }
}

/// Raw RSA private-key operation: `m^d mod n`, the signing counterpart of
/// [`rsa_verify_raw`]. `padded` must already contain the magic/padding/hash
/// layout [`crate::cert::sig`] expects a verifier to recover.
pub fn rsa_sign_raw(key: &RsaPrivateKey, padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() != key.modulus_len() {
        return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "padded block length does not match key length"));
    }
    let m = BigUint::from_bytes_be(padded);
    let n = key.inner.n();
    if &m >= n {
        return Err(Error::domain_ctx(Kind::SignatureInvalid, "padded block is not reduced modulo the key"));
    }
    let d = key.inner.d();
    let c = m.modpow(d, n);
    let mut out = c.to_bytes_be();
    if out.len() < key.modulus_len() {
        let mut padded_out = vec![0u8; key.modulus_len() - out.len()];
        padded_out.append(&mut out);
        out = padded_out;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Textbook RSA vector (n=3233, e=17, d=2753, m=65): `c = m^d mod n`
    /// stands in for a "signature" produced with the private exponent;
    /// the raw public operation `c^e mod n` should recover `m`.
    #[test]
    fn raw_modpow_recovers_message() {
        let key = RsaPublicKey::from_be_bytes(&[0x0c, 0xa1], 17).unwrap();
        let sig = [0x02, 0x4c]; // 588, 2 bytes matching the modulus length
        let recovered = rsa_verify_raw(&key, &sig).unwrap();
        assert_eq!(recovered, vec![0x00, 0x41]); // 65
    }

    #[test]
    fn rejects_wrong_length_signature() {
        let key = RsaPublicKey::from_be_bytes(&[0x0c, 0xa1], 17).unwrap();
        assert!(rsa_verify_raw(&key, &[0x02, 0x4c, 0x00]).is_err());
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        // p=61, q=53 -> n=3233, matching the public-key vector above.
        let priv_key = RsaPrivateKey::from_primes(&[61], &[53], 17).unwrap();
        let sig = rsa_sign_raw(&priv_key, &[0x00, 0x41]).unwrap(); // m=65
        assert_eq!(sig, vec![0x02, 0x4c]); // 588

        let pub_key = RsaPublicKey::from_be_bytes(&[0x0c, 0xa1], 17).unwrap();
        let recovered = rsa_verify_raw(&pub_key, &sig).unwrap();
        assert_eq!(recovered, vec![0x00, 0x41]);
    }
}
