//! Parsing of a Wii certificate chain (the concatenated `cert.sys`/disc
//! `cert.bin`/WAD cert-chain blob) into a lookup table keyed by each
//! certificate's own identity string (§4.3).
//!
//! Layout grounded on `RVL_Sig_RSA4096`/`RVL_Sig_RSA2048`/
//! `RVL_PubKey_RSA4096`/`RVL_PubKey_RSA2048`/`RVL_PubKey_ECC` from the
//! original tool's `cert_store.h`. Each certificate is a signature header
//! (naming the issuer that signed it) followed by a public key block
//! (naming this certificate's own identity, used by its children).
//!
//! This crate ships no embedded Nintendo root keys: a [`CertStore`] is
//! empty until populated from a real certificate chain (disc/WAD/NUS
//! data) via [`CertStore::from_bytes`] or [`CertStore::insert`].

use std::collections::HashMap;

use crate::error::{Error, ErrorContext, Kind, Result};
use crate::util::read_u32_be;

/// Signature/key algorithm declared by a certificate's type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Rsa4096,
    Rsa2048,
    Ecc,
}

impl SignatureType {
    fn from_word(word: u32) -> Option<Self> {
        match word {
            0x0001_0000 => Some(SignatureType::Rsa4096),
            0x0001_0001 => Some(SignatureType::Rsa2048),
            0x0001_0002 => Some(SignatureType::Ecc),
            _ => None,
        }
    }

    /// Size of a signature block (type word + signature + padding + issuer).
    pub fn sig_block_len(self) -> usize {
        match self {
            SignatureType::Rsa4096 => 0x280,
            SignatureType::Rsa2048 => 0x180,
            SignatureType::Ecc => 0x40 + 0x40, // unused in practice; ECC sigs aren't modeled
        }
    }

    /// Size of the raw signature itself (no header/padding/issuer).
    pub fn sig_len(self) -> usize {
        match self {
            SignatureType::Rsa4096 => 512,
            SignatureType::Rsa2048 => 256,
            SignatureType::Ecc => 64,
        }
    }
}

/// Key-type word stored at the start of a public-key block. Distinct from
/// [`SignatureType`] because a certificate's signature and the key it
/// carries need not use the same RSA size (the retail CA certificate is
/// signed RSA-4096 but carries an RSA-2048 key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Rsa4096,
    Rsa2048,
    Ecc,
}

impl KeyType {
    fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(KeyType::Rsa4096),
            1 => Some(KeyType::Rsa2048),
            2 => Some(KeyType::Ecc),
            _ => None,
        }
    }

    fn pub_block_len(self) -> usize {
        match self {
            KeyType::Rsa4096 => 0x280,
            KeyType::Rsa2048 => 0x180,
            KeyType::Ecc => 0x180,
        }
    }
}

/// Which well-known authority issued or owns a certificate, by name.
/// Kept as a string rather than an enum: NUS/debug/vWii PKI hierarchies
/// introduce issuer names beyond the handful the original C enum listed,
/// and a store built from a real chain should accept any of them.
pub type CertIssuer = String;

/// A single parsed certificate: its own identity, its declared public
/// key, and the issuer name from its signature header (used to find the
/// certificate that should verify *it*, recursively).
#[derive(Debug, Clone)]
pub struct Cert {
    /// This certificate's own identity (`child_cert_identity` / the name
    /// its children reference in their signature's `issuer` field).
    pub identity: String,
    /// The name in this certificate's own signature header — who signed it.
    pub signed_by: String,
    pub sig_type: SignatureType,
    /// Big-endian RSA modulus. Empty for ECC keys (unsupported for verification).
    pub modulus: Vec<u8>,
    pub exponent: u32,
}

fn read_fixed_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// A lookup table of certificates, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct CertStore {
    by_identity: HashMap<String, Cert>,
}

impl CertStore {
    pub fn empty() -> Self { CertStore { by_identity: HashMap::new() } }

    pub fn insert(&mut self, cert: Cert) { self.by_identity.insert(cert.identity.clone(), cert); }

    pub fn get(&self, identity: &str) -> Option<&Cert> { self.by_identity.get(identity) }

    /// Parse a concatenated chain of certificates (as found in a disc's
    /// `cert.bin`, a WAD's cert-chain section, or NUS `cert` file) and
    /// insert each one.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut store = CertStore::empty();
        let mut offset = 0usize;
        while offset + 4 <= data.len() {
            let sig_word = read_u32_be(&mut &data[offset..offset + 4])
                .map_err(|e| e.context("reading certificate signature type"))?;
            let sig_type = SignatureType::from_word(sig_word)
                .ok_or_else(|| Error::domain_ctx(Kind::UnsupportedSignatureType, "unknown certificate signature type"))?;
            let sig_block_len = sig_type.sig_block_len();
            if offset + sig_block_len + 4 > data.len() {
                return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "truncated certificate signature block"));
            }
            let issuer_off = offset + 4 + sig_type.sig_len() + 0x3C;
            let signed_by = read_fixed_string(&data[issuer_off..issuer_off + 64]);

            let pub_off = offset + sig_block_len;
            let key_word = read_u32_be(&mut &data[pub_off..pub_off + 4])
                .map_err(|e| e.context("reading certificate key type"))?;
            let key_type = KeyType::from_word(key_word)
                .ok_or_else(|| Error::domain_ctx(Kind::UnsupportedSignatureType, "unknown certificate key type"))?;
            let pub_block_len = key_type.pub_block_len();
            if pub_off + pub_block_len > data.len() {
                return Err(Error::domain_ctx(Kind::PartitionHeaderCorrupted, "truncated certificate public-key block"));
            }

            let identity = read_fixed_string(&data[pub_off + 4..pub_off + 4 + 64]);
            let (modulus, exponent) = match key_type {
                KeyType::Rsa4096 => {
                    let modulus = data[pub_off + 0x48..pub_off + 0x48 + 512].to_vec();
                    let exponent = read_u32_be(&mut &data[pub_off + 0x248..pub_off + 0x24C])
                        .map_err(|e| e.context("reading RSA-4096 exponent"))?;
                    (modulus, exponent)
                }
                KeyType::Rsa2048 => {
                    let modulus = data[pub_off + 0x48..pub_off + 0x48 + 256].to_vec();
                    let exponent = read_u32_be(&mut &data[pub_off + 0x148..pub_off + 0x14C])
                        .map_err(|e| e.context("reading RSA-2048 exponent"))?;
                    (modulus, exponent)
                }
                KeyType::Ecc => (Vec::new(), 0),
            };

            store.insert(Cert { identity, signed_by, sig_type, modulus, exponent });
            offset = pub_off + pub_block_len;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_rsa2048_cert(identity: &str, signed_by: &str, modulus: &[u8; 256], exponent: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 0x180 + 0x180];
        buf[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes()); // sig type RSA2048
        let issuer_off = 4 + 256 + 0x3C;
        buf[issuer_off..issuer_off + signed_by.len()].copy_from_slice(signed_by.as_bytes());

        let pub_off = 0x180;
        buf[pub_off..pub_off + 4].copy_from_slice(&1u32.to_be_bytes()); // key type RSA2048
        buf[pub_off + 4..pub_off + 4 + identity.len()].copy_from_slice(identity.as_bytes());
        buf[pub_off + 0x48..pub_off + 0x48 + 256].copy_from_slice(modulus);
        buf[pub_off + 0x148..pub_off + 0x14C].copy_from_slice(&exponent.to_be_bytes());
        buf
    }

    #[test]
    fn parses_single_cert() {
        let modulus = [0x11u8; 256];
        let bytes = build_rsa2048_cert("Root-CA00000001-XS00000003", "Root-CA00000001", &modulus, 65537);
        let store = CertStore::from_bytes(&bytes).unwrap();
        let cert = store.get("Root-CA00000001-XS00000003").unwrap();
        assert_eq!(cert.signed_by, "Root-CA00000001");
        assert_eq!(cert.exponent, 65537);
        assert_eq!(cert.modulus, modulus);
    }

    #[test]
    fn parses_chain_of_two() {
        let mut bytes = build_rsa2048_cert("A", "Root", &[1u8; 256], 3);
        bytes.extend(build_rsa2048_cert("B", "A", &[2u8; 256], 5));
        let store = CertStore::from_bytes(&bytes).unwrap();
        assert!(store.get("A").is_some());
        assert!(store.get("B").is_some());
    }

    #[test]
    fn rejects_unknown_sig_type() {
        let mut bytes = vec![0u8; 8];
        bytes[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        assert!(CertStore::from_bytes(&bytes).is_err());
    }
}
