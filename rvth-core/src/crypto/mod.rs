//! Cryptographic primitives (§4.2): AES-128-CBC, SHA-1/SHA-256, RSA-2048/4096.
//!
//! Each submodule wraps a single RustCrypto crate the way the original
//! tool wrapped a single OS/OpenSSL primitive behind `aesw`/`rsaw`/hash
//! helpers — small, stateless (or nearly so) contexts with no surface
//! beyond what the disc/cert/recrypt engines need.

pub mod aes;
pub mod rsa;
pub mod sha;

pub use aes::{aes128_cbc_decrypt, aes128_cbc_encrypt, Aes128CbcDec, Aes128CbcEnc};
pub use rsa::{rsa_sign_raw, rsa_verify_raw, RsaPrivateKey, RsaPublicKey, RsaSignatureSize};
pub use sha::{sha1_digest, sha256_digest, Sha1Digest, Sha256Digest};
