//! SHA-1 (partition H0..H4 hash trees, fakesign digests) and SHA-256
//! (WAD content hashes) digests (§4.2, §4.9.1).

use sha1::{Digest, Sha1};
use sha2::Sha256;

pub type Sha1Digest = [u8; 20];
pub type Sha256Digest = [u8; 32];

pub fn sha1_digest(data: &[u8]) -> Sha1Digest {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256_digest(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty() {
        let d = sha1_digest(b"");
        assert_eq!(d, hex_literal::hex!("da39a3ee5e6b4b0d3255bfef95601890afd80709"));
    }

    #[test]
    fn sha256_of_empty() {
        let d = sha256_digest(b"");
        assert_eq!(
            d,
            hex_literal::hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }
}
