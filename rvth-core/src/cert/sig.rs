//! Signature verification engine (§4.3), grounded on `cert_verify` in the
//! original tool's `cert.c`.
//!
//! A ticket or TMD begins with the same layout: a signature type word, the
//! signature itself (padded to 64-byte alignment), and an issuer string
//! (also 64-byte aligned). The signature covers everything from the
//! issuer string to the end of the struct. Decrypting the signature with
//! the issuer's public key should yield `0x00 0x01 0xFF..0xFF <fixed 16
//! bytes> <SHA-1 of the signed region>` for retail signatures, or
//! `0x00 0x02 <anything>` for debug signatures.

use bitflags::bitflags;

use crate::cert::store::CertStore;
use crate::crypto::rsa::{rsa_sign_raw, rsa_verify_raw, RsaPrivateKey, RsaPublicKey};
use crate::crypto::sha::sha1_digest;
use crate::error::{Error, ErrorContext, Kind, Result};
use crate::util::read_u32_be;

use super::store::SignatureType;

const SIG_MAGIC_RETAIL: [u8; 3] = [0x00, 0x01, 0xFF];
const SIG_MAGIC_DEBUG: [u8; 2] = [0x00, 0x02];
const SIG_FIXED_DATA_RETAIL: [u8; 16] =
    [0x00, 0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2B, 0x0E, 0x03, 0x02, 0x1A, 0x05, 0x00, 0x04, 0x14];

/// Hard verification failures (correspond to the original's negative
/// `Sig_Status` outcomes that stop verification before the hash check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigErrorKind {
    /// Signature decoded, matched no recognizable magic/padding/fixed data.
    Invalid,
    /// Signature type field isn't RSA-2048/RSA-4096.
    UnsupportedSignatureType,
    /// The issuer string names no certificate in the supplied store.
    UnknownIssuer,
    /// Signature length doesn't match the parent certificate's key length.
    WrongTypeDeclaration,
    /// Magic number doesn't belong to the declared issuer (debug cert used
    /// with a retail-shaped magic, or vice versa).
    WrongMagicNumber,
}

bitflags! {
    /// Soft verification outcomes — the signature decoded and its magic
    /// number checked out, but the embedded hash doesn't match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SigFailFlags: u8 {
        /// Padding or fixed data within the signature is wrong.
        const BASE_ERROR = 1 << 0;
        /// SHA-1 hash doesn't match, and isn't the fakesign pattern either.
        const HASH_ERROR = 1 << 1;
        /// SHA-1 hash doesn't match, but the mismatch is the classic
        /// leading-zero-byte fakesign bug (IOS only checked the first byte).
        const HASH_FAKE = 1 << 2;
    }
}

/// Outcome of [`cert_verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigStatus {
    Ok,
    Fail(SigFailFlags),
}

impl SigStatus {
    pub fn is_ok(self) -> bool { matches!(self, SigStatus::Ok) }
}

/// Verify a ticket's or TMD's signature.
///
/// `data` must start with the 4-byte signature type, the signature, and
/// the 64-byte issuer field; everything from the issuer field to the end
/// of `data` is what the signature covers.
pub fn cert_verify(store: &CertStore, data: &[u8]) -> Result<SigStatus> {
    if data.len() <= 4 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data too short"));
    }
    let sig_word = read_u32_be(&mut &data[0..4]).map_err(|e| e.context("reading signature type"))?;
    let sig_type = match sig_word {
        0x0001_0000 => SignatureType::Rsa4096,
        0x0001_0001 => SignatureType::Rsa2048,
        _ => return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "unsupported signature type")),
    };
    let sig_len = sig_type.sig_len();
    if data.len() < 4 + sig_len + 0x3C + 64 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data shorter than header"));
    }
    let sig = &data[4..4 + sig_len];
    let issuer_off = 4 + sig_len + 0x3C;
    let issuer_end = issuer_off + 64;
    let issuer_name_bytes = &data[issuer_off..issuer_end];
    let issuer_name = {
        let end = issuer_name_bytes.iter().position(|&b| b == 0).unwrap_or(issuer_name_bytes.len());
        std::str::from_utf8(&issuer_name_bytes[..end]).unwrap_or("").to_string()
    };

    let cert = store
        .get(&issuer_name)
        .ok_or_else(|| Error::domain_ctx(Kind::UnknownIssuer, format!("no certificate for issuer `{issuer_name}`")))?;
    if cert.modulus.len() != sig_len {
        return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "key length does not match signature length"));
    }

    let key = RsaPublicKey::from_be_bytes(&cert.modulus, cert.exponent)?;
    let buf = rsa_verify_raw(&key, sig)?;

    let sig_fixed_data_offset = sig_len - SIG_FIXED_DATA_RETAIL.len() - 20;
    let sig_sha1_offset = sig_len - 20;

    let mut fail = SigFailFlags::empty();
    if buf.starts_with(&SIG_MAGIC_RETAIL) {
        let padding_ok = buf[SIG_MAGIC_RETAIL.len()..sig_fixed_data_offset].iter().all(|&b| b == 0xFF);
        if !padding_ok || buf[sig_fixed_data_offset..sig_fixed_data_offset + SIG_FIXED_DATA_RETAIL.len()] != SIG_FIXED_DATA_RETAIL
        {
            fail |= SigFailFlags::BASE_ERROR;
        }
    } else if buf.starts_with(&SIG_MAGIC_DEBUG) {
        // No padding convention is documented for debug signatures beyond
        // the two-byte magic; nothing further to check here.
    } else {
        return Err(Error::domain_ctx(Kind::SignatureInvalid, "signature magic number not recognized"));
    }

    let signed_region = &data[issuer_off..];
    let computed = sha1_digest(signed_region);
    let embedded = &buf[sig_sha1_offset..sig_sha1_offset + 20];
    if computed.as_slice() != embedded {
        // The fakesign bug: affected IOS versions only compared the first
        // byte of the expected hash against zero, so any signature whose
        // decrypted buffer happens to start with 0x00 in the hash slot
        // (vanishingly unlikely unless deliberately brute-forced) passes.
        if embedded[0] == 0 {
            fail |= SigFailFlags::HASH_FAKE;
        } else {
            fail |= SigFailFlags::HASH_ERROR;
        }
    }

    if fail.is_empty() {
        Ok(SigStatus::Ok)
    } else {
        Ok(SigStatus::Fail(fail))
    }
}

/// Size of the brute-forced "padding2" counter, taken from the tail of the
/// 64-byte issuer field (the issuer strings this crate writes are well
/// under 48 bytes, so these bytes are always unused padding after the
/// issuer's NUL terminator and sit inside the signed region).
const PADDING2_LEN: usize = 16;

/// Patch `data`'s signature in place to exploit the fakesign bug: zero the
/// signature body, then brute-force a 16-byte padding region within the
/// signed range until its SHA-1 begins with `0x00`. Does not require
/// knowledge of the issuer's private key.
///
/// The Trucha bug is a broken signature check on vulnerable IOS versions:
/// the RSA step is skipped and only `hash[0] == 0` is tested against the
/// (all-zero) decrypted signature, so the forged signature validates only
/// if the signed data's own hash happens to start with a zero byte. Zeroing
/// the signature alone does not give you that; the padding2 search makes it
/// true for this particular buffer.
pub fn cert_fakesign(data: &mut [u8]) -> Result<()> {
    if data.len() <= 4 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data too short"));
    }
    let sig_word = read_u32_be(&mut &data[0..4]).map_err(|e| e.context("reading signature type"))?;
    let sig_len = match sig_word {
        0x0001_0000 => SignatureType::Rsa4096.sig_len(),
        0x0001_0001 => SignatureType::Rsa2048.sig_len(),
        _ => return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "unsupported signature type")),
    };
    let issuer_off = 4 + sig_len + 0x3C;
    if data.len() < issuer_off + 64 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data shorter than header"));
    }
    for b in &mut data[4..4 + sig_len] {
        *b = 0;
    }

    let padding2_off = issuer_off + 64 - PADDING2_LEN;
    let mut counter: u128 = 0;
    loop {
        if sha1_digest(&data[issuer_off..])[0] == 0x00 {
            break;
        }
        counter += 1;
        data[padding2_off..padding2_off + PADDING2_LEN].copy_from_slice(&counter.to_be_bytes());
    }
    Ok(())
}

/// Sign `data` in place with a real private key: recompute the SHA-1 over
/// the issuer-to-end region, build the retail or debug padded block, and
/// overwrite the signature with `padded^d mod n`.
///
/// Used for real debug-key signing during recrypt (§4.9); retail/Korean
/// targets always fakesign instead, since this crate holds no retail
/// private key (nor could it — that key is Nintendo's).
pub fn cert_sign(key: &RsaPrivateKey, debug: bool, data: &mut [u8]) -> Result<()> {
    if data.len() <= 4 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data too short"));
    }
    let sig_word = read_u32_be(&mut &data[0..4]).map_err(|e| e.context("reading signature type"))?;
    let sig_len = match sig_word {
        0x0001_0000 => SignatureType::Rsa4096.sig_len(),
        0x0001_0001 => SignatureType::Rsa2048.sig_len(),
        _ => return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "unsupported signature type")),
    };
    if data.len() < 4 + sig_len + 0x3C + 64 {
        return Err(Error::domain_ctx(Kind::InvalidArgument, "signed data shorter than header"));
    }
    if sig_len != key.modulus_len() {
        return Err(Error::domain_ctx(Kind::UnsupportedSignatureType, "key length does not match signature length"));
    }

    let issuer_off = 4 + sig_len + 0x3C;
    let hash = sha1_digest(&data[issuer_off..]);
    let sig_sha1_offset = sig_len - 20;

    let mut padded = vec![0u8; sig_len];
    if debug {
        padded[0..SIG_MAGIC_DEBUG.len()].copy_from_slice(&SIG_MAGIC_DEBUG);
    } else {
        let sig_fixed_data_offset = sig_len - SIG_FIXED_DATA_RETAIL.len() - 20;
        padded[0..SIG_MAGIC_RETAIL.len()].copy_from_slice(&SIG_MAGIC_RETAIL);
        for b in &mut padded[SIG_MAGIC_RETAIL.len()..sig_fixed_data_offset] {
            *b = 0xFF;
        }
        padded[sig_fixed_data_offset..sig_fixed_data_offset + SIG_FIXED_DATA_RETAIL.len()].copy_from_slice(&SIG_FIXED_DATA_RETAIL);
    }
    padded[sig_sha1_offset..sig_sha1_offset + 20].copy_from_slice(&hash);

    let sig = rsa_sign_raw(key, &padded)?;
    data[4..4 + sig_len].copy_from_slice(&sig);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::store::Cert;

    // Genuine RSA-2048 keypair and Wii-shaped signature computed offline;
    // exercises the real modexp -> magic/padding -> SHA-1 path end to end.
    const MODULUS: [u8; 256] = hex_literal::hex!(
        "8c111c3da58e8eefaced893d01e79929575441fbfde29945233f67118151d43525afcf8e583eedba718e70d7f06ce1046b0df6a6bc6028865de1e60223f185c4f9acef58cad3f973a419b918474dac26d833d860485224f92b8f9cc4c9908df5e7347ad5af6e3dd3cb1afbdf5835465f6126703e429f2c36a6c65159a3a895b2ba108495b431851143143e1f7c53a04ab553d405666d03d1624013e6e16749864eeb9ca4d13211750fe447c7f0ebcf2a7e00ddfb85f3e81d45cfe156ca47853f5388cf0ec34fef8e801b960e48c44a204714204671eb92bc8f46bcb5f0c0050506a3228f7c4c777d41aea0ca026a83d86a7b073400bc407d7afe278bfd118f2b"
    );
    const SIGNATURE: [u8; 256] = hex_literal::hex!(
        "1cabd443cb6fa1511c2c71ab82135883604912376a4e3c03f8d318dcb6c180b64d96af0c1b3af250cf94518255bd5a0989f4cfe31478e8ab84465c95f85739befb10ce308ca1e6b00231f6afd17a82ef0b11eee93dd5b49054c36f7ca223073ee2f2771c250b63ad228df2b8733b3902e256b93686bef8999c4a017acbf5aa9effc09fb2e003a7c6e2d88a9d38313922963cc9f73486834d7a7ce655b166ec92f8cda55700f2ab1b1b07398d512ea415d8032d23f57ff40151ef23255e8f2c89a8118757dbe20b3416848a6fff8f5406bcc26b2a11c9ff62fa4ee90f938755c777444846129e0c8844d7527187dfb3f06ef27a4e252e7289956d29431d9f9987"
    );
    const ISSUER: &str = "Root-CA00000000-XS00000000";
    const PAYLOAD: &[u8] =
        b"hello rvth-core test payload, used for signature verification roundtrip";

    fn build_store() -> CertStore {
        let mut store = CertStore::empty();
        store.insert(Cert {
            identity: ISSUER.to_string(),
            signed_by: "Root".to_string(),
            sig_type: SignatureType::Rsa2048,
            modulus: MODULUS.to_vec(),
            exponent: 65537,
        });
        store
    }

    fn build_signed_data() -> Vec<u8> {
        let mut data = vec![0u8; 4 + 256 + 0x3C + 64];
        data[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        data[4..4 + 256].copy_from_slice(&SIGNATURE);
        let issuer_off = 4 + 256 + 0x3C;
        data[issuer_off..issuer_off + ISSUER.len()].copy_from_slice(ISSUER.as_bytes());
        data.extend_from_slice(PAYLOAD);
        data
    }

    #[test]
    fn verifies_genuine_signature() {
        let store = build_store();
        let data = build_signed_data();
        let status = cert_verify(&store, &data).unwrap();
        assert_eq!(status, SigStatus::Ok);
    }

    #[test]
    fn detects_tampered_payload() {
        let store = build_store();
        let mut data = build_signed_data();
        *data.last_mut().unwrap() ^= 0xFF;
        let status = cert_verify(&store, &data).unwrap();
        assert!(matches!(status, SigStatus::Fail(f) if f.contains(SigFailFlags::HASH_ERROR)));
    }

    #[test]
    fn unknown_issuer_errors() {
        let store = CertStore::empty();
        let data = build_signed_data();
        let err = cert_verify(&store, &data).unwrap_err();
        assert_eq!(err.kind(), Some(Kind::UnknownIssuer));
    }

    #[test]
    fn fakesign_zeroes_signature() {
        let mut data = build_signed_data();
        cert_fakesign(&mut data).unwrap();
        assert!(data[4..4 + 256].iter().all(|&b| b == 0));
        let issuer_off = 4 + 256 + 0x3C;
        assert_eq!(sha1_digest(&data[issuer_off..])[0], 0x00);
    }

    // Freshly generated RSA-2048 keypair (openssl genrsa), used only to
    // exercise cert_sign -> cert_verify end to end; unrelated to any PKI key.
    const SIGN_P: [u8; 128] = hex_literal::hex!(
        "e80389a99730fca426cb2036ccc2fdb5f00393cc90e064fb820f6058c0ea68f3db4a3b1545748d151f61477c3e58fffeeb974a275b3156b124053392481abd699bdf5ffb7fd4ddfdcbe2616565b54b94b8fea973069d497c2aa102934ac5526229302cc1e98618532f11e59209ac65b706815b231dca0b4b62ef60e7a38db40d"
    );
    const SIGN_Q: [u8; 128] = hex_literal::hex!(
        "d580d7955dcaafa4656c7e30fb72cbf8d817e1e0118e7cf9a45c1e7e2bf52ec1e404b8a61f274e104c6ec2d5fe20b6c0ba332e6e2082af54f2ecbabf5d1ce054ee5a5df1c5f0a349a7d524aefeb9bbff23bb05636171814d7a260019d1617e02b840648679854b484eb32d86ef94197579f49bd35425ab2df782538c17a67203"
    );
    const SIGN_MODULUS: [u8; 256] = hex_literal::hex!(
        "c17fb6b14744e35eaf1440175241c213ed4b737f6db7078bb7b51ecd5e731ae9f9bdccd9647ab0b60f2cbcd9cfeb04f3592b71baf1cf6deb37d5b8403fb518356b9b05df96b84091a16426086e561b87ddc477ee5370c204db841d6264ff09f2aadb4d3c71b40e374966c035c25398bc73a238ba6c983469bf5e12b6b985243637a57a2a6b7723ac61c6427eaaa0a36f9d0106e233f6b6b49c11762daa6a6faff73164d140a05c808bc854501c9ca4f337dc4027f0fa88e52b7eefbe293feb31ad14d8d7b9579e34a4303a6e4f000fadb61512832dda0f3d489024604a17989578ea3ffb2359046eb4515267a6c88f40db982a4e87fc9189c453c0b7f044e627"
    );
    const SIGN_EXPECTED: [u8; 256] = hex_literal::hex!(
        "74abdee91f67226206aab02d1665ced1a0871d063297764f931a875a6935bba67279e1b0c8c0b955e9a24084b72c47e84d79f82a72aedf191cb0944a7a20f9450ddf7bb736b9d838053c9f093959f9aa8fcfbb227f6086694ee9f5f9afb2b6b711528709947e7fa44f5eb5c226bed82bf13e24e783d54657c100e7222d20a39d4995a3a81ef71916a37fc637301807cc14095270e688a967757a9f0d32fe2ebadf970cbd863403005d29bded7696ffc225c6556eb4adbe47be293a9b717ab360a0c0a03e6541e89bff07b130bbf26e573593607e9375009fc4b2e24b623ec4e8126a92c02128b86841219bd2c99b8f522a3f6c66f3e5a80111822dc35dbb5cca"
    );
    const SIGN_ISSUER: &str = "Root-CA00000000-XS00000000";
    const SIGN_PAYLOAD: &[u8] = b"rvth-core cert_sign test payload";

    #[test]
    fn cert_sign_matches_expected_signature() {
        let priv_key = crate::crypto::rsa::RsaPrivateKey::from_primes(&SIGN_P, &SIGN_Q, 65537).unwrap();
        let mut data = vec![0u8; 4 + 256 + 0x3C + 64];
        data[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let issuer_off = 4 + 256 + 0x3C;
        data[issuer_off..issuer_off + SIGN_ISSUER.len()].copy_from_slice(SIGN_ISSUER.as_bytes());
        data.extend_from_slice(SIGN_PAYLOAD);

        cert_sign(&priv_key, false, &mut data).unwrap();
        assert_eq!(&data[4..4 + 256], &SIGN_EXPECTED[..]);

        let mut store = CertStore::empty();
        store.insert(Cert {
            identity: SIGN_ISSUER.to_string(),
            signed_by: "Root".to_string(),
            sig_type: SignatureType::Rsa2048,
            modulus: SIGN_MODULUS.to_vec(),
            exponent: 65537,
        });
        assert_eq!(cert_verify(&store, &data).unwrap(), SigStatus::Ok);
    }
}
