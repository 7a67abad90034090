//! Password-based decryption for PKCS#12 payloads
//!
//! Supports the legacy PKCS#12 PBE schemes (SHA-1 with 3DES, 2-key 3DES,
//! RC2-40 and RC2-128) and PBES2 with PBKDF2 and AES-CBC or DES-EDE3-CBC.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, InnerIvInit, KeyInit};
use des::{TdesEde2, TdesEde3};
use hmac::Hmac;
use rc2::Rc2;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use asn1_rs::Tag;

use super::kdf::{self, KeyPurpose, MacDigest};
use super::{ContainerError, Password};
use crate::asn1::{AlgorithmIdentifier, Element};
use crate::oids;

/// Iteration counts above this are refused
pub const MAX_ITERATIONS: u64 = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockAlgorithm {
    TripleDes,
    TwoKeyTripleDes,
    Rc2 { effective_bits: usize },
    Aes128,
    Aes192,
    Aes256,
}

impl BlockAlgorithm {
    fn key_len(self) -> usize {
        match self {
            BlockAlgorithm::TripleDes | BlockAlgorithm::Aes192 => 24,
            BlockAlgorithm::TwoKeyTripleDes | BlockAlgorithm::Aes128 => 16,
            BlockAlgorithm::Rc2 { effective_bits } => effective_bits / 8,
            BlockAlgorithm::Aes256 => 32,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            BlockAlgorithm::Aes128 | BlockAlgorithm::Aes192 | BlockAlgorithm::Aes256 => 16,
            _ => 8,
        }
    }
}

fn cbc_decrypt<C>(cipher: C, iv: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, ContainerError>
where
    C: BlockCipher + BlockDecryptMut,
{
    cbc::Decryptor::<C>::inner_iv_slice_init(cipher, iv)
        .map_err(|_| ContainerError::Decrypt)?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map(Zeroizing::new)
        .map_err(|_| ContainerError::Decrypt)
}

fn decrypt_block(
    algorithm: BlockAlgorithm,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ContainerError> {
    let bad_key = |_| ContainerError::Decrypt;
    match algorithm {
        BlockAlgorithm::TripleDes => {
            cbc_decrypt(TdesEde3::new_from_slice(key).map_err(bad_key)?, iv, data)
        }
        BlockAlgorithm::TwoKeyTripleDes => {
            cbc_decrypt(TdesEde2::new_from_slice(key).map_err(bad_key)?, iv, data)
        }
        BlockAlgorithm::Rc2 { effective_bits } => {
            cbc_decrypt(Rc2::new_with_eff_key_len(key, effective_bits), iv, data)
        }
        BlockAlgorithm::Aes128 => {
            cbc_decrypt(Aes128::new_from_slice(key).map_err(bad_key)?, iv, data)
        }
        BlockAlgorithm::Aes192 => {
            cbc_decrypt(Aes192::new_from_slice(key).map_err(bad_key)?, iv, data)
        }
        BlockAlgorithm::Aes256 => {
            cbc_decrypt(Aes256::new_from_slice(key).map_err(bad_key)?, iv, data)
        }
    }
}

fn iteration_count(element: &Element<'_>) -> Result<u32, ContainerError> {
    let iterations = element.uint()?;
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return Err(ContainerError::UnsupportedParameters);
    }
    Ok(iterations as u32)
}

/// Decrypt `data` protected under `algorithm` with `password`
pub(crate) fn decrypt(
    algorithm: &AlgorithmIdentifier<'_>,
    password: &Password,
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ContainerError> {
    let legacy = match algorithm.oid.as_bytes() {
        o if o == oids::PBE_SHA1_3DES => Some(BlockAlgorithm::TripleDes),
        o if o == oids::PBE_SHA1_2DES => Some(BlockAlgorithm::TwoKeyTripleDes),
        o if o == oids::PBE_SHA1_RC2_128 => Some(BlockAlgorithm::Rc2 { effective_bits: 128 }),
        o if o == oids::PBE_SHA1_RC2_40 => Some(BlockAlgorithm::Rc2 { effective_bits: 40 }),
        _ => None,
    };

    let params = algorithm
        .parameters
        .clone()
        .ok_or(ContainerError::UnsupportedParameters)?;

    if let Some(block) = legacy {
        // pkcs-12PbeParams ::= SEQUENCE { salt OCTET STRING, iterations INTEGER }
        let mut fields = params.expect(Tag::Sequence, "PBE parameters")?.children();
        let salt = fields.expect(Tag::OctetString, "salt")?.octets()?;
        let iterations = iteration_count(&fields.required("iterations")?)?;

        let key = kdf::derive(
            MacDigest::Sha1,
            KeyPurpose::Key,
            password.bmp(),
            &salt,
            iterations,
            block.key_len(),
        );
        let iv = kdf::derive(
            MacDigest::Sha1,
            KeyPurpose::Iv,
            password.bmp(),
            &salt,
            iterations,
            block.iv_len(),
        );
        return decrypt_block(block, &key, &iv, data);
    }

    if algorithm.is(oids::PBES2) {
        return decrypt_pbes2(params, password, data);
    }

    Err(ContainerError::UnsupportedAlgorithm)
}

/// PBES2-params ::= SEQUENCE { keyDerivationFunc AlgorithmIdentifier,
///                             encryptionScheme AlgorithmIdentifier }
fn decrypt_pbes2(
    params: Element<'_>,
    password: &Password,
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, ContainerError> {
    let mut fields = params.expect(Tag::Sequence, "PBES2 parameters")?.children();
    let kdf_alg = AlgorithmIdentifier::from_element(fields.required("key derivation function")?)?;
    let scheme = AlgorithmIdentifier::from_element(fields.required("encryption scheme")?)?;

    let block = match scheme.oid.as_bytes() {
        o if o == oids::AES128_CBC => BlockAlgorithm::Aes128,
        o if o == oids::AES192_CBC => BlockAlgorithm::Aes192,
        o if o == oids::AES256_CBC => BlockAlgorithm::Aes256,
        o if o == oids::DES_EDE3_CBC => BlockAlgorithm::TripleDes,
        _ => return Err(ContainerError::UnsupportedAlgorithm),
    };
    let iv = scheme
        .parameters
        .ok_or(ContainerError::UnsupportedParameters)?
        .expect(Tag::OctetString, "iv")?
        .octets()?;
    if iv.len() != block.iv_len() {
        return Err(ContainerError::UnsupportedParameters);
    }

    if !kdf_alg.is(oids::PBKDF2) {
        return Err(ContainerError::UnsupportedAlgorithm);
    }

    // PBKDF2-params ::= SEQUENCE { salt OCTET STRING, iterationCount INTEGER,
    //                              keyLength INTEGER OPTIONAL, prf AlgorithmIdentifier DEFAULT hmacWithSHA1 }
    let mut kdf_params = kdf_alg
        .parameters
        .ok_or(ContainerError::UnsupportedParameters)?
        .expect(Tag::Sequence, "PBKDF2 parameters")?
        .children();
    let salt = kdf_params.expect(Tag::OctetString, "salt")?.octets()?;
    let iterations = iteration_count(&kdf_params.required("iteration count")?)?;
    if let Some(key_len) = kdf_params.optional(|e| e.is_universal(Tag::Integer))? {
        if key_len.uint()? != block.key_len() as u64 {
            return Err(ContainerError::UnsupportedParameters);
        }
    }
    let prf = kdf_params
        .next()
        .transpose()?
        .map(AlgorithmIdentifier::from_element)
        .transpose()?;
    let prf = prf.as_ref().map_or(oids::HMAC_WITH_SHA1, |alg| alg.oid.as_bytes());

    let mut key = Zeroizing::new(vec![0u8; block.key_len()]);
    let secret = password.utf8();
    let derived = match prf {
        p if p == oids::HMAC_WITH_SHA1 => {
            pbkdf2::pbkdf2::<Hmac<Sha1>>(secret, &salt, iterations, &mut key)
        }
        p if p == oids::HMAC_WITH_SHA256 => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(secret, &salt, iterations, &mut key)
        }
        p if p == oids::HMAC_WITH_SHA384 => {
            pbkdf2::pbkdf2::<Hmac<Sha384>>(secret, &salt, iterations, &mut key)
        }
        p if p == oids::HMAC_WITH_SHA512 => {
            pbkdf2::pbkdf2::<Hmac<Sha512>>(secret, &salt, iterations, &mut key)
        }
        _ => return Err(ContainerError::UnsupportedAlgorithm),
    };
    derived.map_err(|_| ContainerError::UnsupportedParameters)?;

    decrypt_block(block, &key, &iv, data)
}
