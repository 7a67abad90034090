//! PKCS#12 key derivation (RFC 7292 Appendix B) and MAC verification

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::oids;

/// Purpose byte of the derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyPurpose {
    Key = 1,
    Iv = 2,
    Mac = 3,
}

/// Digest driving the KDF and the container MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacDigest {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl MacDigest {
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        match oid {
            o if o == oids::SHA1 => Some(MacDigest::Sha1),
            o if o == oids::SHA256 => Some(MacDigest::Sha256),
            o if o == oids::SHA384 => Some(MacDigest::Sha384),
            o if o == oids::SHA512 => Some(MacDigest::Sha512),
            _ => None,
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            MacDigest::Sha1 => 20,
            MacDigest::Sha256 => 32,
            MacDigest::Sha384 => 48,
            MacDigest::Sha512 => 64,
        }
    }

    /// Compression function input size `v`
    fn block_len(self) -> usize {
        match self {
            MacDigest::Sha1 | MacDigest::Sha256 => 64,
            MacDigest::Sha384 | MacDigest::Sha512 => 128,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            MacDigest::Sha1 => Sha1::digest(data).to_vec(),
            MacDigest::Sha256 => Sha256::digest(data).to_vec(),
            MacDigest::Sha384 => Sha384::digest(data).to_vec(),
            MacDigest::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Repeat `input` to fill a whole number of `v`-byte blocks
fn fill_blocks(input: &[u8], v: usize) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }
    let len = v * input.len().div_ceil(v);
    input.iter().copied().cycle().take(len).collect()
}

/// Derive `output_len` bytes for `purpose`
///
/// # Arguments
/// * `password` - BMPString-encoded password including the two-byte terminator
/// * `salt` - Salt from the PBE or MAC parameters
/// * `iterations` - Iteration count, at least 1
pub fn derive(
    digest: MacDigest,
    purpose: KeyPurpose,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_len: usize,
) -> Zeroizing<Vec<u8>> {
    let u = digest.output_len();
    let v = digest.block_len();

    let diversifier = vec![purpose as u8; v];
    let mut input = Zeroizing::new(fill_blocks(salt, v));
    input.extend_from_slice(&fill_blocks(password, v));

    let mut output = Zeroizing::new(Vec::with_capacity(output_len + u));
    while output.len() < output_len {
        let mut block = Zeroizing::new(diversifier.clone());
        block.extend_from_slice(&input);
        let mut hash = Zeroizing::new(digest.digest(&block));
        for _ in 1..iterations.max(1) {
            hash = Zeroizing::new(digest.digest(&hash));
        }
        output.extend_from_slice(&hash);
        if output.len() >= output_len {
            break;
        }

        // I_j = (I_j + B + 1) mod 2^(8v) for every v-byte block of I
        let b: Vec<u8> = hash.iter().copied().cycle().take(v).collect();
        for chunk in input.chunks_mut(v) {
            let mut carry = 1u16;
            for (dst, src) in chunk.iter_mut().rev().zip(b.iter().rev()) {
                let sum = *dst as u16 + *src as u16 + carry;
                *dst = sum as u8;
                carry = sum >> 8;
            }
        }
    }

    output.truncate(output_len);
    output
}

/// Verify a container MAC in constant time
pub fn verify_mac(digest: MacDigest, key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    fn check<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
        match <M as hmac::digest::KeyInit>::new_from_slice(key) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(expected).is_ok()
            }
            Err(_) => false,
        }
    }

    match digest {
        MacDigest::Sha1 => check::<Hmac<Sha1>>(key, data, expected),
        MacDigest::Sha256 => check::<Hmac<Sha256>>(key, data, expected),
        MacDigest::Sha384 => check::<Hmac<Sha384>>(key, data, expected),
        MacDigest::Sha512 => check::<Hmac<Sha512>>(key, data, expected),
    }
}
