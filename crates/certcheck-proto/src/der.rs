//! DER writer for OCSP requests
//!
//! Decoding lives in [`crate::asn1`]. Encoding is limited to what an OCSP
//! request needs: every value is built bottom-up from already-encoded
//! members, so a definite length is always known.

/// Identifier octets for the universal and context-specific tags in use
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const ENUMERATED: u8 = 0x0A;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;

    pub const CONSTRUCTED: u8 = 0x20;

    /// `[n] IMPLICIT` primitive
    pub const fn context(n: u8) -> u8 {
        0x80 | n
    }

    /// `[n]` constructed, explicit or implicit
    pub const fn context_constructed(n: u8) -> u8 {
        0xA0 | n
    }
}

/// Encode one value with the given identifier octet
pub fn tlv(identifier: u8, contents: &[u8]) -> Vec<u8> {
    let len = contents.len();
    let mut out = Vec::with_capacity(len + 6);
    out.push(identifier);
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let be = len.to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (be.len() - skip) as u8);
        out.extend_from_slice(&be[skip..]);
    }
    out.extend_from_slice(contents);
    out
}

pub fn sequence(members: &[&[u8]]) -> Vec<u8> {
    tlv(tag::SEQUENCE, &members.concat())
}

pub fn octet_string(contents: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, contents)
}

/// INTEGER from two's-complement contents octets
pub fn integer(contents: &[u8]) -> Vec<u8> {
    tlv(tag::INTEGER, contents)
}

/// OBJECT IDENTIFIER from contents octets, as listed in [`crate::oids`]
pub fn oid(contents: &[u8]) -> Vec<u8> {
    tlv(tag::OID, contents)
}

pub fn null() -> Vec<u8> {
    tlv(tag::NULL, &[])
}

/// `[n] EXPLICIT` wrapper around an encoded value
pub fn explicit(n: u8, inner: &[u8]) -> Vec<u8> {
    tlv(tag::context_constructed(n), inner)
}
