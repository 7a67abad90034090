//! BER and DER element access built on `asn1-rs`
//!
//! `asn1-rs` decodes identifiers, lengths (including BER indefinite lengths)
//! and primitive values. On top of that, [`Element`] remembers the complete
//! encoding of every value it hands out, since signature checks and Name
//! comparisons run over byte-exact spans, and [`Elements`] walks the contents
//! of a constructed value in order.
//!
//! PKCS#12 containers and PKCS#7 bundles are read under [`Rules::Ber`]; OCSP
//! messages under [`Rules::Der`].

use std::borrow::Cow;

use asn1_rs::{
    ASN1TimeZone, Any, BitString, Class, Enumerated, FromBer, FromDer, GeneralizedTime, Oid, Tag,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Encoding rules a structure is decoded under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rules {
    /// Indefinite lengths and constructed strings are accepted
    Ber,
    Der,
}

/// Structural decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Asn1Error {
    #[error("unexpected end of input")]
    Truncated,

    #[error("{0}")]
    Decode(asn1_rs::Error),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("unexpected element where {0} was expected")]
    UnexpectedTag(&'static str),

    #[error("trailing data after {0}")]
    TrailingData(&'static str),

    #[error("invalid {0}")]
    Invalid(&'static str),
}

impl From<asn1_rs::Err<asn1_rs::Error>> for Asn1Error {
    fn from(err: asn1_rs::Err<asn1_rs::Error>) -> Self {
        match err {
            asn1_rs::Err::Incomplete(_) => Asn1Error::Truncated,
            asn1_rs::Err::Error(e) | asn1_rs::Err::Failure(e) => Asn1Error::Decode(e),
        }
    }
}

impl From<asn1_rs::Error> for Asn1Error {
    fn from(err: asn1_rs::Error) -> Self {
        match err {
            asn1_rs::Error::Incomplete(_) => Asn1Error::Truncated,
            other => Asn1Error::Decode(other),
        }
    }
}

/// One decoded value together with its full encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element<'a> {
    any: Any<'a>,
    raw: &'a [u8],
    rules: Rules,
}

impl<'a> Element<'a> {
    /// Decode the first value of `input`, returning it and the unread rest
    pub fn parse(input: &'a [u8], rules: Rules) -> Result<(Self, &'a [u8]), Asn1Error> {
        let (rest, any) = match rules {
            Rules::Ber => Any::from_ber(input)?,
            Rules::Der => Any::from_der(input)?,
        };
        let raw = &input[..input.len() - rest.len()];
        Ok((Self { any, raw, rules }, rest))
    }

    /// Decode a value that must span all of `input`
    pub fn parse_single(input: &'a [u8], rules: Rules, what: &'static str) -> Result<Self, Asn1Error> {
        let (element, rest) = Self::parse(input, rules)?;
        if !rest.is_empty() {
            return Err(Asn1Error::TrailingData(what));
        }
        Ok(element)
    }

    /// Complete encoding, identifier and length included
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Contents octets; for indefinite lengths the end-of-contents marker
    /// is excluded
    pub fn contents(&self) -> &'a [u8] {
        self.any.data
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    pub fn is_constructed(&self) -> bool {
        self.any.header.is_constructed()
    }

    /// Universal class with the given tag number
    pub fn is_universal(&self, tag: Tag) -> bool {
        self.any.class() == Class::Universal && self.any.tag() == tag
    }

    /// Context-specific class with the given tag number
    pub fn is_context(&self, number: u32) -> bool {
        self.any.class() == Class::ContextSpecific && self.any.tag() == Tag(number)
    }

    /// Require a universal tag
    pub fn expect(self, tag: Tag, what: &'static str) -> Result<Self, Asn1Error> {
        if self.is_universal(tag) {
            Ok(self)
        } else {
            Err(Asn1Error::UnexpectedTag(what))
        }
    }

    /// Values inside a constructed element, decoded under the same rules
    pub fn children(&self) -> Elements<'a> {
        Elements::new(self.any.data, self.rules)
    }

    /// The single value wrapped by an `[n] EXPLICIT` tag
    pub fn explicit_inner(&self, what: &'static str) -> Result<Element<'a>, Asn1Error> {
        if !self.is_constructed() {
            return Err(Asn1Error::Invalid(what));
        }
        let mut inner = self.children();
        let value = inner.required(what)?;
        inner.finish(what)?;
        Ok(value)
    }

    pub fn oid(&self) -> Result<Oid<'a>, Asn1Error> {
        if !self.is_universal(Tag::Oid) || self.is_constructed() || self.any.data.is_empty() {
            return Err(Asn1Error::Invalid("object identifier"));
        }
        Ok(Oid::try_from(&self.any)?)
    }

    /// Whether this is an OBJECT IDENTIFIER with the given contents octets
    pub fn is_oid(&self, expected: &[u8]) -> bool {
        self.oid().map(|oid| oid.as_bytes() == expected).unwrap_or(false)
    }

    /// INTEGER contents exactly as encoded
    pub fn integer_bytes(&self) -> Result<&'a [u8], Asn1Error> {
        if !self.is_universal(Tag::Integer) || self.any.data.is_empty() {
            return Err(Asn1Error::Invalid("integer"));
        }
        Ok(self.any.data)
    }

    /// Non-negative INTEGER that fits in a u64
    pub fn uint(&self) -> Result<u64, Asn1Error> {
        if !self.is_universal(Tag::Integer) {
            return Err(Asn1Error::Invalid("integer"));
        }
        Ok(u64::try_from(&self.any)?)
    }

    pub fn enumerated(&self) -> Result<u32, Asn1Error> {
        if !self.is_universal(Tag::Enumerated) {
            return Err(Asn1Error::Invalid("enumerated"));
        }
        Ok(Enumerated::try_from(&self.any)?.0)
    }

    /// BIT STRING contents without the unused-bits octet. Only whole-octet
    /// strings are accepted.
    pub fn bit_string(&self) -> Result<Cow<'a, [u8]>, Asn1Error> {
        if !self.is_universal(Tag::BitString) || self.is_constructed() {
            return Err(Asn1Error::Invalid("bit string"));
        }
        let bits = BitString::try_from(&self.any)?;
        if bits.unused_bits != 0 {
            return Err(Asn1Error::Invalid("bit string"));
        }
        Ok(bits.data)
    }

    /// OCTET STRING contents, or those of an `[n] IMPLICIT OCTET STRING`
    ///
    /// Under BER the constructed form is flattened segment by segment.
    pub fn octets(&self) -> Result<Cow<'a, [u8]>, Asn1Error> {
        if !self.is_constructed() {
            return Ok(Cow::Borrowed(self.any.data));
        }
        if self.rules == Rules::Der {
            return Err(Asn1Error::Invalid("constructed octet string"));
        }
        let mut joined = Vec::with_capacity(self.any.data.len());
        for segment in self.children() {
            let segment = segment?;
            if !segment.is_universal(Tag::OctetString) {
                return Err(Asn1Error::Invalid("constructed octet string"));
            }
            joined.extend_from_slice(&segment.octets()?);
        }
        Ok(Cow::Owned(joined))
    }

    /// GeneralizedTime in UTC
    pub fn generalized_time(&self) -> Result<DateTime<Utc>, Asn1Error> {
        if !self.is_universal(Tag::GeneralizedTime) {
            return Err(Asn1Error::Invalid("generalized time"));
        }
        let time = GeneralizedTime::try_from(&self.any)?;
        to_utc(&time)
    }
}

fn to_utc(time: &GeneralizedTime) -> Result<DateTime<Utc>, Asn1Error> {
    let invalid = || Asn1Error::Invalid("generalized time");
    let dt = &time.0;
    let offset = match dt.tz {
        ASN1TimeZone::Z => Duration::zero(),
        ASN1TimeZone::Offset(hours, minutes) => {
            Duration::hours(hours as i64) + Duration::minutes(minutes as i64)
        }
        ASN1TimeZone::Undefined => return Err(invalid()),
    };
    let year = i32::try_from(dt.year).map_err(|_| invalid())?;
    let local = NaiveDate::from_ymd_opt(year, dt.month as u32, dt.day as u32)
        .and_then(|date| {
            date.and_hms_milli_opt(
                dt.hour as u32,
                dt.minute as u32,
                dt.second as u32,
                dt.millisecond.unwrap_or(0) as u32,
            )
        })
        .ok_or_else(invalid)?;
    Ok((local - offset).and_utc())
}

/// In-order walk over the values inside a constructed element
///
/// Iterating yields every remaining value; the helper methods consume one
/// value at a time for fixed SEQUENCE layouts.
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    rest: &'a [u8],
    rules: Rules,
}

impl<'a> Elements<'a> {
    pub fn new(input: &'a [u8], rules: Rules) -> Self {
        Self { rest: input, rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Next value, which must be present
    pub fn required(&mut self, what: &'static str) -> Result<Element<'a>, Asn1Error> {
        self.next().unwrap_or(Err(Asn1Error::Missing(what)))
    }

    /// Next value, which must carry a universal `tag`
    pub fn expect(&mut self, tag: Tag, what: &'static str) -> Result<Element<'a>, Asn1Error> {
        self.required(what)?.expect(tag, what)
    }

    /// Next value when it matches `pred`; otherwise nothing is consumed
    pub fn optional<F>(&mut self, pred: F) -> Result<Option<Element<'a>>, Asn1Error>
    where
        F: FnOnce(&Element<'a>) -> bool,
    {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let (element, rest) = Element::parse(self.rest, self.rules)?;
        if !pred(&element) {
            return Ok(None);
        }
        self.rest = rest;
        Ok(Some(element))
    }

    /// Next value when it is `[number]` context-specific
    pub fn optional_context(&mut self, number: u32) -> Result<Option<Element<'a>>, Asn1Error> {
        self.optional(|element| element.is_context(number))
    }

    /// Require that nothing is left
    pub fn finish(&self, what: &'static str) -> Result<(), Asn1Error> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(Asn1Error::TrailingData(what))
        }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Result<Element<'a>, Asn1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match Element::parse(self.rest, self.rules) {
            Ok((element, rest)) => {
                self.rest = rest;
                Some(Ok(element))
            }
            Err(err) => {
                self.rest = &[];
                Some(Err(err))
            }
        }
    }
}

/// Decoded AlgorithmIdentifier with its parameters left encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier<'a> {
    pub oid: Oid<'a>,
    pub parameters: Option<Element<'a>>,
}

impl<'a> AlgorithmIdentifier<'a> {
    pub fn from_element(element: Element<'a>) -> Result<Self, Asn1Error> {
        let element = element.expect(Tag::Sequence, "algorithm identifier")?;
        let mut fields = element.children();
        let oid = fields.required("algorithm")?.oid()?;
        let parameters = fields.next().transpose()?;
        fields.finish("algorithm identifier")?;
        Ok(Self { oid, parameters })
    }

    /// Whether the algorithm OID has the given contents octets
    pub fn is(&self, expected: &[u8]) -> bool {
        self.oid.as_bytes() == expected
    }
}
