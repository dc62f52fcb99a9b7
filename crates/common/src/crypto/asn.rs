use std::borrow::Cow;

use x509_parser::der_parser::asn1_rs::{Any, Class, FromDer, Oid, Sequence, Tag, ToDer};

use crate::error::AppError;

/// Serialize `BER`/`DER` header tag value
///
/// # Arguments
///
/// * `asn_attr` - an `ASN.1` type for a `BER`/`DER` attribute
///
/// # Returns
///
/// The serialized string value for `ASN.1` attribute header tag value (if supported).
///
pub fn stringify_asn_value(asn_attr: &Any<'_>) -> Result<String, AppError> {
    let convert_err_fn = |err| {
        Err(AppError::General(format!(
            "Failed ASN value conversion: err={:?}",
            &err
        )))
    };

    match asn_attr.header.tag() {
        Tag::GeneralString => asn_attr
            .clone()
            .generalstring()
            .map(|v| v.string())
            .or_else(convert_err_fn),
        Tag::PrintableString => asn_attr
            .clone()
            .printablestring()
            .map(|v| v.string())
            .or_else(convert_err_fn),
        Tag::Utf8String => asn_attr
            .clone()
            .utf8string()
            .map(|v| v.string())
            .or_else(convert_err_fn),
        _ => Err(AppError::General(format!(
            "unsupported tag {}",
            asn_attr.clone().header.tag()
        ))),
    }
}

/// A parsed `DER` element, along with its complete encoding (header included)
pub struct DerElement<'a> {
    pub any: Any<'a>,
    pub raw: &'a [u8],
}

impl<'a> DerElement<'a> {
    /// Element content octets
    pub fn content(&self) -> &'a [u8] {
        self.any.data
    }

    /// Universal class element with the given tag
    pub fn is_universal(&self, tag: Tag) -> bool {
        (self.any.header.class() == Class::Universal) && (self.any.header.tag() == tag)
    }

    /// Context-specific element with the given tag number
    pub fn is_context(&self, tag_number: u32) -> bool {
        (self.any.header.class() == Class::ContextSpecific)
            && (self.any.header.tag() == Tag(tag_number))
    }

    /// Ensure element is universal class with the given tag
    ///
    /// # Arguments
    ///
    /// * `tag` - Expected tag
    /// * `what` - Structure name (used in error message)
    ///
    /// # Returns
    ///
    /// A [`Result`] containing this element or a parse error.
    ///
    pub fn expect_universal(&self, tag: Tag, what: &str) -> Result<&Self, AppError> {
        if self.is_universal(tag) {
            Ok(self)
        } else {
            Err(AppError::Parse(format!(
                "Unexpected DER element for {}: expected={}, actual={}",
                what,
                tag,
                self.any.header.tag()
            )))
        }
    }

    /// Parse content octets as a series of elements
    pub fn children(&self) -> Result<Vec<DerElement<'a>>, AppError> {
        parse_der_elements(self.any.data)
    }

    /// Dotted string form of an `OBJECT IDENTIFIER` element
    pub fn oid_string(&self) -> Result<String, AppError> {
        self.expect_universal(Tag::Oid, "object identifier")?;
        Ok(Oid::new(Cow::Borrowed(self.any.data)).to_id_string())
    }

    /// Octets of a `BIT STRING` element (must have no unused bits)
    pub fn bit_string_octets(&self) -> Result<&'a [u8], AppError> {
        self.expect_universal(Tag::BitString, "bit string")?;
        match self.any.data.split_first() {
            Some((0, octets)) => Ok(octets),
            _ => Err(AppError::Parse(
                "Unsupported bit string: unused bits present".to_string(),
            )),
        }
    }

    /// Value of an `ENUMERATED` element (non-negative, at most 32 bits)
    pub fn enumerated_value(&self) -> Result<u32, AppError> {
        self.expect_universal(Tag::Enumerated, "enumerated")?;
        let content = self.any.data;
        if content.is_empty() || (content.len() > 4) || (content[0] & 0x80 != 0) {
            return Err(AppError::Parse(format!(
                "Unsupported enumerated value: value={}",
                hex::encode(content)
            )));
        }
        Ok(content
            .iter()
            .fold(0u32, |value, byte| (value << 8) | *byte as u32))
    }
}

/// Parse the first `DER` element in the given data
///
/// # Arguments
///
/// * `data` - `DER`-encoded data
///
/// # Returns
///
/// A [`Result`] containing a tuple of the parsed element and any remaining (unparsed) data.
///
pub fn parse_der_element(data: &[u8]) -> Result<(DerElement<'_>, &[u8]), AppError> {
    let (rest, any) = Any::from_der(data)
        .map_err(|err| AppError::Parse(format!("Invalid DER element: err={:?}", &err)))?;
    let raw = &data[..data.len() - rest.len()];
    Ok((DerElement { any, raw }, rest))
}

/// Parse data as a series of consecutive `DER` elements
pub fn parse_der_elements(data: &[u8]) -> Result<Vec<DerElement<'_>>, AppError> {
    let mut elements = Vec::new();
    let mut remaining = data;
    while !remaining.is_empty() {
        let (element, rest) = parse_der_element(remaining)?;
        elements.push(element);
        remaining = rest;
    }
    Ok(elements)
}

/// Encode an `ASN.1` value as `DER`
///
/// # Arguments
///
/// * `value` - Value to encode
///
/// # Returns
///
/// A [`Result`] containing the encoded element bytes.
///
pub fn to_der<T: ToDer>(value: &T) -> Result<Vec<u8>, AppError> {
    value
        .to_der_vec()
        .map_err(|err| AppError::General(format!("Failed DER encoding: err={:?}", &err)))
}

/// Encode a `DER` SEQUENCE from already-encoded elements
pub fn to_der_sequence(elements: &[Vec<u8>]) -> Result<Vec<u8>, AppError> {
    to_der(&Sequence::new(Cow::Owned(elements.concat())))
}
