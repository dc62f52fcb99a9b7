use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use ring::digest;
use serde_derive::{Deserialize, Serialize};
use ::time::OffsetDateTime;
use x509_parser::der_parser::asn1_rs::{FromDer, Integer, Null, OctetString, Oid, Tag};
use x509_parser::prelude::*;

use crate::crypto::asn::{self, DerElement};
use crate::crypto::x509::Certificate;
use crate::error::AppError;
use crate::model::reason::RevocationReason;

/// HTTP content type for OCSP requests
pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
/// HTTP content type for OCSP responses
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

const OID_SHA1: &str = "1.3.14.3.2.26";
const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
const OID_SHA1_CONTENT: [u8; 5] = [0x2b, 0x0e, 0x03, 0x02, 0x1a];
const OID_SHA256_CONTENT: [u8; 9] = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
/// `id-pkix-ocsp-basic` response type OID
const OID_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";

/// `CertID` hash algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            OID_SHA1 => Some(HashAlgorithm::Sha1),
            OID_SHA256 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    fn oid_content(&self) -> &'static [u8] {
        match self {
            HashAlgorithm::Sha1 => &OID_SHA1_CONTENT,
            HashAlgorithm::Sha256 => &OID_SHA256_CONTENT,
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        let algorithm = match self {
            HashAlgorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => &digest::SHA256,
        };
        digest::digest(algorithm, data).as_ref().to_vec()
    }
}

/// Identifies a certificate by issuer name/key hashes and serial number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    /// Serial number `INTEGER` content octets
    pub serial_number: Vec<u8>,
}

impl CertId {
    /// CertId constructor
    ///
    /// # Arguments
    ///
    /// * `hash_algorithm` - Digest used for the issuer hashes
    /// * `subject` - Certificate being identified
    /// * `issuer` - Issuer of the subject certificate
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the newly constructed [`CertId`] object.
    ///
    pub fn new(
        hash_algorithm: HashAlgorithm,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<Self, AppError> {
        let subject = subject.parse()?;
        let issuer = issuer.parse()?;
        Ok(Self {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(issuer.subject().as_raw()),
            issuer_key_hash: hash_algorithm.digest(&issuer.public_key().subject_public_key.data),
            serial_number: subject.raw_serial().to_vec(),
        })
    }

    /// `DER` encoding
    pub fn to_der(&self) -> Result<Vec<u8>, AppError> {
        let algorithm_id = asn::to_der_sequence(&[
            asn::to_der(&Oid::new(Cow::Borrowed(self.hash_algorithm.oid_content())))?,
            asn::to_der(&Null::new())?,
        ])?;
        asn::to_der_sequence(&[
            algorithm_id,
            asn::to_der(&OctetString::new(&self.issuer_name_hash))?,
            asn::to_der(&OctetString::new(&self.issuer_key_hash))?,
            asn::to_der(&Integer::new(&self.serial_number))?,
        ])
    }

    fn from_element(element: &DerElement<'_>) -> Result<Self, AppError> {
        element.expect_universal(Tag::Sequence, "CertID")?;
        let parts = element.children()?;
        if parts.len() != 4 {
            return Err(AppError::Parse("Invalid OCSP CertID structure".to_string()));
        }

        let algorithm_id = parts[0].expect_universal(Tag::Sequence, "CertID hash algorithm")?.children()?;
        let algorithm_oid = algorithm_id
            .first()
            .ok_or_else(|| AppError::Parse("Missing OCSP CertID hash algorithm".to_string()))?
            .oid_string()?;
        let hash_algorithm = HashAlgorithm::from_oid(&algorithm_oid).ok_or_else(|| {
            AppError::Parse(format!(
                "Unsupported OCSP CertID hash algorithm: oid={}",
                &algorithm_oid
            ))
        })?;

        Ok(Self {
            hash_algorithm,
            issuer_name_hash: parts[1]
                .expect_universal(Tag::OctetString, "CertID issuer name hash")?
                .content()
                .to_vec(),
            issuer_key_hash: parts[2]
                .expect_universal(Tag::OctetString, "CertID issuer key hash")?
                .content()
                .to_vec(),
            serial_number: parts[3]
                .expect_universal(Tag::Integer, "CertID serial number")?
                .content()
                .to_vec(),
        })
    }
}

/// Certificate status reported by an OCSP responder
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OcspStatus {
    Good,
    Revoked,
    Unknown,
}

impl Display for OcspStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OcspStatus::Good => f.write_str("good"),
            OcspStatus::Revoked => f.write_str("revoked"),
            OcspStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// Interpreted (and verified) OCSP response for a single certificate
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcspResponse {
    pub status: OcspStatus,
    #[serde(with = "::time::serde::rfc3339::option")]
    pub revocation_date: Option<OffsetDateTime>,
    pub revocation_reason: Option<RevocationReason>,
    #[serde(with = "::time::serde::rfc3339")]
    pub produced_at: OffsetDateTime,
    #[serde(with = "::time::serde::rfc3339")]
    pub this_update: OffsetDateTime,
    #[serde(with = "::time::serde::rfc3339::option")]
    pub next_update: Option<OffsetDateTime>,
}

/// Create an (unsigned, nonce-less) `DER`-encoded OCSP request for the given certificate, using SHA-256
///
/// # Arguments
///
/// * `subject` - Certificate to query status for
/// * `issuer` - Issuer of the subject certificate
///
/// # Returns
///
/// A [`Result`] containing the encoded `OCSPRequest`.
///
pub fn create_request(subject: &Certificate, issuer: &Certificate) -> Result<Vec<u8>, AppError> {
    let cert_id = CertId::new(HashAlgorithm::Sha256, subject, issuer)?;
    let request = asn::to_der_sequence(&[cert_id.to_der()?])?;
    let request_list = asn::to_der_sequence(&[request])?;
    let tbs_request = asn::to_der_sequence(&[request_list])?;
    asn::to_der_sequence(&[tbs_request])
}

/// Parse an OCSP response, bound to the given certificate and issuer
///
/// The response must be successful, of basic type, signed by the issuer (or by a delegated responder
/// certificate issued by it), and must carry a single response whose `CertID` matches the subject.
///
/// # Arguments
///
/// * `raw` - `DER`-encoded `OCSPResponse`
/// * `subject` - Certificate the request was made for
/// * `issuer` - Issuer of the subject certificate
///
/// # Returns
///
/// A [`Result`] containing the [`OcspResponse`], or a parse error on any malformation or mismatch.
///
pub fn parse_response(
    raw: &[u8],
    subject: &Certificate,
    issuer: &Certificate,
) -> Result<OcspResponse, AppError> {
    let (ocsp_response, _) = asn::parse_der_element(raw)?;
    ocsp_response.expect_universal(Tag::Sequence, "OCSPResponse")?;
    let parts = ocsp_response.children()?;

    let response_status = parts
        .first()
        .ok_or_else(|| AppError::Parse("Missing OCSP response status".to_string()))?
        .enumerated_value()?;
    if response_status != 0 {
        return Err(AppError::Parse(format!(
            "OCSP responder returned unsuccessful status: {}",
            response_status_name(response_status)
        )));
    }

    let response_bytes = parts
        .get(1)
        .filter(|element| element.is_context(0))
        .ok_or_else(|| AppError::Parse("Missing OCSP response bytes".to_string()))?;
    let (response_bytes, _) = asn::parse_der_element(response_bytes.content())?;
    let response_bytes = response_bytes
        .expect_universal(Tag::Sequence, "ResponseBytes")?
        .children()?;
    if response_bytes.len() != 2 {
        return Err(AppError::Parse("Invalid OCSP ResponseBytes structure".to_string()));
    }
    let response_type = response_bytes[0].oid_string()?;
    if response_type != OID_OCSP_BASIC {
        return Err(AppError::Parse(format!(
            "Unsupported OCSP response type: oid={}",
            &response_type
        )));
    }
    let basic_response = response_bytes[1].expect_universal(Tag::OctetString, "ResponseBytes response")?;

    parse_basic_response(basic_response.content(), subject, issuer)
}

fn parse_basic_response(
    raw: &[u8],
    subject: &Certificate,
    issuer: &Certificate,
) -> Result<OcspResponse, AppError> {
    let (basic_response, _) = asn::parse_der_element(raw)?;
    let parts = basic_response
        .expect_universal(Tag::Sequence, "BasicOCSPResponse")?
        .children()?;
    if parts.len() < 3 {
        return Err(AppError::Parse("Invalid BasicOCSPResponse structure".to_string()));
    }

    let tbs_response_data = parts[0].expect_universal(Tag::Sequence, "ResponseData")?;
    let signature_algorithm = parts[1]
        .expect_universal(Tag::Sequence, "BasicOCSPResponse signature algorithm")?
        .children()?;
    let signature_algorithm = signature_algorithm
        .first()
        .ok_or_else(|| AppError::Parse("Missing OCSP signature algorithm".to_string()))?
        .oid_string()?;
    let signature = parts[2].bit_string_octets()?;

    let mut responder_certs = Vec::new();
    if let Some(certs) = parts.get(3).filter(|element| element.is_context(0)) {
        let (cert_list, _) = asn::parse_der_element(certs.content())?;
        for cert in cert_list.children()? {
            responder_certs.push(Certificate::from_der(cert.raw)?);
        }
    }

    verify_response_signature(
        &signature_algorithm,
        tbs_response_data.raw,
        signature,
        issuer,
        &responder_certs,
    )?;

    let mut response_data = tbs_response_data.children()?.into_iter().peekable();
    if response_data.peek().map(|element| element.is_context(0)) == Some(true) {
        response_data.next();
    }
    let _responder_id = response_data
        .next()
        .filter(|element| element.is_context(1) || element.is_context(2))
        .ok_or_else(|| AppError::Parse("Missing OCSP responder ID".to_string()))?;
    let produced_at = response_data
        .next()
        .ok_or_else(|| AppError::Parse("Missing OCSP producedAt".to_string()))
        .and_then(|element| parse_generalized_time(&element))?;
    let responses = response_data
        .next()
        .ok_or_else(|| AppError::Parse("Missing OCSP responses".to_string()))?;

    let subject_cert = subject.parse()?;
    let mut issuer_mismatch = false;
    for single_response in responses
        .expect_universal(Tag::Sequence, "ResponseData responses")?
        .children()?
    {
        let single_response = single_response
            .expect_universal(Tag::Sequence, "SingleResponse")?
            .children()?;
        let cert_id = CertId::from_element(
            single_response
                .first()
                .ok_or_else(|| AppError::Parse("Missing SingleResponse CertID".to_string()))?,
        )?;
        if cert_id.serial_number != subject_cert.raw_serial() {
            continue;
        }
        if cert_id != CertId::new(cert_id.hash_algorithm, subject, issuer)? {
            issuer_mismatch = true;
            continue;
        }

        return parse_single_response(&single_response, produced_at);
    }

    if issuer_mismatch {
        Err(AppError::Parse(
            "OCSP response issuer does not match the supplied issuer certificate".to_string(),
        ))
    } else {
        Err(AppError::Parse(
            "OCSP response does not match the supplied certificate".to_string(),
        ))
    }
}

fn parse_single_response(
    single_response: &[DerElement<'_>],
    produced_at: OffsetDateTime,
) -> Result<OcspResponse, AppError> {
    if single_response.len() < 3 {
        return Err(AppError::Parse("Invalid SingleResponse structure".to_string()));
    }

    let cert_status = &single_response[1];
    let (status, revocation_date, revocation_reason) = if cert_status.is_context(0) {
        (OcspStatus::Good, None, None)
    } else if cert_status.is_context(1) {
        let revoked_info = cert_status.children()?;
        let revocation_date = revoked_info
            .first()
            .ok_or_else(|| AppError::Parse("Missing OCSP revocation time".to_string()))
            .and_then(parse_generalized_time)?;
        let revocation_reason = match revoked_info.get(1).filter(|element| element.is_context(0)) {
            Some(reason) => {
                let (reason, _) = asn::parse_der_element(reason.content())?;
                RevocationReason::from_code(reason.enumerated_value()?).map_err(|err| {
                    AppError::Parse(format!("Invalid OCSP revocation reason: err={}", &err))
                })?
            }
            None => RevocationReason::Unspecified,
        };
        (OcspStatus::Revoked, Some(revocation_date), Some(revocation_reason))
    } else if cert_status.is_context(2) {
        (OcspStatus::Unknown, None, None)
    } else {
        return Err(AppError::Parse("Invalid OCSP certificate status".to_string()));
    };

    let this_update = parse_generalized_time(&single_response[2])?;
    let next_update = match single_response.get(3).filter(|element| element.is_context(0)) {
        Some(next_update) => {
            let (next_update, _) = asn::parse_der_element(next_update.content())?;
            Some(parse_generalized_time(&next_update)?)
        }
        None => None,
    };

    Ok(OcspResponse {
        status,
        revocation_date,
        revocation_reason,
        produced_at,
        this_update,
        next_update,
    })
}

/// Accept signature by the issuer itself, or by an embedded responder certificate that the issuer signed
/// for OCSP signing.
fn verify_response_signature(
    signature_algorithm: &str,
    tbs_response_data: &[u8],
    signature: &[u8],
    issuer: &Certificate,
    responder_certs: &[Certificate],
) -> Result<(), AppError> {
    if issuer.verify_signed_data(signature_algorithm, tbs_response_data, signature)? {
        return Ok(());
    }

    for responder_cert in responder_certs {
        if (responder_cert != issuer)
            && responder_cert.is_issued_by(issuer)?
            && responder_cert.has_ocsp_signing_usage()?
            && responder_cert.verify_signed_data(signature_algorithm, tbs_response_data, signature)?
        {
            return Ok(());
        }
    }

    Err(AppError::Parse(
        "OCSP response signature verification failed".to_string(),
    ))
}

fn parse_generalized_time(element: &DerElement<'_>) -> Result<OffsetDateTime, AppError> {
    element.expect_universal(Tag::GeneralizedTime, "OCSP time")?;
    ASN1Time::from_der(element.raw)
        .map(|(_, time)| time.to_datetime())
        .map_err(|err| AppError::Parse(format!("Invalid OCSP time: err={:?}", &err)))
}

fn response_status_name(response_status: u32) -> String {
    match response_status {
        1 => "malformedRequest".to_string(),
        2 => "internalError".to_string(),
        3 => "tryLater".to_string(),
        5 => "sigRequired".to_string(),
        6 => "unauthorized".to_string(),
        _ => format!("unknown({})", response_status),
    }
}
