use pki_types::{pem::PemObject, CertificateRevocationListDer};
use x509_parser::der_parser::asn1_rs::Tag;
use x509_parser::prelude::*;

use crate::crypto::asn;
use crate::error::AppError;
use crate::model::crl::{RevocationEntry, RevocationList};
use crate::model::reason::RevocationReason;

/// `id-ce-cRLReasons` extension OID
const OID_CRL_REASON_CODE: &str = "2.5.29.21";
const PEM_PREAMBLE: &[u8] = b"-----BEGIN";

/// Decode a certificate revocation list (CRL)
///
/// Accepts `DER` or PEM-armoured (`X509 CRL`) input. The list signature is carried through as opaque
/// bytes and is not verified against any issuer.
///
/// # Arguments
///
/// * `raw` - Encoded CRL bytes
///
/// # Returns
///
/// A [`Result`] containing the decoded [`RevocationList`] (without a source URL).
///
pub fn decode(raw: &[u8]) -> Result<RevocationList, AppError> {
    decode_from_source(raw, "raw bytes")
}

/// Decode a certificate revocation list (CRL), labelling errors with the given origin
///
/// # Arguments
///
/// * `raw` - Encoded CRL bytes
/// * `source` - Origin of the bytes (URL, file path), used in error messages
///
/// # Returns
///
/// A [`Result`] containing the decoded [`RevocationList`] (without a source URL).
/// Malformed input yields a parse error, an unassigned entry reason code yields a validation error.
///
pub fn decode_from_source(raw: &[u8], source: &str) -> Result<RevocationList, AppError> {
    let der = if is_pem(raw) {
        CertificateRevocationListDer::from_pem_slice(raw)
            .map_err(|err| {
                AppError::Parse(format!("cannot parse CRL from {:?}: err={:?}", source, &err))
            })?
            .as_ref()
            .to_vec()
    } else {
        raw.to_vec()
    };

    let (_, crl) = parse_x509_crl(&der).map_err(|err| {
        AppError::ParseWithMsgAndErr(format!("cannot parse CRL from {:?}", source), Box::new(err))
    })?;

    let entries = crl
        .iter_revoked_certificates()
        .map(decode_revoked_certificate)
        .collect::<Result<Vec<RevocationEntry>, AppError>>()?;

    Ok(RevocationList {
        name: issuer_name(crl.issuer()),
        signature: crl.signature_value.data.to_vec(),
        this_update: crl.last_update().to_datetime(),
        next_update: crl.next_update().map(|next_update| next_update.to_datetime()),
        raw: raw.to_vec(),
        source_url: None,
        entries,
    })
}

/// Issuer common name, or the full distinguished name if it carries no CN
fn issuer_name(issuer: &X509Name<'_>) -> String {
    issuer
        .iter_common_name()
        .next()
        .and_then(|common_name| asn::stringify_asn_value(common_name.attr_value()).ok())
        .unwrap_or_else(|| issuer.to_string())
}

fn decode_revoked_certificate(
    revoked_cert: &RevokedCertificate<'_>,
) -> Result<RevocationEntry, AppError> {
    let mut reason = RevocationReason::Unspecified;
    for extension in revoked_cert.extensions() {
        if extension.oid.to_id_string() == OID_CRL_REASON_CODE {
            reason = decode_reason_code(extension.value)?;
        }
    }

    Ok(RevocationEntry {
        serial_number: revoked_cert.serial().to_string(),
        reason,
        revocation_date: revoked_cert.revocation_date.to_datetime(),
    })
}

/// Decode the `CRLReason` `ENUMERATED` extension value
fn decode_reason_code(extension_value: &[u8]) -> Result<RevocationReason, AppError> {
    let (element, _) = asn::parse_der_element(extension_value)?;
    element.expect_universal(Tag::Enumerated, "CRL reason code")?;

    let code = element.enumerated_value().map_err(|_| {
        AppError::Validation(format!(
            "invalid ReasonCode on revoked certificate: {}",
            hex::encode(element.content())
        ))
    })?;

    RevocationReason::from_code(code)
}

fn is_pem(raw: &[u8]) -> bool {
    let start = raw
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(raw.len());
    raw[start..].starts_with(PEM_PREAMBLE)
}
