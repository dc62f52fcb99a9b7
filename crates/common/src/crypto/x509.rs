use std::path::Path;

use pki_types::{pem::PemObject, CertificateDer};
use ring::signature;
use x509_parser::prelude::*;

use crate::crypto::asn;
use crate::error::AppError;
use crate::file;

/// `id-ad-ocsp` access method OID
const OID_ACCESS_METHOD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
const OID_ED25519: &str = "1.3.101.112";
/// Uncompressed P-384 point length
const EC_P384_PUBLIC_KEY_LEN: usize = 97;
const PEM_PREAMBLE: &[u8] = b"-----BEGIN";

/// An owned, `DER`-encoded X.509 certificate (syntactically validated on construction)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Certificate constructor
    ///
    /// # Arguments
    ///
    /// * `der` - `DER`-encoded certificate
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the certificate, or a parse error if not a valid X.509 certificate.
    ///
    pub fn from_der(der: &[u8]) -> Result<Self, AppError> {
        let certificate = Self { der: der.to_vec() };
        certificate.parse()?;
        Ok(certificate)
    }

    /// `DER` encoding accessor
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Parsed certificate (borrows the `DER` encoding)
    pub fn parse(&self) -> Result<X509Certificate<'_>, AppError> {
        parse_x509_certificate(&self.der)
            .map(|(_, certificate)| certificate)
            .map_err(|err| {
                AppError::ParseWithMsgAndErr("Failed parsing certificate".to_string(), Box::new(err))
            })
    }

    /// Serial number (decimal string)
    pub fn serial_number(&self) -> Result<String, AppError> {
        Ok(self.parse()?.serial.to_string())
    }

    /// Subject distinguished name
    pub fn subject(&self) -> Result<String, AppError> {
        Ok(self.parse()?.subject().to_string())
    }

    /// Issuer distinguished name
    pub fn issuer(&self) -> Result<String, AppError> {
        Ok(self.parse()?.issuer().to_string())
    }

    /// OCSP responder URIs from the Authority Information Access extension
    pub fn ocsp_urls(&self) -> Result<Vec<String>, AppError> {
        let certificate = self.parse()?;
        let mut ocsp_urls = Vec::new();
        for extension in certificate.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(info_access) = extension.parsed_extension() {
                for access_desc in &info_access.accessdescs {
                    if access_desc.access_method.to_id_string() != OID_ACCESS_METHOD_OCSP {
                        continue;
                    }
                    if let GeneralName::URI(uri) = &access_desc.access_location {
                        ocsp_urls.push(uri.to_string());
                    }
                }
            }
        }
        Ok(ocsp_urls)
    }

    /// Whether certificate carries the OCSP signing extended key usage
    pub fn has_ocsp_signing_usage(&self) -> Result<bool, AppError> {
        let certificate = self.parse()?;
        Ok(certificate.extensions().iter().any(|extension| {
            matches!(extension.parsed_extension(), ParsedExtension::ExtendedKeyUsage(key_usage) if key_usage.ocsp_signing)
        }))
    }

    /// Verify a signature made with this certificate's key
    ///
    /// # Arguments
    ///
    /// * `signature_algorithm` - Signature algorithm OID (dotted string)
    /// * `message` - Signed data
    /// * `signature` - Signature octets
    ///
    /// # Returns
    ///
    /// A [`Result`] containing whether the signature is valid. Unsupported algorithms are an error.
    ///
    pub fn verify_signed_data(
        &self,
        signature_algorithm: &str,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, AppError> {
        let certificate = self.parse()?;
        let public_key = certificate.public_key().subject_public_key.data.as_ref();
        let algorithm = verification_algorithm(signature_algorithm, public_key.len())?;

        Ok(signature::UnparsedPublicKey::new(algorithm, public_key)
            .verify(message, signature)
            .is_ok())
    }

    /// Whether this certificate's signature verifies under the given issuer's key
    pub fn is_issued_by(&self, issuer: &Certificate) -> Result<bool, AppError> {
        let (certificate, _) = asn::parse_der_element(&self.der)?;
        let parts = certificate.children()?;
        if parts.len() != 3 {
            return Err(AppError::Parse(
                "Invalid certificate structure".to_string(),
            ));
        }
        let signature_algorithm = parts[1].children()?;
        let signature_algorithm = signature_algorithm
            .first()
            .ok_or_else(|| AppError::Parse("Missing certificate signature algorithm".to_string()))?
            .oid_string()?;

        issuer.verify_signed_data(
            &signature_algorithm,
            parts[0].raw,
            parts[2].bit_string_octets()?,
        )
    }
}

/// Resolve verification algorithm for signature algorithm OID and public key (length disambiguates EC curves)
fn verification_algorithm(
    signature_algorithm: &str,
    public_key_len: usize,
) -> Result<&'static dyn signature::VerificationAlgorithm, AppError> {
    let p384_key = public_key_len == EC_P384_PUBLIC_KEY_LEN;
    match signature_algorithm {
        OID_ECDSA_WITH_SHA256 if p384_key => Ok(&signature::ECDSA_P384_SHA256_ASN1),
        OID_ECDSA_WITH_SHA256 => Ok(&signature::ECDSA_P256_SHA256_ASN1),
        OID_ECDSA_WITH_SHA384 if p384_key => Ok(&signature::ECDSA_P384_SHA384_ASN1),
        OID_ECDSA_WITH_SHA384 => Ok(&signature::ECDSA_P256_SHA384_ASN1),
        OID_SHA1_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY),
        OID_SHA256_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        OID_SHA384_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        OID_SHA512_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        OID_ED25519 => Ok(&signature::ED25519),
        _ => Err(AppError::Parse(format!(
            "Unsupported signature algorithm: oid={}",
            signature_algorithm
        ))),
    }
}

/// Load certificates from encoded data: a PEM bundle (in file order) or a single `DER` certificate
///
/// # Arguments
///
/// * `data` - PEM or `DER` data
///
/// # Returns
///
/// A [`Result`] containing the (non-empty) list of certificates.
///
pub fn load_certificates(data: &[u8]) -> Result<Vec<Certificate>, AppError> {
    let start = data
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(data.len());

    if !data[start..].starts_with(PEM_PREAMBLE) {
        return Ok(vec![Certificate::from_der(data)?]);
    }

    let certificates = CertificateDer::pem_slice_iter(data)
        .map(|result| {
            result
                .map_err(|err| {
                    AppError::Parse(format!("Failed parsing PEM certificate: err={:?}", &err))
                })
                .and_then(|cert_der| Certificate::from_der(cert_der.as_ref()))
        })
        .collect::<Result<Vec<Certificate>, AppError>>()?;

    if certificates.is_empty() {
        return Err(AppError::Parse("No certificates found in PEM data".to_string()));
    }
    Ok(certificates)
}

/// Load certificates from the given PEM or `DER` file
pub fn load_certificates_file(filepath: &Path) -> Result<Vec<Certificate>, AppError> {
    load_certificates(&file::load_binary_data(filepath)?)
}
