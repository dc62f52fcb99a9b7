use std::sync::Arc;

use crate::service::http::HttpTransport;
use certguard_common::crypto::ocsp::{self, OcspResponse};
use certguard_common::crypto::x509::Certificate;
use certguard_common::error::AppError;
use certguard_common::logging::{debug, info};
use certguard_common::target;
use certguard_common::uri;

/// Live revocation status checks against an OCSP responder
pub struct OcspClient {
    http_transport: Arc<dyn HttpTransport>,
}

impl OcspClient {
    /// OcspClient constructor
    ///
    /// # Arguments
    ///
    /// * `http_transport` - HTTP client used to post OCSP requests
    ///
    /// # Returns
    ///
    /// A newly constructed [`OcspClient`] object.
    ///
    pub fn new(http_transport: &Arc<dyn HttpTransport>) -> Self {
        Self {
            http_transport: http_transport.clone(),
        }
    }

    /// Query the revocation status of a certificate
    ///
    /// Without an explicit responder URL, the first OCSP URI of the certificate's Authority Information
    /// Access extension is used. The response must be signed for, and must match, the given
    /// certificate and issuer.
    ///
    /// # Arguments
    ///
    /// * `certificate` - Certificate to check
    /// * `issuer` - Issuer of `certificate`
    /// * `responder_url` - OCSP responder URL override
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the verified [`OcspResponse`].
    ///
    pub fn request(
        &self,
        certificate: Option<&Certificate>,
        issuer: Option<&Certificate>,
        responder_url: Option<&str>,
    ) -> Result<OcspResponse, AppError> {
        let certificate =
            certificate.ok_or_else(|| AppError::Validation("certificate is nil".to_string()))?;
        let issuer =
            issuer.ok_or_else(|| AppError::Validation("certificate Issuer is nil".to_string()))?;

        let responder_url = match responder_url {
            Some(responder_url) => responder_url.to_string(),
            None => certificate.ocsp_urls()?.into_iter().next().ok_or_else(|| {
                AppError::Validation(
                    "certificate carries no OCSP responder URL, one must be supplied".to_string(),
                )
            })?,
        };
        let responder_url = uri::validate_uri(&responder_url).map_err(|err| {
            AppError::Validation(format!("could not validate OCSP server URL: {}", err))
        })?;

        let request = ocsp::create_request(certificate, issuer)?;
        debug(
            &target!(),
            &format!("Sending OCSP request: url={}, size={}", &responder_url, request.len()),
        );

        let raw_response = self
            .http_transport
            .post(
                &responder_url,
                ocsp::OCSP_REQUEST_CONTENT_TYPE,
                ocsp::OCSP_RESPONSE_CONTENT_TYPE,
                request,
            )?
            .into_success_body()?;

        let response =
            ocsp::parse_response(&raw_response, certificate, issuer).map_err(|err| {
                AppError::ParseWithMsgAndErr(
                    "could not parse OCSP response for certificate".to_string(),
                    Box::new(err),
                )
            })?;

        info(
            &target!(),
            &format!(
                "OCSP status: serial={}, status={}",
                certificate.serial_number()?,
                &response.status
            ),
        );
        Ok(response)
    }
}
