use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use certguard_common::error::AppError;

/// Status and body of a completed HTTP exchange
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Consume the response, requiring a 2xx status
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the response body, or a network error naming the status code.
    ///
    pub fn into_success_body(self) -> Result<Vec<u8>, AppError> {
        if !(200..300).contains(&self.status) {
            return Err(AppError::Network(format!(
                "server responded with a non 2xx status code: {}",
                self.status
            )));
        }
        Ok(self.body)
    }
}

/// Blocking HTTP client seam
pub trait HttpTransport: Sync + Send {
    /// Perform a GET request
    fn get(&self, url: &Url) -> Result<HttpResponse, AppError>;

    /// Perform a POST request with the given body and content negotiation headers
    fn post(
        &self,
        url: &Url,
        content_type: &str,
        accept: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse, AppError>;
}

/// [`HttpTransport`] over a `reqwest` blocking client, with a per-request timeout
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// ReqwestTransport constructor
    ///
    /// # Arguments
    ///
    /// * `timeout` - Total time allowed per request (connect, send and read)
    ///
    /// # Returns
    ///
    /// A [`Result`] containing a newly constructed [`ReqwestTransport`] object.
    ///
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            AppError::NetworkWithMsgAndErr("Failed to create HTTP client".to_string(), Box::new(err))
        })?;
        Ok(Self { client })
    }

    fn complete(
        url: &Url,
        response: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<HttpResponse, AppError> {
        let request_err = |err: reqwest::Error| {
            AppError::NetworkWithMsgAndErr(
                format!("HTTP request failed: url={}", url),
                Box::new(err),
            )
        };
        let response = response.map_err(request_err)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(request_err)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &Url) -> Result<HttpResponse, AppError> {
        Self::complete(url, self.client.get(url.clone()).send())
    }

    fn post(
        &self,
        url: &Url,
        content_type: &str,
        accept: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse, AppError> {
        Self::complete(
            url,
            self.client
                .post(url.clone())
                .header(CONTENT_TYPE, content_type)
                .header(ACCEPT, accept)
                .body(body)
                .send(),
        )
    }
}
