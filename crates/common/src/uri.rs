use url::Url;

use crate::error::AppError;

const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Validate an absolute URI (`http`, `https` or `file` scheme)
///
/// # Arguments
///
/// * `raw_uri` - URI string to validate
///
/// # Returns
///
/// A [`Result`] containing the parsed [`Url`], or a validation error naming the rejected string.
///
pub fn validate_uri(raw_uri: &str) -> Result<Url, AppError> {
    let invalid_uri_err = |reason: String| {
        AppError::Validation(format!(
            "URI must start with either: 'http://', 'https://' or 'file://' the provided string: {} is not a valid URI: {}",
            raw_uri, reason
        ))
    };

    let url = Url::parse(raw_uri).map_err(|err| invalid_uri_err(err.to_string()))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(invalid_uri_err(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }

    Ok(url)
}
