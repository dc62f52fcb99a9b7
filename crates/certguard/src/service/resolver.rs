use std::sync::{Arc, Mutex};

use crate::repository::crl_repo::CrlRepository;
use certguard_common::crypto::x509::Certificate;
use certguard_common::error::AppError;
use certguard_common::model::crl::RevokedCertificate;

/// Outcome of a revocation lookup against the locally cached lists
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// Serial number looked up (normalized decimal form)
    pub serial_number: String,
    /// Whether any cached list revokes the serial number
    pub found: bool,
    /// Matching revoked entry
    pub entry: Option<RevokedCertificate>,
    /// Name of the revoking list
    pub revoked_by: Option<String>,
}

/// Answers "is this serial number revoked, and by which list" from the CRL repository
pub struct RevocationResolver {
    crl_repo: Arc<Mutex<dyn CrlRepository>>,
}

impl RevocationResolver {
    /// RevocationResolver constructor
    ///
    /// # Arguments
    ///
    /// * `crl_repo` - CRL repository
    ///
    /// # Returns
    ///
    /// A newly constructed [`RevocationResolver`] object.
    ///
    pub fn new(crl_repo: &Arc<Mutex<dyn CrlRepository>>) -> Self {
        Self {
            crl_repo: crl_repo.clone(),
        }
    }

    /// Look up a serial number across all cached lists
    ///
    /// # Arguments
    ///
    /// * `serial_number` - Decimal serial number (leading zeros are ignored)
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the [`Resolution`]. Not being revoked is a successful outcome.
    ///
    pub fn resolve(&self, serial_number: &str) -> Result<Resolution, AppError> {
        let serial_number = Self::normalize_serial_number(serial_number)?;

        let entry = self
            .crl_repo
            .lock()
            .map_err(|err| {
                AppError::Storage(format!("Failed to access CRL repository: err={}", err))
            })?
            .find_revoked_entry(&serial_number)?;

        Ok(Resolution {
            serial_number,
            found: entry.is_some(),
            revoked_by: entry
                .as_ref()
                .and_then(|entry| entry.revoked_by.clone()),
            entry,
        })
    }

    /// Look up the serial number of the given certificate across all cached lists
    pub fn resolve_certificate(&self, certificate: &Certificate) -> Result<Resolution, AppError> {
        self.resolve(&certificate.serial_number()?)
    }

    fn normalize_serial_number(serial_number: &str) -> Result<String, AppError> {
        let serial_number = serial_number.trim();
        if serial_number.is_empty() || !serial_number.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(AppError::Validation(format!(
                "Serial number must be a decimal number: serial={:?}",
                serial_number
            )));
        }

        let significant = serial_number.trim_start_matches('0');
        Ok(match significant.is_empty() {
            true => "0".to_string(),
            false => significant.to_string(),
        })
    }
}
