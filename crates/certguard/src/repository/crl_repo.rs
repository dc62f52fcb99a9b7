use certguard_common::error::AppError;
use certguard_common::model::crl::{CertificateRevocationList, RevocationEntry, RevokedCertificate};

/// Unit of work executed against a transaction-scoped repository
pub type TransactionWork<'a> = dyn FnMut(&dyn CrlRepository) -> Result<(), AppError> + 'a;

/// Certificate revocation list (CRL) data repository trait
pub trait CrlRepository: Sync + Send {
    /// Process given datasource connect string (meaning depends on implementation)
    fn connect_to_datasource(&mut self, connect_spec: &str) -> Result<(), AppError>;

    /// Creates/updates a revocation list, keyed by its (unique) name.
    ///
    /// An existing list keeps its id, name and signature, while its update window and raw bytes are refreshed.
    /// Returns the assigned/existing list id on success, otherwise it returns an error.
    fn save(&self, crl: &CertificateRevocationList) -> Result<i64, AppError>;

    /// Gets a revocation list by name.
    ///
    /// Returns the list (with its revoked entry count), a not found error if no such list exists, otherwise
    /// it returns an error.
    fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError>;

    /// Returns the list of all revocation lists, ordered by id.
    fn list(&self) -> Result<Vec<CertificateRevocationList>, AppError>;

    /// Deletes a revocation list (and its revoked entries).
    ///
    /// Returns a not found error if no such list exists.
    fn delete(&self, crl_id: i64) -> Result<(), AppError>;

    /// Inserts revoked entries for a list, silently skipping entries already present for that list.
    ///
    /// Returns the number of entries stored for the list after the call, otherwise it returns an error.
    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[RevocationEntry],
    ) -> Result<usize, AppError>;

    /// Returns the revoked entries for a list, ordered by revocation date.
    fn find_revoked_entries(&self, crl_id: i64) -> Result<Vec<RevokedCertificate>, AppError>;

    /// Gets a revoked entry by serial number, across all lists.
    ///
    /// Returns the entry (naming the list that revoked it) or None on success, otherwise it returns an error.
    fn find_revoked_entry(&self, serial_number: &str)
        -> Result<Option<RevokedCertificate>, AppError>;

    /// Runs the unit of work atomically: its changes are kept only if it returns `Ok`, otherwise the
    /// store is left as it was before the call and the work's error is returned.
    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError>;
}
