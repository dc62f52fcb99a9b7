use crate::repository::crl_repo::{CrlRepository, TransactionWork};
use crate::repository::diesel_orm::crl_repo::DieselCrlRepo;
use crate::repository::sqlite_db::db_conn;
use certguard_common::error::AppError;
use certguard_common::model::crl::{CertificateRevocationList, RevocationEntry, RevokedCertificate};

/// SQLite-backed CRL Repository
pub struct SqliteCrlRepo {
    /// CRL repository ORM delegate
    crl_repo_delegate: Option<Box<dyn CrlRepository>>,
}

impl SqliteCrlRepo {
    /// Creates a new CRL repository.
    ///
    /// # Returns
    ///
    /// A newly constructed [`SqliteCrlRepo`] object.
    ///
    pub fn new() -> SqliteCrlRepo {
        SqliteCrlRepo {
            crl_repo_delegate: None,
        }
    }

    fn delegate(&self) -> Result<&dyn CrlRepository, AppError> {
        self.crl_repo_delegate
            .as_deref()
            .ok_or_else(|| AppError::Storage("CRL repository is not connected".to_string()))
    }
}

impl Default for SqliteCrlRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl CrlRepository for SqliteCrlRepo {
    fn connect_to_datasource(&mut self, connect_spec: &str) -> Result<(), AppError> {
        let connection = db_conn::INSTANCE
            .lock()
            .map_err(|err| {
                AppError::Storage(format!("Failed to access DB connections: err={}", err))
            })?
            .establish_connection(connect_spec)?;
        self.crl_repo_delegate = Some(Box::new(DieselCrlRepo::new(&connection)));
        Ok(())
    }

    fn save(&self, crl: &CertificateRevocationList) -> Result<i64, AppError> {
        self.delegate()?.save(crl)
    }

    fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError> {
        self.delegate()?.find(name)
    }

    fn list(&self) -> Result<Vec<CertificateRevocationList>, AppError> {
        self.delegate()?.list()
    }

    fn delete(&self, crl_id: i64) -> Result<(), AppError> {
        self.delegate()?.delete(crl_id)
    }

    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[RevocationEntry],
    ) -> Result<usize, AppError> {
        self.delegate()?.save_revoked_entries(crl_id, entries)
    }

    fn find_revoked_entries(&self, crl_id: i64) -> Result<Vec<RevokedCertificate>, AppError> {
        self.delegate()?.find_revoked_entries(crl_id)
    }

    fn find_revoked_entry(
        &self,
        serial_number: &str,
    ) -> Result<Option<RevokedCertificate>, AppError> {
        self.delegate()?.find_revoked_entry(serial_number)
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        self.delegate()?.transaction(work)
    }
}
