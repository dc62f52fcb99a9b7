use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_derive::{Deserialize, Serialize};

use crate::repository::crl_repo::{CrlRepository, TransactionWork};
use certguard_common::error::AppError;
use certguard_common::file;
use certguard_common::logging::debug;
use certguard_common::model::crl::{CertificateRevocationList, RevocationEntry, RevokedCertificate};
use certguard_common::target;

/// Revocation store state (also the JSON backing file layout)
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CrlData {
    #[serde(default)]
    revocation_lists: Vec<CertificateRevocationList>,
    #[serde(default)]
    revoked_certificates: Vec<RevokedCertificate>,
    /// Highest list id ever assigned (ids are never reused)
    #[serde(default)]
    last_crl_id: i64,
    /// Highest revoked entry id ever assigned
    #[serde(default)]
    last_revoked_cert_id: i64,
}

impl CrlData {
    fn revoked_count(&self, crl_id: i64) -> u64 {
        self.revoked_certificates
            .iter()
            .filter(|revoked_cert| revoked_cert.revocation_list_id == crl_id)
            .count() as u64
    }

    fn with_revoked_count(&self, crl: &CertificateRevocationList) -> CertificateRevocationList {
        let mut crl = crl.clone();
        crl.revoked_count = self.revoked_count(crl.id);
        crl
    }

    fn save(&mut self, crl: &CertificateRevocationList) -> i64 {
        if let Some(existing_crl) = self
            .revocation_lists
            .iter_mut()
            .find(|existing_crl| existing_crl.name == crl.name)
        {
            existing_crl.this_update = crl.this_update;
            existing_crl.next_update = crl.next_update;
            existing_crl.raw = crl.raw.clone();
            return existing_crl.id;
        }

        let crl_id = self
            .revocation_lists
            .iter()
            .map(|existing_crl| existing_crl.id)
            .fold(self.last_crl_id, i64::max)
            + 1;
        self.last_crl_id = crl_id;
        let mut new_crl = crl.clone();
        new_crl.id = crl_id;
        new_crl.revoked_count = 0;
        self.revocation_lists.push(new_crl);
        crl_id
    }

    fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError> {
        self.revocation_lists
            .iter()
            .find(|crl| crl.name == name)
            .map(|crl| self.with_revoked_count(crl))
            .ok_or_else(|| AppError::NotFound(format!("Revocation list not found: name={}", name)))
    }

    fn list(&self) -> Vec<CertificateRevocationList> {
        let mut crls: Vec<CertificateRevocationList> = self
            .revocation_lists
            .iter()
            .map(|crl| self.with_revoked_count(crl))
            .collect();
        crls.sort_by_key(|crl| crl.id);
        crls
    }

    fn delete(&mut self, crl_id: i64) -> Result<(), AppError> {
        let position = self
            .revocation_lists
            .iter()
            .position(|crl| crl.id == crl_id)
            .ok_or_else(|| AppError::NotFound(format!("Revocation list not found: id={}", crl_id)))?;

        self.revocation_lists.remove(position);
        self.revoked_certificates
            .retain(|revoked_cert| revoked_cert.revocation_list_id != crl_id);
        Ok(())
    }

    fn save_revoked_entries(
        &mut self,
        crl_id: i64,
        entries: &[RevocationEntry],
    ) -> Result<usize, AppError> {
        if !self.revocation_lists.iter().any(|crl| crl.id == crl_id) {
            return Err(AppError::Storage(format!(
                "Revocation list does not exist for revoked entries: id={}",
                crl_id
            )));
        }

        let mut last_id = self
            .revoked_certificates
            .iter()
            .map(|revoked_cert| revoked_cert.id)
            .fold(self.last_revoked_cert_id, i64::max);

        for entry in entries {
            let exists = self.revoked_certificates.iter().any(|revoked_cert| {
                (revoked_cert.revocation_list_id == crl_id)
                    && (revoked_cert.serial_number == entry.serial_number)
            });
            if exists {
                continue;
            }

            last_id += 1;
            let mut revoked_cert = RevokedCertificate::new(crl_id, entry);
            revoked_cert.id = last_id;
            self.revoked_certificates.push(revoked_cert);
        }
        self.last_revoked_cert_id = last_id;

        Ok(self.revoked_count(crl_id) as usize)
    }

    fn find_revoked_entries(&self, crl_id: i64) -> Vec<RevokedCertificate> {
        let mut revoked_certs: Vec<RevokedCertificate> = self
            .revoked_certificates
            .iter()
            .filter(|revoked_cert| revoked_cert.revocation_list_id == crl_id)
            .cloned()
            .collect();
        revoked_certs.sort_by(|cert1, cert2| {
            cert1
                .revocation_date
                .cmp(&cert2.revocation_date)
                .then(cert1.id.cmp(&cert2.id))
        });
        revoked_certs
    }

    fn find_revoked_entry(&self, serial_number: &str) -> Option<RevokedCertificate> {
        self.revoked_certificates
            .iter()
            .filter(|revoked_cert| revoked_cert.serial_number == serial_number)
            .min_by_key(|revoked_cert| revoked_cert.id)
            .map(|revoked_cert| {
                let mut revoked_cert = revoked_cert.clone();
                revoked_cert.revoked_by = self
                    .revocation_lists
                    .iter()
                    .find(|crl| crl.id == revoked_cert.revocation_list_id)
                    .map(|crl| crl.name.clone());
                revoked_cert
            })
    }

    /// Run work against a copy of this state, adopting the copy only on success
    fn transaction(&mut self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        let mut working_data = self.clone();
        work(&InMemTransactionRepo {
            crl_data: Mutex::new(&mut working_data),
        })?;
        *self = working_data;
        Ok(())
    }
}

/// In-memory CRL repository, optionally backed by a JSON file (written through on every committed change)
pub struct InMemCrlRepo {
    crl_data: RwLock<CrlData>,
    source_file: Option<PathBuf>,
}

impl InMemCrlRepo {
    /// Creates a new (empty) in-memory CRL store.
    pub fn new() -> InMemCrlRepo {
        InMemCrlRepo {
            crl_data: RwLock::new(CrlData::default()),
            source_file: None,
        }
    }

    fn access_data_for_write(&self) -> Result<RwLockWriteGuard<CrlData>, AppError> {
        self.crl_data.write().map_err(|err| {
            AppError::Storage(format!("Failed to access write lock to DB: err={}", err))
        })
    }

    fn access_data_for_read(&self) -> Result<RwLockReadGuard<CrlData>, AppError> {
        self.crl_data.read().map_err(|err| {
            AppError::Storage(format!("Failed to access read lock to DB: err={}", err))
        })
    }

    /// Apply a mutation, then write the resulting state to the backing file (if any)
    fn mutate<T>(
        &self,
        mutation: impl FnOnce(&mut CrlData) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut data = self.access_data_for_write()?;
        let mut working_data = data.clone();
        let result = mutation(&mut working_data)?;
        if let Some(source_file) = &self.source_file {
            Self::store_data(source_file, &working_data)?;
        }
        *data = working_data;
        Ok(result)
    }

    fn load_data(source_file: &Path) -> Result<CrlData, AppError> {
        let json = file::load_text_data(source_file)?;
        serde_json::from_str(&json).map_err(|err| {
            AppError::StorageWithMsgAndErr(
                format!("Failed to parse JSON: path={:?}", source_file),
                Box::new(err),
            )
        })
    }

    fn store_data(source_file: &Path, data: &CrlData) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(data).map_err(|err| {
            AppError::StorageWithMsgAndErr(
                format!("Failed to serialize JSON: path={:?}", source_file),
                Box::new(err),
            )
        })?;
        file::write_binary_data(source_file, &json)
    }
}

impl Default for InMemCrlRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl CrlRepository for InMemCrlRepo {
    fn connect_to_datasource(&mut self, connect_spec: &str) -> Result<(), AppError> {
        let source_file = PathBuf::from(connect_spec);

        let data = match source_file.exists() {
            true => Self::load_data(&source_file)?,
            false => CrlData::default(),
        };

        debug(
            &target!(),
            &format!(
                "Loaded in-memory CRL store: path={:?}, lists={}, entries={}",
                &source_file,
                data.revocation_lists.len(),
                data.revoked_certificates.len()
            ),
        );

        *self.access_data_for_write()? = data;
        self.source_file = Some(source_file);
        Ok(())
    }

    fn save(&self, crl: &CertificateRevocationList) -> Result<i64, AppError> {
        self.mutate(|data| Ok(data.save(crl)))
    }

    fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError> {
        self.access_data_for_read()?.find(name)
    }

    fn list(&self) -> Result<Vec<CertificateRevocationList>, AppError> {
        Ok(self.access_data_for_read()?.list())
    }

    fn delete(&self, crl_id: i64) -> Result<(), AppError> {
        self.mutate(|data| data.delete(crl_id))
    }

    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[RevocationEntry],
    ) -> Result<usize, AppError> {
        self.mutate(|data| data.save_revoked_entries(crl_id, entries))
    }

    fn find_revoked_entries(&self, crl_id: i64) -> Result<Vec<RevokedCertificate>, AppError> {
        Ok(self.access_data_for_read()?.find_revoked_entries(crl_id))
    }

    fn find_revoked_entry(
        &self,
        serial_number: &str,
    ) -> Result<Option<RevokedCertificate>, AppError> {
        Ok(self.access_data_for_read()?.find_revoked_entry(serial_number))
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        self.mutate(|data| data.transaction(work))
    }
}

/// Transaction-scoped view over a working copy of the store state
struct InMemTransactionRepo<'a> {
    crl_data: Mutex<&'a mut CrlData>,
}

impl<'a> InMemTransactionRepo<'a> {
    fn access_data(&self) -> Result<MutexGuard<'_, &'a mut CrlData>, AppError> {
        self.crl_data.lock().map_err(|err| {
            AppError::Storage(format!("Failed to access transaction data: err={}", err))
        })
    }
}

impl CrlRepository for InMemTransactionRepo<'_> {
    fn connect_to_datasource(&mut self, _connect_spec: &str) -> Result<(), AppError> {
        Err(AppError::Storage(
            "Cannot connect to datasource within a transaction".to_string(),
        ))
    }

    fn save(&self, crl: &CertificateRevocationList) -> Result<i64, AppError> {
        Ok(self.access_data()?.save(crl))
    }

    fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError> {
        self.access_data()?.find(name)
    }

    fn list(&self) -> Result<Vec<CertificateRevocationList>, AppError> {
        Ok(self.access_data()?.list())
    }

    fn delete(&self, crl_id: i64) -> Result<(), AppError> {
        self.access_data()?.delete(crl_id)
    }

    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[RevocationEntry],
    ) -> Result<usize, AppError> {
        self.access_data()?.save_revoked_entries(crl_id, entries)
    }

    fn find_revoked_entries(&self, crl_id: i64) -> Result<Vec<RevokedCertificate>, AppError> {
        Ok(self.access_data()?.find_revoked_entries(crl_id))
    }

    fn find_revoked_entry(
        &self,
        serial_number: &str,
    ) -> Result<Option<RevokedCertificate>, AppError> {
        Ok(self.access_data()?.find_revoked_entry(serial_number))
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        self.access_data()?.transaction(work)
    }
}
