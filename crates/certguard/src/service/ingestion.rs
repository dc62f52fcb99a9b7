use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use url::Url;

use crate::repository::crl_repo::CrlRepository;
use crate::service::crl_cache::CrlCache;
use crate::service::http::HttpTransport;
use certguard_common::crypto::crl;
use certguard_common::error::AppError;
use certguard_common::file;
use certguard_common::logging::{debug, error, info};
use certguard_common::model::crl::{CertificateRevocationList, RevocationList};
use certguard_common::target;
use certguard_common::uri;

const CRL_FILE_EXTENSIONS: [&str; 3] = ["crl", "der", "pem"];

/// Acquires, decodes and persists certificate revocation lists (CRLs).
///
/// Both entry points ([`CrlIngestion::fetch`] and [`CrlIngestion::import`]) share the decode and
/// persist steps. Persistence runs in a single repository transaction, so a list is never stored
/// without its full set of revoked entries.
pub struct CrlIngestion {
    crl_repo: Arc<Mutex<dyn CrlRepository>>,
    http_transport: Arc<dyn HttpTransport>,
    crl_cache: CrlCache,
}

impl CrlIngestion {
    /// CrlIngestion constructor
    ///
    /// # Arguments
    ///
    /// * `crl_repo` - CRL repository
    /// * `http_transport` - HTTP client used to fetch CRLs
    /// * `crl_cache` - Raw CRL file cache
    ///
    /// # Returns
    ///
    /// A newly constructed [`CrlIngestion`] object.
    ///
    pub fn new(
        crl_repo: &Arc<Mutex<dyn CrlRepository>>,
        http_transport: &Arc<dyn HttpTransport>,
        crl_cache: CrlCache,
    ) -> Self {
        Self {
            crl_repo: crl_repo.clone(),
            http_transport: http_transport.clone(),
            crl_cache,
        }
    }

    /// Fetch, decode, cache and persist the CRL at the given URL (`http`, `https` or `file` scheme).
    /// Only bytes that decode as a CRL replace the cached copy.
    ///
    /// # Arguments
    ///
    /// * `raw_url` - CRL location
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the decoded [`RevocationList`] (carrying its source URL).
    ///
    pub fn fetch(&self, raw_url: &str) -> Result<RevocationList, AppError> {
        let url = uri::validate_uri(raw_url)?;

        let raw = self.acquire_from_url(&url).map_err(|err| {
            error(&target!(), &format!("CRL acquisition failed: url={}, err={}", &url, &err));
            err
        })?;

        let mut revocation_list = crl::decode_from_source(&raw, url.as_str())?;
        self.crl_cache.store(&url, &raw)?;
        revocation_list.source_url = Some(url);

        self.persist(&revocation_list)?;
        Ok(revocation_list)
    }

    /// Load, decode and persist a CRL file (`.crl`, `.der` or `.pem`)
    ///
    /// # Arguments
    ///
    /// * `filepath` - CRL file
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the decoded [`RevocationList`] (without a source URL).
    ///
    pub fn import(&self, filepath: &Path) -> Result<RevocationList, AppError> {
        let has_crl_extension = filepath
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| CRL_FILE_EXTENSIONS.contains(&extension.to_lowercase().as_str()))
            .unwrap_or(false);
        if !has_crl_extension {
            return Err(AppError::Validation(format!(
                "Unsupported CRL file type (expected .crl, .der or .pem): path={:?}",
                filepath
            )));
        }

        debug(&target!(), &format!("Importing CRL file: path={:?}", filepath));
        let raw = file::load_binary_data(filepath)?;

        let source = filepath
            .file_name()
            .map(|file_name| file_name.to_string_lossy().to_string())
            .unwrap_or_else(|| filepath.display().to_string());
        let revocation_list = crl::decode_from_source(&raw, &source)?;

        self.persist(&revocation_list)?;
        Ok(revocation_list)
    }

    fn acquire_from_url(&self, url: &Url) -> Result<Vec<u8>, AppError> {
        if url.scheme() == "file" {
            let filepath = url.to_file_path().map_err(|_| {
                AppError::Validation(format!("Invalid CRL file URL: url={}", url))
            })?;
            return file::load_binary_data(&filepath);
        }

        debug(&target!(), &format!("Fetching CRL: url={}", url));
        self.http_transport
            .get(url)
            .map_err(|err| {
                AppError::NetworkWithMsgAndErr(
                    format!("cannot retrieve CRL from revocationListURL: {}", url),
                    Box::new(err),
                )
            })?
            .into_success_body()
    }

    fn persist(&self, revocation_list: &RevocationList) -> Result<(), AppError> {
        let crl = CertificateRevocationList::from(revocation_list);
        let mut crl_id = 0;

        self.access_repo()?
            .transaction(&mut |tx_repo: &dyn CrlRepository| {
                crl_id = tx_repo.save(&crl)?;
                let saved_count =
                    tx_repo.save_revoked_entries(crl_id, &revocation_list.entries)?;
                if saved_count < revocation_list.entries.len() {
                    return Err(AppError::Storage(
                        "not all revoked certificates could be saved".to_string(),
                    ));
                }
                Ok(())
            })
            .map_err(|err| {
                error(
                    &target!(),
                    &format!("CRL persistence rolled back: name={}, err={}", &crl.name, &err),
                );
                err
            })?;

        info(
            &target!(),
            &format!(
                "Stored CRL: id={}, name={}, entries={}",
                crl_id,
                &crl.name,
                revocation_list.revoked_count()
            ),
        );
        Ok(())
    }

    fn access_repo(&self) -> Result<MutexGuard<'_, dyn CrlRepository + 'static>, AppError> {
        self.crl_repo.lock().map_err(|err| {
            AppError::Storage(format!("Failed to access CRL repository: err={}", err))
        })
    }
}

/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::crl_repo::TransactionWork;
    use crate::repository::diesel_orm::crl_repo::tests::create_crl_repository;
    use crate::repository::diesel_orm::crl_repo::DieselCrlRepo;
    use crate::repository::in_memory_db::crl_repo::InMemCrlRepo;
    use crate::service::http::tests::MockHttpTransport;
    use crate::service::http::HttpResponse;
    use crate::testutils::*;
    use certguard_common::error::ErrorKind;
    use certguard_common::model::crl::{RevocationEntry, RevokedCertificate};
    use certguard_common::model::reason::RevocationReason;
    use mockall::predicate;
    use std::path::PathBuf;
    use time::macros::datetime;

    // utils
    // =====

    /// Repository reporting one entry fewer than actually stored for every bulk insert
    struct UnderReportingCrlRepo<'a> {
        delegate: &'a dyn CrlRepository,
    }

    impl CrlRepository for UnderReportingCrlRepo<'_> {
        fn connect_to_datasource(&mut self, _connect_spec: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn save(&self, crl: &CertificateRevocationList) -> Result<i64, AppError> {
            self.delegate.save(crl)
        }
        fn find(&self, name: &str) -> Result<CertificateRevocationList, AppError> {
            self.delegate.find(name)
        }
        fn list(&self) -> Result<Vec<CertificateRevocationList>, AppError> {
            self.delegate.list()
        }
        fn delete(&self, crl_id: i64) -> Result<(), AppError> {
            self.delegate.delete(crl_id)
        }
        fn save_revoked_entries(
            &self,
            crl_id: i64,
            entries: &[RevocationEntry],
        ) -> Result<usize, AppError> {
            Ok(self
                .delegate
                .save_revoked_entries(crl_id, entries)?
                .saturating_sub(1))
        }
        fn find_revoked_entries(&self, crl_id: i64) -> Result<Vec<RevokedCertificate>, AppError> {
            self.delegate.find_revoked_entries(crl_id)
        }
        fn find_revoked_entry(
            &self,
            serial_number: &str,
        ) -> Result<Option<RevokedCertificate>, AppError> {
            self.delegate.find_revoked_entry(serial_number)
        }
        fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
            self.delegate
                .transaction(&mut |tx_repo: &dyn CrlRepository| {
                    work(&UnderReportingCrlRepo { delegate: tx_repo })
                })
        }
    }

    fn cache_dir(name: &str) -> PathBuf {
        let mut cache_dir: PathBuf = TEST_STORE_DIR_PATHPARTS.iter().collect();
        cache_dir.push(name);
        cache_dir
    }

    fn create_ingestion(
        crl_repo: &Arc<Mutex<dyn CrlRepository>>,
        http_transport: MockHttpTransport,
        cache_name: &str,
    ) -> CrlIngestion {
        let http_transport: Arc<dyn HttpTransport> = Arc::new(http_transport);
        CrlIngestion::new(crl_repo, &http_transport, CrlCache::new(&cache_dir(cache_name)))
    }

    fn create_repo() -> Arc<Mutex<dyn CrlRepository>> {
        Arc::new(Mutex::new(InMemCrlRepo::new()))
    }

    fn create_sqlite_repo() -> Arc<Mutex<dyn CrlRepository>> {
        Arc::new(Mutex::new(create_crl_repository()))
    }

    fn assert_repeated_import_is_idempotent(
        crl_repo: Arc<Mutex<dyn CrlRepository>>,
        cache_name: &str,
    ) {
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), cache_name);
        let crl_filepath: PathBuf = CRLFILE_REVOKED_MULTI_PATHPARTS.iter().collect();

        ingestion.import(&crl_filepath).unwrap();
        let first_crls = crl_repo.lock().unwrap().list().unwrap();
        let result = ingestion.import(&crl_filepath);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        let crls = crl_repo.lock().unwrap().list().unwrap();
        assert_eq!(crls, first_crls);
        assert_eq!(crls.len(), 1);
        assert_eq!(crls[0].revoked_count, 2);
        assert_eq!(
            crl_repo
                .lock()
                .unwrap()
                .find_revoked_entries(crls[0].id)
                .unwrap()
                .len(),
            2
        );
    }

    fn assert_under_reported_import_rolls_back(
        store: &'static dyn CrlRepository,
        cache_name: &str,
    ) {
        let crl_repo: Arc<Mutex<dyn CrlRepository>> =
            Arc::new(Mutex::new(UnderReportingCrlRepo { delegate: store }));
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), cache_name);
        let crl_filepath: PathBuf = CRLFILE_REVOKED_MULTI_PATHPARTS.iter().collect();

        match ingestion.import(&crl_filepath) {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Storage);
                assert_eq!(err.to_string(), "not all revoked certificates could be saved");
            }
        }

        assert!(store.list().unwrap().is_empty());
        assert_eq!(
            store.find("Certguard Second CA").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(store.find_revoked_entry("777").unwrap().is_none());
    }

    fn assert_malformed_import_leaves_store_unchanged(
        crl_repo: Arc<Mutex<dyn CrlRepository>>,
        cache_name: &str,
    ) {
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), cache_name);
        let crl_filepath: PathBuf = CRLFILE_REVOKED_123456_PATHPARTS.iter().collect();
        ingestion.import(&crl_filepath).unwrap();
        let crls_before = crl_repo.lock().unwrap().list().unwrap();
        let crl_filepath: PathBuf = CRLFILE_MALFORMED_PATHPARTS.iter().collect();

        match ingestion.import(&crl_filepath) {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Parse),
        }

        assert_eq!(crl_repo.lock().unwrap().list().unwrap(), crls_before);
    }

    fn load_crl_file(pathparts: &[&str]) -> Vec<u8> {
        let crl_filepath: PathBuf = pathparts.iter().collect();
        file::load_binary_data(&crl_filepath).unwrap()
    }

    // tests
    // =====

    #[test]
    fn crlingest_import_when_1_entry_crl() {
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), "ingest-import");
        let crl_filepath: PathBuf = CRLFILE_REVOKED_123456_PATHPARTS.iter().collect();

        let result = ingestion.import(&crl_filepath);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        let revocation_list = result.unwrap();
        assert_eq!(revocation_list.name, "Certguard Test CA");
        assert_eq!(revocation_list.entries.len(), 1);
        assert!(revocation_list.source_url.is_none());

        let crl_repo = crl_repo.lock().unwrap();
        let crl = crl_repo.find("Certguard Test CA").unwrap();
        assert_eq!(crl.revoked_count, 1);
        assert!(crl.url.is_none());
        let revoked_cert = crl_repo.find_revoked_entry("123456").unwrap().unwrap();
        assert_eq!(revoked_cert.reason, RevocationReason::KeyCompromise);
        assert_eq!(revoked_cert.revocation_date, datetime!(2024-01-01 0:00 UTC));
        assert_eq!(revoked_cert.revoked_by, Some("Certguard Test CA".to_string()));
    }

    #[test]
    fn crlingest_import_when_pem_crl() {
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), "ingest-pem");
        let crl_filepath: PathBuf = CRLFILE_REVOKED_123456_PEM_PATHPARTS.iter().collect();

        let result = ingestion.import(&crl_filepath);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        assert_eq!(result.unwrap().entries[0].serial_number, "123456");
    }

    #[test]
    fn crlingest_import_when_repeated_is_idempotent() {
        assert_repeated_import_is_idempotent(create_repo(), "ingest-repeat");
    }

    #[test]
    fn crlingest_import_when_repeated_is_idempotent_with_sqlite() {
        assert_repeated_import_is_idempotent(create_sqlite_repo(), "ingest-repeat-sqlite");
    }

    #[test]
    fn crlingest_import_when_entries_under_reported() {
        let store: &'static InMemCrlRepo = Box::leak(Box::new(InMemCrlRepo::new()));
        assert_under_reported_import_rolls_back(store, "ingest-partial");
    }

    #[test]
    fn crlingest_import_when_entries_under_reported_with_sqlite() {
        let store: &'static DieselCrlRepo = Box::leak(Box::new(create_crl_repository()));
        assert_under_reported_import_rolls_back(store, "ingest-partial-sqlite");
    }

    #[test]
    fn crlingest_import_when_malformed_crl() {
        assert_malformed_import_leaves_store_unchanged(create_repo(), "ingest-malformed");
    }

    #[test]
    fn crlingest_import_when_malformed_crl_with_sqlite() {
        assert_malformed_import_leaves_store_unchanged(
            create_sqlite_repo(),
            "ingest-malformed-sqlite",
        );
    }

    #[test]
    fn crlingest_import_when_invalid_reason_code() {
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), "ingest-reason");
        let crl_filepath: PathBuf = CRLFILE_INVALID_REASON_PATHPARTS.iter().collect();

        match ingestion.import(&crl_filepath) {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Validation),
        }
        assert!(crl_repo.lock().unwrap().list().unwrap().is_empty());
    }

    #[test]
    fn crlingest_import_when_unsupported_extension() {
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), "ingest-ext");
        let cert_filepath: PathBuf = CERTFILE_CA_PATHPARTS.iter().collect();
        let cert_filepath = cert_filepath.with_extension("crt");

        match ingestion.import(&cert_filepath) {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Validation),
        }
    }

    #[test]
    fn crlingest_import_when_missing_file() {
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, MockHttpTransport::new(), "ingest-missing");

        match ingestion.import(Path::new("/nonexistent-dir/missing.crl")) {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Io),
        }
    }

    #[test]
    fn crlingest_fetch_when_http_ok() {
        let crl_raw = load_crl_file(&CRLFILE_REVOKED_123456_PATHPARTS);
        let expected_url = Url::parse("http://crl.certguard.test/pki/ca.crl").unwrap();
        let mut http_transport = MockHttpTransport::new();
        let response_body = crl_raw.clone();
        http_transport
            .expect_get()
            .with(predicate::eq(expected_url.clone()))
            .times(1)
            .return_once(move |_| {
                Ok(HttpResponse {
                    status: 200,
                    body: response_body,
                })
            });
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-fetch");

        let result = ingestion.fetch("http://crl.certguard.test/pki/ca.crl");

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        let revocation_list = result.unwrap();
        assert_eq!(revocation_list.source_url, Some(expected_url));
        assert_eq!(revocation_list.entries.len(), 1);

        let crl = crl_repo.lock().unwrap().find("Certguard Test CA").unwrap();
        assert_eq!(
            crl.url,
            Some("http://crl.certguard.test/pki/ca.crl".to_string())
        );
        assert_eq!(crl.raw, crl_raw);
        assert_eq!(
            std::fs::read(cache_dir("ingest-fetch").join("ca.crl")).unwrap(),
            crl_raw
        );
    }

    #[test]
    fn crlingest_fetch_when_malformed_after_good_keeps_cached_crl() {
        let crl_raw = load_crl_file(&CRLFILE_REVOKED_123456_PATHPARTS);
        let malformed_raw = load_crl_file(&CRLFILE_MALFORMED_PATHPARTS);
        let mut response_bodies = vec![malformed_raw, crl_raw.clone()];
        let mut http_transport = MockHttpTransport::new();
        http_transport.expect_get().times(2).returning(move |_| {
            Ok(HttpResponse {
                status: 200,
                body: response_bodies.pop().unwrap(),
            })
        });
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-fetch-keep");
        let cached_filepath = cache_dir("ingest-fetch-keep").join("ca.crl");

        ingestion.fetch("http://crl.certguard.test/pki/ca.crl").unwrap();
        assert_eq!(std::fs::read(&cached_filepath).unwrap(), crl_raw);

        match ingestion.fetch("http://crl.certguard.test/pki/ca.crl") {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Parse),
        }

        assert_eq!(std::fs::read(&cached_filepath).unwrap(), crl_raw);
        assert_eq!(crl_repo.lock().unwrap().list().unwrap().len(), 1);
    }

    #[test]
    fn crlingest_fetch_when_file_url() {
        let crl_filepath: PathBuf = CRLFILE_REVOKED_MULTI_PATHPARTS.iter().collect();
        let crl_url = Url::from_file_path(crl_filepath.canonicalize().unwrap()).unwrap();
        let mut http_transport = MockHttpTransport::new();
        http_transport.expect_get().never();
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-file-url");

        let result = ingestion.fetch(crl_url.as_str());

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        assert_eq!(result.unwrap().name, "Certguard Second CA");
        assert!(cache_dir("ingest-file-url")
            .join("revoked-multi.crl")
            .exists());
    }

    #[test]
    fn crlingest_fetch_when_non_2xx_status() {
        let mut http_transport = MockHttpTransport::new();
        http_transport.expect_get().times(1).return_once(|_| {
            Ok(HttpResponse {
                status: 404,
                body: vec![],
            })
        });
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-404");

        match ingestion.fetch("http://crl.certguard.test/ca.crl") {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Network);
                assert_eq!(
                    err.to_string(),
                    "server responded with a non 2xx status code: 404"
                );
            }
        }
        assert!(crl_repo.lock().unwrap().list().unwrap().is_empty());
    }

    #[test]
    fn crlingest_fetch_when_transport_failure() {
        let mut http_transport = MockHttpTransport::new();
        http_transport
            .expect_get()
            .times(1)
            .return_once(|_| Err(AppError::Network("connection refused".to_string())));
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-unreachable");

        match ingestion.fetch("http://crl.certguard.test/ca.crl") {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Network);
                assert!(err.to_string().contains(
                    "cannot retrieve CRL from revocationListURL: http://crl.certguard.test/ca.crl"
                ));
            }
        }
    }

    #[test]
    fn crlingest_fetch_when_invalid_url() {
        let mut http_transport = MockHttpTransport::new();
        http_transport.expect_get().never();
        let crl_repo = create_repo();
        let ingestion = create_ingestion(&crl_repo, http_transport, "ingest-bad-url");

        match ingestion.fetch("crl.certguard.test/ca.crl") {
            Ok(revocation_list) => panic!(
                "Unexpected successful result: list={:?}",
                &revocation_list
            ),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Validation),
        }
    }
}
