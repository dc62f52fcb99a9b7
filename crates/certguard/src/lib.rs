pub(crate) mod config;
pub(crate) mod console;
pub(crate) mod repository;
pub(crate) mod service;

#[cfg(test)]
pub(crate) mod testutils;

pub mod api {
    use std::path::Path;
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;
    use crate::console::ConsoleWriter;
    use crate::repository::crl_repo::CrlRepository;
    use crate::service::crl_cache::CrlCache;
    use crate::service::http::{HttpTransport, ReqwestTransport};
    use crate::service::ingestion::CrlIngestion;
    use crate::service::ocsp_client::OcspClient;
    use crate::service::resolver::RevocationResolver;
    use certguard_common::crypto::x509;
    use certguard_common::error::AppError;
    use certguard_common::logging::info;
    use certguard_common::target;
    pub use config::{AppConfig, Command};

    /// Executes the configured command against the CRL store, writing results to the console
    pub struct MainProcessor {
        command: Command,
        crl_repo: Arc<Mutex<dyn CrlRepository>>,
        ingestion: CrlIngestion,
        resolver: RevocationResolver,
        ocsp_client: OcspClient,
        console: ConsoleWriter,
    }

    impl MainProcessor {
        /// MainProcessor constructor
        ///
        /// # Arguments
        ///
        /// * `app_config` - Application configuration (with connected repository)
        ///
        /// # Returns
        ///
        /// A [`Result`] containing a newly constructed [`MainProcessor`] object.
        ///
        pub fn new(app_config: AppConfig) -> Result<Self, AppError> {
            let crl_transport: Arc<dyn HttpTransport> =
                Arc::new(ReqwestTransport::new(app_config.crl_fetch_timeout)?);
            let ocsp_transport: Arc<dyn HttpTransport> =
                Arc::new(ReqwestTransport::new(app_config.ocsp_timeout)?);

            Ok(Self::with_components(
                app_config,
                &crl_transport,
                &ocsp_transport,
                ConsoleWriter::new(None),
            ))
        }

        fn with_components(
            app_config: AppConfig,
            crl_transport: &Arc<dyn HttpTransport>,
            ocsp_transport: &Arc<dyn HttpTransport>,
            console: ConsoleWriter,
        ) -> Self {
            let crl_cache = CrlCache::new(&app_config.cache_directory);

            Self {
                ingestion: CrlIngestion::new(&app_config.crl_repo, crl_transport, crl_cache),
                resolver: RevocationResolver::new(&app_config.crl_repo),
                ocsp_client: OcspClient::new(ocsp_transport),
                crl_repo: app_config.crl_repo,
                command: app_config.command,
                console,
            }
        }

        /// Run the configured command
        pub fn process(&mut self) -> Result<(), AppError> {
            match self.command.clone() {
                Command::Fetch { url } => {
                    let revocation_list = self.ingestion.fetch(&url)?;
                    self.console.write_revocation_list(&revocation_list)
                }
                Command::Import { path } => {
                    let revocation_list = self.ingestion.import(&path)?;
                    self.console.write_revocation_list(&revocation_list)
                }
                Command::List => {
                    let crls = self.access_repo()?.list()?;
                    self.console.write_crl_table(&crls)
                }
                Command::Entries { name } => {
                    let (crl, revoked_certs) = {
                        let crl_repo = self.access_repo()?;
                        let crl = crl_repo.find(&name)?;
                        let revoked_certs = crl_repo.find_revoked_entries(crl.id)?;
                        (crl, revoked_certs)
                    };
                    self.console.write_revoked_entries(&crl, &revoked_certs)
                }
                Command::Delete { id } => {
                    self.access_repo()?.delete(id)?;
                    info(&target!(), &format!("Deleted CRL: id={}", id));
                    self.console
                        .write_message(&format!("Deleted revocation list: id={}", id))
                }
                Command::Resolve { serial } => {
                    let resolution = self.resolver.resolve(&serial)?;
                    self.console.write_resolution(&resolution)
                }
                Command::Ocsp { cert, issuer, url } => {
                    self.process_ocsp(&cert, issuer.as_deref(), url.as_deref())
                }
            }
        }

        fn process_ocsp(
            &mut self,
            cert_file: &Path,
            issuer_file: Option<&Path>,
            responder_url: Option<&str>,
        ) -> Result<(), AppError> {
            let mut certificates = x509::load_certificates_file(cert_file)?.into_iter();
            let certificate = certificates.next();
            let issuer = match issuer_file {
                Some(issuer_file) => x509::load_certificates_file(issuer_file)?.into_iter().next(),
                None => certificates.next(),
            };

            let response =
                self.ocsp_client
                    .request(certificate.as_ref(), issuer.as_ref(), responder_url)?;
            self.console.write_ocsp_response(&response)
        }

        fn access_repo(&self) -> Result<MutexGuard<'_, dyn CrlRepository + 'static>, AppError> {
            self.crl_repo.lock().map_err(|err| {
                AppError::Storage(format!("Failed to access CRL repository: err={}", err))
            })
        }
    }

}
