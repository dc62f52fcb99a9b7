use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::*;

use crate::repository::crl_repo::CrlRepository;
use crate::repository::in_memory_db::crl_repo::InMemCrlRepo;
use crate::repository::sqlite_db::crl_repo::SqliteCrlRepo;
use certguard_common::error::AppError;
use certguard_common::file;

const DEFAULT_CACHE_SUBDIRECTORY: [&str; 2] = [".cache", "certguard"];
const DEFAULT_SQLITE_DB_FILE: &str = "certguard.db";

/// Datasource configuration for the revocation list store
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum DataSource {
    /// In-memory DB, with an optional JSON file backing store. Connect string is the JSON file path.
    InMemoryDb,

    /// SQLite DB (schema migrated on connect). Connect string is the DB file path.
    #[default]
    SqliteDb,
}

impl DataSource {
    /// Return CRL repository factory closure
    pub fn repository_factory(&self) -> Box<dyn Fn() -> Arc<Mutex<dyn CrlRepository>>> {
        match self {
            DataSource::InMemoryDb => Box::new(|| Arc::new(Mutex::new(InMemCrlRepo::new()))),
            DataSource::SqliteDb => Box::new(|| Arc::new(Mutex::new(SqliteCrlRepo::new()))),
        }
    }
}

/// Certguard commands
#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Fetch a CRL from a URL (http, https or file scheme), cache and store it
    Fetch {
        /// CRL location
        url: String,
    },

    /// Import a CRL file (.crl, .der or .pem)
    Import {
        /// CRL file
        path: PathBuf,
    },

    /// List stored CRLs
    List,

    /// List the revoked certificates of a stored CRL
    Entries {
        /// CRL (issuer) name
        name: String,
    },

    /// Delete a stored CRL (and its revoked certificates)
    Delete {
        /// CRL ID
        id: i64,
    },

    /// Check whether a serial number is revoked by any stored CRL
    Resolve {
        /// Decimal certificate serial number
        serial: String,
    },

    /// Query an OCSP responder for the revocation status of a certificate
    Ocsp {
        /// Certificate file (PEM or DER). A PEM chain may carry the issuer as its second certificate
        cert: PathBuf,

        /// Issuer certificate file (PEM or DER)
        #[arg(required = false, long = "issuer")]
        issuer: Option<PathBuf>,

        /// OCSP responder URL. Defaults to the certificate's Authority Information Access OCSP URI
        #[arg(required = false, long = "url")]
        url: Option<String>,
    },
}

/// Maintains a local cache of certificate revocation lists (CRLs) and checks certificate revocation
/// status against it, or live via OCSP.
#[derive(Parser)]
#[command(author, version, long_about)]
pub struct AppConfigArgs {
    /// Config file (as a shell environment file), using program's environment variable naming (see below).
    /// Note - Each config file variable entry may be overriden via their respective command-line arguments
    /// Note - Must be first argument (if provided)
    #[arg(
        required = false,
        short = 'f',
        long = "config-file",
        env,
        verbatim_doc_comment
    )]
    pub config_file: Option<String>,

    /// Directory for cached CRL files and the default SQLite DB. Defaults to $HOME/.cache/certguard
    #[arg(required = false, short = 'c', long = "cache-directory", env)]
    pub cache_directory: Option<String>,

    /// DB datasource type
    #[arg(
        required = false,
        long = "datasource",
        env,
        value_enum,
        default_value_t = DataSource::SqliteDb
    )]
    pub datasource: DataSource,

    /// DB connect string. Defaults to <cache-directory>/certguard.db for SQLite, and no backing file for in-memory
    #[arg(required = false, long = "db-connect", env)]
    pub db_connect: Option<String>,

    /// CRL fetch timeout (in seconds)
    #[arg(required = false, long = "crl-fetch-timeout", env, default_value_t = 5)]
    pub crl_fetch_timeout: u64,

    /// OCSP request timeout (in seconds)
    #[arg(required = false, long = "ocsp-timeout", env, default_value_t = 10)]
    pub ocsp_timeout: u64,

    /// Enable verbose (debug level) logging
    #[arg(required = false, short = 'v', long = "verbose", env)]
    pub verbose: bool,

    /// Write log records to this file (instead of STDERR)
    #[arg(required = false, long = "log-file", env)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Main application configuration/context struct
pub struct AppConfig {
    pub command: Command,
    pub cache_directory: PathBuf,
    pub crl_fetch_timeout: Duration,
    pub ocsp_timeout: Duration,
    pub verbose_logging: bool,
    pub log_file: Option<PathBuf>,
    pub crl_repo: Arc<Mutex<dyn CrlRepository>>,
}

impl AppConfig {
    /// Load config
    pub fn new() -> Result<Self, AppError> {
        // Populate environment w/given config file (if provided)
        let mut config_file = env::var_os("CONFIG_FILE");
        if config_file.is_none() && (env::args_os().len() >= 3) {
            let mut args = env::args_os().skip(1);
            if args.next().is_some_and(|arg| arg.eq("-f")) {
                config_file = args.next();
            }
        }

        if let Some(config_filename) = config_file {
            dotenvy::from_filename(config_filename).ok();
        }

        // Parse process arguments
        let config_args = Self::parse_config();

        // Cache directory
        let cache_directory = match &config_args.cache_directory {
            Some(cache_directory) => PathBuf::from(cache_directory),
            None => Self::default_cache_directory()?,
        };
        file::ensure_directory(&cache_directory)?;

        // Datasource repository
        let db_connect = match (&config_args.datasource, &config_args.db_connect) {
            (_, Some(db_connect)) => Some(db_connect.clone()),
            (DataSource::SqliteDb, None) => Some(
                cache_directory
                    .join(DEFAULT_SQLITE_DB_FILE)
                    .to_string_lossy()
                    .to_string(),
            ),
            (DataSource::InMemoryDb, None) => None,
        };
        let crl_repo = Self::create_datasource_repository(
            &db_connect,
            &config_args.datasource.repository_factory(),
        )?;

        // Instantiate AppConfig
        Ok(AppConfig {
            command: config_args.command,
            cache_directory,
            crl_fetch_timeout: Duration::from_secs(config_args.crl_fetch_timeout),
            ocsp_timeout: Duration::from_secs(config_args.ocsp_timeout),
            verbose_logging: config_args.verbose,
            log_file: config_args.log_file.map(PathBuf::from),
            crl_repo,
        })
    }

    /// Instantiate CRL repository, connecting it to the datasource (if a connect string is given)
    fn create_datasource_repository(
        db_connect: &Option<String>,
        repo_factory: &dyn Fn() -> Arc<Mutex<dyn CrlRepository>>,
    ) -> Result<Arc<Mutex<dyn CrlRepository>>, AppError> {
        let crl_repository = repo_factory();

        if let Some(db_connect) = db_connect {
            crl_repository
                .lock()
                .map_err(|err| {
                    AppError::Storage(format!("Failed to access CRL repository: err={}", err))
                })?
                .connect_to_datasource(db_connect)?;
        }

        Ok(crl_repository)
    }

    fn default_cache_directory() -> Result<PathBuf, AppError> {
        let home_directory = env::var_os("HOME").ok_or_else(|| {
            AppError::Validation(
                "Unable to determine home directory, a cache directory must be supplied".to_string(),
            )
        })?;
        let mut cache_directory = PathBuf::from(home_directory);
        cache_directory.extend(DEFAULT_CACHE_SUBDIRECTORY);
        Ok(cache_directory)
    }

    #[cfg(not(test))]
    #[inline(always)]
    fn parse_config() -> AppConfigArgs {
        AppConfigArgs::parse()
    }

    #[cfg(test)]
    #[inline(always)]
    fn parse_config() -> AppConfigArgs {
        AppConfigArgs::parse_from::<Vec<_>, String>(vec!["certguard".to_string(), "list".to_string()])
    }
}
