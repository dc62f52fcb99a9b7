pub mod crl_cache;
pub mod http;
pub mod ingestion;
pub mod ocsp_client;
pub mod resolver;
