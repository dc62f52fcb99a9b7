pub mod crl;
pub mod reason;
