pub mod asn;
pub mod crl;
pub mod ocsp;
pub mod x509;
