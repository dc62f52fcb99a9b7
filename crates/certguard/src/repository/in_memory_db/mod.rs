pub mod crl_repo;
