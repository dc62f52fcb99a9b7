pub mod crl_repo;
pub mod db_conn;
