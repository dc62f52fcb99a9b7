pub mod crl_repo;
pub mod diesel_orm;
pub mod in_memory_db;
pub mod sqlite_db;
