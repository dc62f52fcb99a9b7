pub mod crypto;
pub mod error;
pub mod file;
pub mod logging;
pub mod model;
pub mod uri;
