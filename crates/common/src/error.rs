use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

/// Sanctioned error type used across workspace
#[derive(Debug)]
pub enum AppError {
    /// Error containing a message
    General(String),
    /// Error with a message and an [`Error`] object
    GenWithMsgAndErr(String, Box<dyn Error + Send + Sync + 'static>),
    /// IO error
    Io(io::Error),
    /// IO error with a message
    IoWithMsg(String, io::Error),
    /// Network (transport/HTTP) error
    Network(String),
    /// Network error with a message and an [`Error`] object
    NetworkWithMsgAndErr(String, Box<dyn Error + Send + Sync + 'static>),
    /// Malformed encoded data (CRL, certificate, OCSP)
    Parse(String),
    /// Parse error with a message and the original decoder [`Error`] object
    ParseWithMsgAndErr(String, Box<dyn Error + Send + Sync + 'static>),
    /// Invalid caller-supplied input
    Validation(String),
    /// Persistence store error
    Storage(String),
    /// Persistence store error with a message and an [`Error`] object
    StorageWithMsgAndErr(String, Box<dyn Error + Send + Sync + 'static>),
    /// Lookup miss
    NotFound(String),
}

/// Error category, independent of payload
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    General,
    Io,
    Network,
    Parse,
    Validation,
    Storage,
    NotFound,
}

impl AppError {
    /// Return error category
    ///
    /// # Returns
    ///
    /// The [`ErrorKind`] for this error.
    ///
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::General(_) | AppError::GenWithMsgAndErr(_, _) => ErrorKind::General,
            AppError::Io(_) | AppError::IoWithMsg(_, _) => ErrorKind::Io,
            AppError::Network(_) | AppError::NetworkWithMsgAndErr(_, _) => ErrorKind::Network,
            AppError::Parse(_) | AppError::ParseWithMsgAndErr(_, _) => ErrorKind::Parse,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Storage(_) | AppError::StorageWithMsgAndErr(_, _) => ErrorKind::Storage,
            AppError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            AppError::General(ref msg) => msg.fmt(f),
            AppError::GenWithMsgAndErr(ref msg, ref err) => {
                write!(f, "Error: msg={}, err={:?}", msg, err)
            }
            AppError::Io(ref err) => err.fmt(f),
            AppError::IoWithMsg(ref msg, ref err) => {
                write!(f, "IO Error: msg={}, err={:?}", msg, err)
            }
            AppError::Network(ref msg) => msg.fmt(f),
            AppError::NetworkWithMsgAndErr(ref msg, ref err) => {
                write!(f, "Network Error: msg={}, err={}", msg, err)
            }
            AppError::Parse(ref msg) => msg.fmt(f),
            AppError::ParseWithMsgAndErr(ref msg, ref err) => {
                write!(f, "Parse Error: msg={}, err={}", msg, err)
            }
            AppError::Validation(ref msg) => msg.fmt(f),
            AppError::Storage(ref msg) => msg.fmt(f),
            AppError::StorageWithMsgAndErr(ref msg, ref err) => {
                write!(f, "Storage Error: msg={}, err={}", msg, err)
            }
            AppError::NotFound(ref msg) => msg.fmt(f),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::GenWithMsgAndErr(_, ref err)
            | AppError::NetworkWithMsgAndErr(_, ref err)
            | AppError::ParseWithMsgAndErr(_, ref err)
            | AppError::StorageWithMsgAndErr(_, ref err) => Some(err.as_ref()),
            AppError::Io(ref err) | AppError::IoWithMsg(_, ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> AppError {
        AppError::Io(err)
    }
}
