use std::fs;
use std::path::Path;

use crate::error::AppError;

/// Load raw bytes from given file
pub fn load_binary_data(filepath: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(filepath).map_err(|err| {
        AppError::IoWithMsg(format!("Failed to read file: path={:?}", filepath), err)
    })
}

/// Load data as text string from given file
pub fn load_text_data(filepath: &Path) -> Result<String, AppError> {
    fs::read_to_string(filepath).map_err(|err| {
        AppError::IoWithMsg(format!("Failed to read file: path={:?}", filepath), err)
    })
}

/// Write raw bytes to given file (replacing any existing content)
pub fn write_binary_data(filepath: &Path, data: &[u8]) -> Result<(), AppError> {
    fs::write(filepath, data).map_err(|err| {
        AppError::IoWithMsg(format!("Failed to write file: path={:?}", filepath), err)
    })
}

/// Create directory (and any missing parents), if not already present
pub fn ensure_directory(dirpath: &Path) -> Result<(), AppError> {
    if dirpath.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dirpath).map_err(|err| {
        AppError::IoWithMsg(format!("Failed to create directory: path={:?}", dirpath), err)
    })
}

/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::path::PathBuf;

    const CRLFILE_REVOKED_123456_PATHPARTS: [&str; 3] = [
        env!("CARGO_MANIFEST_DIR"),
        "testdata",
        "revoked-123456.crl",
    ];
    const CRLFILE_MISSING_PATHPARTS: [&str; 3] =
        [env!("CARGO_MANIFEST_DIR"), "testdata", "NON-EXISTENT.txt"];
    const CERTFILE_CA_PATHPARTS: [&str; 3] =
        [env!("CARGO_MANIFEST_DIR"), "testdata", "ca.crt.pem"];
    const SCRATCH_DIR_PATHPARTS: [&str; 6] = [
        env!("CARGO_MANIFEST_DIR"),
        "..",
        "..",
        "target",
        "test-common",
        "file",
    ];

    #[test]
    fn file_load_binary_data_when_valid_file() {
        let crl_filepath: PathBuf = CRLFILE_REVOKED_123456_PATHPARTS.iter().collect();

        let result = load_binary_data(&crl_filepath);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        let data = result.unwrap();
        assert!(!data.is_empty());
        assert_eq!(data[0], 0x30);
    }

    #[test]
    fn file_load_binary_data_when_missing_file() {
        let missing_filepath: PathBuf = CRLFILE_MISSING_PATHPARTS.iter().collect();

        let result = load_binary_data(&missing_filepath);

        match result {
            Ok(_) => panic!("Unexpected successful result"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Io),
        }
    }

    #[test]
    fn file_load_text_data_when_valid_file() {
        let cert_filepath: PathBuf = CERTFILE_CA_PATHPARTS.iter().collect();

        let result = load_text_data(&cert_filepath);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        assert!(result.unwrap().starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn file_write_binary_data_when_new_directory() {
        let scratch_dir: PathBuf = SCRATCH_DIR_PATHPARTS.iter().collect();
        let scratch_file = scratch_dir.join("written.bin");

        if let Err(err) = ensure_directory(&scratch_dir) {
            panic!("Unexpected ensure dir result: err={:?}", &err);
        }
        if let Err(err) = write_binary_data(&scratch_file, &[0x01, 0x02, 0x03]) {
            panic!("Unexpected write result: err={:?}", &err);
        }

        assert_eq!(load_binary_data(&scratch_file).unwrap(), vec![0x01, 0x02, 0x03]);
        assert!(ensure_directory(&scratch_dir).is_ok());
    }
}
