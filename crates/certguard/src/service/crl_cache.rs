use std::path::{Path, PathBuf};

use url::Url;

use certguard_common::error::AppError;
use certguard_common::file;
use certguard_common::logging::debug;
use certguard_common::target;

const DEFAULT_CACHE_FILE_NAME: &str = "crl.der";

/// On-disk cache of raw CRL bytes, keyed by the last path segment of the source URL
pub struct CrlCache {
    cache_dir: PathBuf,
}

impl CrlCache {
    /// CrlCache constructor
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Directory to hold cached CRL files (created on first store)
    ///
    /// # Returns
    ///
    /// A newly constructed [`CrlCache`] object.
    ///
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Write raw CRL bytes for the given source URL, replacing any previous copy
    ///
    /// # Arguments
    ///
    /// * `url` - Where the bytes were fetched from
    /// * `raw` - Encoded CRL bytes
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the cache file path, or an IO error.
    ///
    pub fn store(&self, url: &Url, raw: &[u8]) -> Result<PathBuf, AppError> {
        file::ensure_directory(&self.cache_dir)?;
        let cache_file = self.cache_dir.join(Self::file_name(url));
        file::write_binary_data(&cache_file, raw)?;

        debug(
            &target!(),
            &format!("Cached CRL: url={}, path={:?}, size={}", url, &cache_file, raw.len()),
        );

        Ok(cache_file)
    }

    fn file_name(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
            .filter(|segment| *segment != "." && *segment != "..")
            .map(|segment| segment.to_string())
            .unwrap_or_else(|| DEFAULT_CACHE_FILE_NAME.to_string())
    }
}
