//! Fetching via rsync by shelling out to the `rsync` binary.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use bytes::Bytes;
use log::debug;
use crate::tal::TalUri;
use super::base::{FetchError, Fetcher};


//------------ RsyncFetcher -----------------------------------------------------

#[derive(Debug)]
pub struct RsyncFetcher {
    cache_dir: PathBuf,
}

impl RsyncFetcher {
    pub fn new(cache_dir: &std::path::Path) -> Self {
        RsyncFetcher { cache_dir: cache_dir.join("rsync") }
    }

    /// Splits an `rsync://` URI into the local directory its module is
    /// mirrored under and the file's path within that module.
    fn module_path(&self, raw: &str) -> Option<(PathBuf, String)> {
        let rest = raw.strip_prefix("rsync://")?;
        let mut parts = rest.splitn(2, '/');
        let authority = parts.next()?;
        let path = parts.next().unwrap_or("");
        Some((self.cache_dir.join(authority), path.to_string()))
    }
}

impl Fetcher for RsyncFetcher {
    fn fetch(&self, uri: &TalUri) -> Result<Bytes, FetchError> {
        let raw = uri.as_str();
        let (module_dir, rel_path) = self.module_path(raw)
            .ok_or_else(|| FetchError(format!("malformed rsync URI {}", raw)))?;
        fs::create_dir_all(&module_dir).map_err(|err| {
            FetchError(format!(
                "cannot create cache directory {}: {}", module_dir.display(), err
            ))
        })?;

        debug!("rsync: fetching {}", raw);
        let status = Command::new("rsync")
            .arg("-az")
            .arg("--contimeout=10")
            .arg(raw)
            .arg(&module_dir)
            .status()
            .map_err(|err| FetchError(format!("failed to run rsync: {}", err)))?;
        if !status.success() {
            return Err(FetchError(format!("rsync for {} exited with {}", raw, status)));
        }

        let file_path = module_dir.join(&rel_path);
        fs::read(&file_path).map(Bytes::from).map_err(|err| {
            FetchError(format!("cannot read {}: {}", file_path.display(), err))
        })
    }
}
