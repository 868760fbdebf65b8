//! Fetching a TAL's root certificate via a single blocking HTTPS GET.
//!
//! This does not implement the RRDP protocol (see [`super::RrdpFetcher`]);
//! it only retrieves the bytes at the TAL's own `https://` URI, which is
//! sufficient for loading a trust anchor certificate directly.

use bytes::Bytes;
use log::debug;
use crate::tal::TalUri;
use super::base::{FetchError, Fetcher};


//------------ HttpsFetcher -----------------------------------------------------

#[derive(Debug, Default)]
pub struct HttpsFetcher;

impl HttpsFetcher {
    pub fn new() -> Self {
        HttpsFetcher
    }
}

impl Fetcher for HttpsFetcher {
    fn fetch(&self, uri: &TalUri) -> Result<Bytes, FetchError> {
        let raw = uri.as_str();
        debug!("https: fetching {}", raw);
        let response = reqwest::blocking::get(raw).map_err(|err| {
            FetchError(format!("GET {} failed: {}", raw, err))
        })?;
        if !response.status().is_success() {
            return Err(FetchError(format!(
                "GET {} returned status {}", raw, response.status()
            )));
        }
        response.bytes().map_err(|err| {
            FetchError(format!("failed to read response body from {}: {}", raw, err))
        })
    }
}
