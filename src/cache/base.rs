//! The `Fetcher` seam and the cache that dispatches across transports.

use std::fmt;
use bytes::Bytes;
use crate::config::Config;
use crate::tal::TalUri;
use super::https::HttpsFetcher;
use super::rsync::RsyncFetcher;


//------------ Fetcher ----------------------------------------------------------

/// Makes a TAL URI's bytes available locally.
///
/// This is the external-collaborator seam for retrieval: the
/// validation pipeline never speaks rsync or HTTP itself, only this
/// trait.
pub trait Fetcher: fmt::Debug + Send + Sync {
    fn fetch(&self, uri: &TalUri) -> Result<Bytes, FetchError>;
}


//------------ RrdpFetcher -------------------------------------------------------

/// Marks where a full RRDP client would plug in.
///
/// `HttpsFetcher` only performs a single blocking GET of a TAL's URI;
/// it does not speak the RRDP notification/snapshot/delta protocol of
/// RFC 8182. No concrete implementation of this trait is shipped.
pub trait RrdpFetcher: fmt::Debug + Send + Sync {
    fn fetch_snapshot(&self, notification_uri: &str) -> Result<Bytes, FetchError>;
}


//------------ FetchError ---------------------------------------------------------

#[derive(Debug)]
pub struct FetchError(pub String);

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FetchError { }


//------------ CacheFetcher -------------------------------------------------------

/// Dispatches a fetch to the transport matching a URI's scheme.
#[derive(Debug)]
pub struct CacheFetcher {
    rsync: Option<RsyncFetcher>,
    https: Option<HttpsFetcher>,
}

impl CacheFetcher {
    pub fn new(config: &Config) -> Self {
        CacheFetcher {
            rsync: if config.enable_rsync && !config.offline {
                Some(RsyncFetcher::new(&config.cache_dir))
            }
            else {
                None
            },
            https: if config.enable_rrdp && !config.offline {
                Some(HttpsFetcher::new())
            }
            else {
                None
            },
        }
    }
}

impl Fetcher for CacheFetcher {
    fn fetch(&self, uri: &TalUri) -> Result<Bytes, FetchError> {
        match uri {
            TalUri::Rsync(_) => {
                match self.rsync.as_ref() {
                    Some(rsync) => rsync.fetch(uri),
                    None => Err(FetchError("rsync transport is disabled".into())),
                }
            }
            TalUri::Https(_) => {
                match self.https.as_ref() {
                    Some(https) => https.fetch(uri),
                    None => Err(FetchError("https transport is disabled".into())),
                }
            }
        }
    }
}
