//! The Validation Pipeline.
//!
//! Produces a fresh VRP table from the union of all configured TALs,
//! one worker thread per TAL, joined by the driver at the end of the
//! cycle.

use std::path::PathBuf;
use crossbeam_utils::thread;
use log::{error, warn};
use rand::seq::SliceRandom;
use crate::cache::Fetcher;
use crate::payload::{PayloadSet, RouterKey, Vrp};
use crate::tal::Tal;


//------------ PayloadSink -------------------------------------------------------

/// Where a [`TreeWalker`] deposits validated records as it walks a
/// certificate tree.
pub trait PayloadSink {
    fn push_vrp(&mut self, vrp: Vrp);
    fn push_router_key(&mut self, key: RouterKey);
}

impl PayloadSink for PayloadSet {
    fn push_vrp(&mut self, vrp: Vrp) {
        self.insert_vrp(vrp);
    }

    fn push_router_key(&mut self, key: RouterKey) {
        self.insert_router_key(key);
    }
}


//------------ TreeWalker -------------------------------------------------------

/// Walks the certificate tree rooted at a fetched, already-validated
/// trust anchor certificate.
///
/// This is the external-collaborator seam for certificate validation:
/// fetching child objects, parsing certificates/manifests/CRLs/ROAs and
/// verifying signatures is entirely out of scope here. Sub-tree
/// failures are the walker's own responsibility to isolate; it reports
/// only whether the walk as a whole is sound.
pub trait TreeWalker: Send + Sync {
    fn walk(
        &self, tal_name: &str, root_cert: &[u8], sink: &mut dyn PayloadSink,
    ) -> bool;
}


//------------ NullTreeWalker -----------------------------------------------------

/// A placeholder [`TreeWalker`] for deployments that have not wired in a
/// real certificate-tree validator.
///
/// Certificate parsing, manifest/CRL handling, and ROA/router-key
/// signature verification are out of scope for this crate. This
/// implementation always reports failure, so that a cycle run without a
/// real walker is visibly discarded rather than silently installing an
/// empty table that would read as "validated, zero VRPs."
#[derive(Debug, Default)]
pub struct NullTreeWalker;

impl TreeWalker for NullTreeWalker {
    fn walk(
        &self, _tal_name: &str, _root_cert: &[u8], _sink: &mut dyn PayloadSink,
    ) -> bool {
        false
    }
}


//------------ PipelineConfig ----------------------------------------------------

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub tal_dir: PathBuf,
    pub shuffle_uris: bool,
}


//------------ run --------------------------------------------------------------

/// Runs one validation cycle.
///
/// Returns `None` if any TAL's worker failed to produce a table, per
/// the pipeline's all-or-nothing join policy: the caller then leaves
/// the VRP Store's current snapshot untouched for this cycle.
pub fn run(
    config: &PipelineConfig,
    fetcher: &dyn Fetcher,
    walker: &dyn TreeWalker,
) -> Option<PayloadSet> {
    let paths = match Tal::scan_dir(&config.tal_dir) {
        Ok(paths) => paths,
        Err(err) => {
            error!(
                "Failed to read TAL directory {}: {}",
                config.tal_dir.display(), err
            );
            return None;
        }
    };
    if paths.is_empty() {
        warn!("No TAL files found in {}", config.tal_dir.display());
        return Some(PayloadSet::new());
    }

    let mut tals = Vec::with_capacity(paths.len());
    for path in &paths {
        match Tal::parse_file(path) {
            Ok(tal) => tals.push(tal),
            Err(err) => {
                error!("Failed to load TAL {}: {}", path.display(), err);
                return None;
            }
        }
    }

    let results = thread::scope(|scope| {
        let handles: Vec<_> = tals.iter().map(|tal| {
            scope.spawn(move |_| {
                process_tal(tal, config.shuffle_uris, fetcher, walker)
            })
        }).collect();
        handles.into_iter().map(|handle| handle.join().unwrap_or(None)).collect::<Vec<_>>()
    }).unwrap_or_else(|_| {
        error!("Validation failed after a worker thread panicked");
        Vec::new()
    });

    if results.len() != tals.len() || results.iter().any(Option::is_none) {
        warn!("At least one TAL failed to validate; discarding this cycle");
        return None;
    }

    let mut merged = PayloadSet::new();
    for table in results.into_iter().flatten() {
        merged.merge(table);
    }
    Some(merged)
}

/// Runs a single TAL's worker: try each URI in turn until one both
/// fetches and validates.
fn process_tal(
    tal: &Tal, shuffle: bool, fetcher: &dyn Fetcher, walker: &dyn TreeWalker,
) -> Option<PayloadSet> {
    let mut uris = tal.uris.clone();
    if shuffle {
        uris.shuffle(&mut rand::thread_rng());
    }
    for uri in &uris {
        match fetcher.fetch(uri) {
            Ok(cert) => {
                let mut table = PayloadSet::new();
                if walker.walk(&tal.name, &cert, &mut table) {
                    return Some(table);
                }
                warn!(
                    "{}: root certificate at {} failed to validate",
                    tal.name, uri
                );
            }
            Err(err) => {
                warn!("{}: failed to fetch {}: {}", tal.name, uri, err);
            }
        }
    }
    error!("{}: no configured URI could be fetched and validated", tal.name);
    None
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use crate::payload::Prefix;
    use crate::tal::TalUri;

    #[derive(Debug)]
    struct StubFetcher {
        succeed_uri: Option<String>,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, uri: &TalUri) -> Result<bytes::Bytes, crate::cache::FetchError> {
            match &self.succeed_uri {
                Some(good) if good == uri.as_str() => Ok(bytes::Bytes::from_static(b"cert")),
                _ => Err(crate::cache::FetchError("not reachable".into())),
            }
        }
    }

    struct StubWalker;

    impl TreeWalker for StubWalker {
        fn walk(&self, _tal_name: &str, _root_cert: &[u8], sink: &mut dyn PayloadSink) -> bool {
            sink.push_vrp(Vrp::new(
                64512, Prefix::V4(Ipv4Addr::new(192, 0, 2, 0), 24), 24,
            ));
            true
        }
    }

    struct FailingWalker;

    impl TreeWalker for FailingWalker {
        fn walk(&self, _tal_name: &str, _root_cert: &[u8], _sink: &mut dyn PayloadSink) -> bool {
            false
        }
    }

    fn tal_with_uris(uris: Vec<&str>) -> Tal {
        Tal {
            name: "test".into(),
            uris: uris.into_iter().map(|s| TalUri::Rsync(s.into())).collect(),
            spki: bytes::Bytes::new(),
        }
    }

    #[test]
    fn process_tal_falls_through_to_next_uri() {
        let tal = tal_with_uris(vec![
            "rsync://a.example/ta.cer", "rsync://b.example/ta.cer",
        ]);
        let fetcher = StubFetcher { succeed_uri: Some("rsync://b.example/ta.cer".into()) };
        let table = process_tal(&tal, false, &fetcher, &StubWalker).unwrap();
        assert_eq!(table.vrp_count(), 1);
    }

    #[test]
    fn process_tal_fails_when_all_uris_fail() {
        let tal = tal_with_uris(vec!["rsync://a.example/ta.cer"]);
        let fetcher = StubFetcher { succeed_uri: None };
        assert!(process_tal(&tal, false, &fetcher, &StubWalker).is_none());
    }

    #[test]
    fn process_tal_fails_when_walk_fails() {
        let tal = tal_with_uris(vec!["rsync://a.example/ta.cer"]);
        let fetcher = StubFetcher { succeed_uri: Some("rsync://a.example/ta.cer".into()) };
        assert!(process_tal(&tal, false, &fetcher, &FailingWalker).is_none());
    }
}
