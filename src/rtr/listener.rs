//! The RTR TCP listener.
//!
//! One thread is spawned per configured listen address; each accepts
//! connections in a loop and hands every accepted socket to its own
//! thread for the connection's lifetime, per the plain OS-thread
//! concurrency model this server uses throughout.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{debug, error, warn};
use crate::error::ExitError;
use crate::payload::VrpStore;
use super::conn::{self, ConnConfig};

/// How often an accept loop wakes up to check the shutdown flag.
///
/// `std::net::TcpListener` has no portable way to wait on "a connection
/// or a shutdown signal, whichever comes first", so we poll a
/// non-blocking listener at this interval instead.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs the RTR listener(s) until `shutdown` is set, then waits for any
/// still-open connections to finish their current response.
///
/// Note: the configured accept backlog is not wired to the underlying
/// socket. `std::net::TcpListener` does not expose `listen(2)`'s
/// backlog argument, and adding a dependency purely to set it was
/// judged not worth it; the platform default backlog is used instead.
pub fn run(
    store: Arc<VrpStore>,
    listen: &[SocketAddr],
    conn_config: ConnConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ExitError> {
    if listen.is_empty() {
        warn!("RTR: no listen addresses configured, server will accept no connections");
        return Ok(());
    }

    crossbeam_utils::thread::scope(|scope| {
        let handles: Vec<_> = listen.iter().map(|addr| {
            let store = store.clone();
            let shutdown = shutdown.clone();
            scope.spawn(move |_| run_one(*addr, store, conn_config, shutdown))
        }).collect();

        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => { }
                Ok(Err(err)) => { first_err.get_or_insert(err); }
                Err(_) => { first_err.get_or_insert(ExitError::Listener); }
            };
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }).unwrap_or_else(|_| {
        error!("RTR listener failed after a listener thread panicked");
        Err(ExitError::Listener)
    })
}

fn run_one(
    addr: SocketAddr,
    store: Arc<VrpStore>,
    conn_config: ConnConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), ExitError> {
    let listener = TcpListener::bind(addr).map_err(|err| {
        error!("Failed to bind RTR listener on {}: {}", addr, err);
        ExitError::Listener
    })?;
    listener.set_nonblocking(true).map_err(|err| {
        error!("Failed to configure RTR listener on {}: {}", addr, err);
        ExitError::Listener
    })?;
    debug!("RTR listener bound to {}", addr);

    let mut conns: Vec<JoinHandle<()>> = Vec::new();
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("RTR: accepted connection from {}", peer);
                let store = store.clone();
                conns.push(thread::spawn(move || {
                    conn::handle_connection(stream, store, conn_config);
                }));
                conns.retain(|handle| !handle.is_finished());
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                warn!("RTR: failed to accept a connection on {}: {}", addr, err);
            }
        }
    }

    debug!(
        "RTR listener on {} shutting down, waiting for {} open connection(s)",
        addr, conns.len()
    );
    for handle in conns {
        let _ = handle.join();
    }
    Ok(())
}
