//! The Periodic Driver.
//!
//! Schedules validation cycles on a fixed interval, owns the VRP
//! Store's write side, starts the RTR listener once the first cycle
//! has installed a snapshot, and coordinates shutdown between the two.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use log::{info, warn};
use crate::cache::{CacheFetcher, Fetcher};
use crate::config::Config;
use crate::error::ExitError;
use crate::payload::VrpStore;
use crate::process::Process;
use crate::rtr::{self, ConnConfig};
use crate::validation::{self, NullTreeWalker, PipelineConfig, TreeWalker};

/// How often the driver wakes to check the clock and the shutdown flag.
const TICK: Duration = Duration::from_millis(200);


//------------ Driver -----------------------------------------------------------

/// Owns the VRP Store, the fetcher and tree walker used to fill it, and
/// the schedule on which it is refreshed.
pub struct Driver {
    config: Config,
    store: Arc<VrpStore>,
    fetcher: Box<dyn Fetcher>,
    walker: Box<dyn TreeWalker>,
    shutdown: Arc<AtomicBool>,
}

impl Driver {
    /// Creates a driver from a process's configuration.
    ///
    /// The tree walker is [`NullTreeWalker`]: certificate parsing and
    /// cryptographic validation are out of scope for this component, so
    /// every cycle will fail to produce any payload until a real
    /// walker is wired in in its place.
    pub fn new(process: &Process) -> Self {
        let config = process.config().clone();
        let fetcher = Box::new(CacheFetcher::new(&config));
        let shutdown = Arc::new(AtomicBool::new(false));
        install_signal_handler(shutdown.clone());
        Driver {
            store: Arc::new(VrpStore::new(config.history_size)),
            fetcher,
            walker: Box::new(NullTreeWalker),
            shutdown,
            config,
        }
    }

    /// Runs validation cycles and the RTR server until shut down.
    ///
    /// Returns once the process has been asked to shut down (via
    /// `SIGINT`/`SIGTERM` on unix) and every in-flight RTR connection
    /// has finished its current response.
    pub fn run(self) -> Result<(), ExitError> {
        let pipeline_config = PipelineConfig {
            tal_dir: self.config.tal_dir.clone(),
            shuffle_uris: true,
        };
        let conn_config = ConnConfig {
            read_timeout: self.config.rtr_timeout,
            write_timeout: self.config.rtr_timeout,
            refresh: self.config.rtr_refresh,
            retry: self.config.rtr_retry,
            expire: self.config.rtr_expire,
        };

        info!("Starting the first validation cycle.");
        self.run_cycle(&pipeline_config);

        let store = self.store.clone();
        let listen = self.config.rtr_listen.clone();
        let listener_shutdown = self.shutdown.clone();
        let listener = thread::spawn(move || {
            rtr::run(store, &listen, conn_config, listener_shutdown)
        });

        let mut next_cycle = Instant::now() + self.config.validation_interval;
        while !self.shutdown.load(Ordering::SeqCst) {
            if Instant::now() >= next_cycle {
                self.run_cycle(&pipeline_config);
                next_cycle = Instant::now() + self.config.validation_interval;
            }
            thread::sleep(TICK.min(self.config.validation_interval));
        }

        info!("Shutdown requested: stopping the RTR listener.");
        self.store.shutdown();
        match listener.join() {
            Ok(result) => result,
            Err(_) => {
                warn!("RTR listener thread panicked during shutdown.");
                Err(ExitError::Listener)
            }
        }
    }

    /// Runs one validation cycle and installs its result, if any.
    ///
    /// A cycle is atomic from the store's perspective: either a new
    /// snapshot is installed, or, on any failure, the previous one is
    /// left untouched.
    fn run_cycle(&self, pipeline_config: &PipelineConfig) {
        match validation::run(
            pipeline_config, self.fetcher.as_ref(), self.walker.as_ref()
        ) {
            Some(table) => match self.store.install(table) {
                Some(serial) => {
                    info!("Validation cycle complete, serial {}.", serial);
                }
                None => {
                    warn!("Validation cycle completed after store shutdown.");
                }
            },
            None => {
                warn!("Validation cycle failed; keeping the previous snapshot.");
            }
        }
    }
}


//------------ Signal Handling --------------------------------------------------

#[cfg(unix)]
fn install_signal_handler(flag: Arc<AtomicBool>) {
    unix_signal::install(flag)
}

#[cfg(not(unix))]
fn install_signal_handler(_flag: Arc<AtomicBool>) { }

#[cfg(unix)]
mod unix_signal {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, OnceLock};
    use nix::libc::c_int;
    use nix::sys::signal::{self, SigHandler, Signal};

    static SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    extern "C" fn handle(_signal: c_int) {
        if let Some(flag) = SHUTDOWN.get() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Installs a `SIGINT`/`SIGTERM` handler that sets `flag`.
    ///
    /// Safe to call at most once per process; a second call would
    /// silently keep the first flag, since `OnceLock::set` only
    /// succeeds the first time.
    pub fn install(flag: Arc<AtomicBool>) {
        let _ = SHUTDOWN.set(flag);
        unsafe {
            // SAFETY: `handle` only performs an atomic store, which is
            // async-signal-safe.
            let _ = signal::signal(Signal::SIGINT, SigHandler::Handler(handle));
            let _ = signal::signal(Signal::SIGTERM, SigHandler::Handler(handle));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_does_not_exceed_validation_interval() {
        let interval = Duration::from_millis(50);
        assert_eq!(TICK.min(interval), interval);
    }
}
