//! Configuration.

use std::{env, fs, process};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use clap::{App, Arg, ArgMatches};
use dirs::home_dir;
use log::LevelFilter;


//------------ Config --------------------------------------------------------

/// The complete configuration for a run of the validator.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the directory that contains the repository cache.
    pub cache_dir: PathBuf,

    /// Path to the directory that contains the trust anchor locators.
    pub tal_dir: PathBuf,

    /// Addresses to listen for RTR connections on.
    pub rtr_listen: Vec<SocketAddr>,

    /// The accept backlog for the RTR listener.
    pub rtr_backlog: u32,

    /// Read/write timeout for RTR connections.
    pub rtr_timeout: Duration,

    /// How often to trigger a new validation cycle.
    pub validation_interval: Duration,

    /// The refresh interval announced to RTR clients (version >= 1).
    pub rtr_refresh: u32,

    /// The retry interval announced to RTR clients (version >= 1).
    pub rtr_retry: u32,

    /// The expire interval announced to RTR clients (version >= 1), and
    /// the window used to bound delta history retention.
    pub rtr_expire: u32,

    /// How many deltas to keep in the history at most.
    pub history_size: usize,

    /// Whether fetching over rsync is enabled.
    pub enable_rsync: bool,

    /// Whether fetching over RRDP is enabled.
    pub enable_rrdp: bool,

    /// Whether to skip fetching entirely and only use what's cached.
    pub offline: bool,

    /// The log level filter for setting up logging.
    pub log_level: LevelFilter,

    /// Where to send log output.
    pub log_target: LogTarget,

    /// Run detached from the terminal.
    pub daemon: bool,

    /// Optional PID file to create and lock.
    pub pid_file: Option<PathBuf>,
}

impl Config {
    pub fn create() -> Self {
        let matches = App::new("rpki-relay")
            .version("0.1.0")
            .about("validates RPKI route origin attestations and serves RTR")
            .arg(Arg::with_name("basedir")
                 .short("b")
                 .long("base-dir")
                 .value_name("DIR")
                 .help("sets the base directory for cache and TALs")
                 .takes_value(true)
            )
            .arg(Arg::with_name("cachedir")
                 .short("c")
                 .long("cache-dir")
                 .value_name("DIR")
                 .help("sets the repository cache directory")
                 .takes_value(true)
            )
            .arg(Arg::with_name("taldir")
                 .short("t")
                 .long("tal-dir")
                 .value_name("DIR")
                 .help("sets the TAL directory")
                 .takes_value(true)
            )
            .arg(Arg::with_name("listen")
                 .short("l")
                 .long("listen")
                 .value_name("ADDR:PORT")
                 .help("listen addr:port for RTR connections")
                 .takes_value(true)
                 .multiple(true)
            )
            .arg(Arg::with_name("backlog")
                 .long("backlog")
                 .value_name("COUNT")
                 .default_value("1024")
                 .help("accept backlog for the RTR listener")
            )
            .arg(Arg::with_name("refresh")
                 .long("refresh")
                 .value_name("SECONDS")
                 .default_value("3600")
                 .help("validation cycle interval in seconds")
            )
            .arg(Arg::with_name("rtr_refresh")
                 .long("rtr-refresh")
                 .value_name("SECONDS")
                 .default_value("3600")
                 .help("RTR refresh interval announced to clients")
            )
            .arg(Arg::with_name("rtr_retry")
                 .long("rtr-retry")
                 .value_name("SECONDS")
                 .default_value("600")
                 .help("RTR retry interval announced to clients")
            )
            .arg(Arg::with_name("rtr_expire")
                 .long("rtr-expire")
                 .value_name("SECONDS")
                 .default_value("7200")
                 .help("RTR expire interval announced to clients")
            )
            .arg(Arg::with_name("history_size")
                 .long("history")
                 .value_name("COUNT")
                 .default_value("10")
                 .help("number of deltas to keep in the history")
            )
            .arg(Arg::with_name("disable_rsync")
                 .long("disable-rsync")
                 .help("disables fetching via rsync")
            )
            .arg(Arg::with_name("disable_rrdp")
                 .long("disable-rrdp")
                 .help("disables fetching via RRDP")
            )
            .arg(Arg::with_name("offline")
                 .long("offline")
                 .help("do not fetch, only use what is already cached")
            )
            .arg(Arg::with_name("daemon")
                 .short("d")
                 .long("daemon")
                 .help("run in daemon mode (detach from terminal)")
            )
            .arg(Arg::with_name("pid_file")
                 .long("pid-file")
                 .value_name("FILE")
                 .takes_value(true)
                 .help("write the process ID to this file")
            )
            .arg(Arg::with_name("syslog")
                 .long("syslog")
                 .help("log to syslog instead of stderr")
            )
            .arg(Arg::with_name("logfile")
                 .long("logfile")
                 .value_name("FILE")
                 .takes_value(true)
                 .help("log to this file instead of stderr")
            )
            .arg(Arg::with_name("verbose")
                 .short("v")
                 .long("verbose")
                 .multiple(true)
                 .help("print more (and more) information")
            )
            .arg(Arg::with_name("quiet")
                 .short("q")
                 .long("quiet")
                 .help("print less information, repeat to suppress warnings")
            )
            .get_matches();

        let cur_dir = match env::current_dir() {
            Ok(dir) => dir,
            Err(err) => {
                println!(
                    "Fatal: cannot get current directory ({}). Aborting.",
                    err
                );
                process::exit(1);
            }
        };

        let rtr_listen = match matches.values_of("listen") {
            Some(values) => {
                let mut listen = Vec::new();
                for val in values {
                    match val.to_socket_addrs() {
                        Ok(some) => listen.extend(some),
                        Err(_) => {
                            println!("Invalid socket address {}", val);
                            process::exit(1);
                        }
                    }
                }
                listen
            }
            None => {
                "127.0.0.1:3323".to_socket_addrs().unwrap().collect()
            }
        };

        let (cache_dir, tal_dir) = Self::prepare_dirs(&matches, &cur_dir);

        Config {
            cache_dir,
            tal_dir,
            rtr_listen,
            rtr_backlog: Self::parse_u32(&matches, "backlog"),
            rtr_timeout: Duration::from_secs(60),
            validation_interval: Duration::from_secs(
                u64::from(Self::parse_u32(&matches, "refresh"))
            ),
            rtr_refresh: Self::parse_u32(&matches, "rtr_refresh"),
            rtr_retry: Self::parse_u32(&matches, "rtr_retry"),
            rtr_expire: Self::parse_u32(&matches, "rtr_expire"),
            history_size: Self::parse_u32(
                &matches, "history_size"
            ) as usize,
            enable_rsync: !matches.is_present("disable_rsync"),
            enable_rrdp: !matches.is_present("disable_rrdp"),
            offline: matches.is_present("offline"),
            log_level: match (
                matches.occurrences_of("quiet"),
                matches.occurrences_of("verbose"),
            ) {
                (0, 0) => LevelFilter::Warn,
                (0, 1) => LevelFilter::Info,
                (0, _) => LevelFilter::Debug,
                (1, _) => LevelFilter::Error,
                (_, _) => LevelFilter::Off,
            },
            log_target: Self::log_target(&matches),
            daemon: matches.is_present("daemon"),
            pid_file: matches.value_of("pid_file").map(|path| {
                cur_dir.join(path)
            }),
        }
    }

    fn parse_u32(matches: &ArgMatches, name: &str) -> u32 {
        let value = matches.value_of(name).unwrap();
        match u32::from_str(value) {
            Ok(some) => some,
            Err(_) => {
                println!(
                    "Invalid value '{}' for --{}. Needs to be a number.",
                    value, name
                );
                process::exit(1);
            }
        }
    }

    #[cfg(unix)]
    fn log_target(matches: &ArgMatches) -> LogTarget {
        if matches.is_present("syslog") {
            LogTarget::Syslog(syslog::Facility::LOG_DAEMON)
        }
        else if let Some(path) = matches.value_of("logfile") {
            LogTarget::File(PathBuf::from(path))
        }
        else {
            LogTarget::Default(syslog::Facility::LOG_DAEMON)
        }
    }

    #[cfg(not(unix))]
    fn log_target(matches: &ArgMatches) -> LogTarget {
        match matches.value_of("logfile") {
            Some(path) => LogTarget::File(PathBuf::from(path)),
            None => LogTarget::Stderr,
        }
    }

    /// Prepares and returns the cache dir and tal dir.
    fn prepare_dirs(
        matches: &ArgMatches, cur_dir: &Path
    ) -> (PathBuf, PathBuf) {
        let base_dir = match matches.value_of("basedir") {
            Some(dir) => Some(cur_dir.join(dir)),
            None => home_dir().map(|dir| dir.join(".rpki-cache")),
        };
        let cache_dir = match matches.value_of("cachedir") {
            Some(dir) => cur_dir.join(dir),
            None => match base_dir {
                Some(ref dir) => dir.join("repository"),
                None => {
                    println!("Can't determine default working directory. \
                              Please use the -b option.\nAborting.");
                    process::exit(1)
                }
            }
        };
        let tal_dir = match matches.value_of("taldir") {
            Some(dir) => cur_dir.join(dir),
            None => match base_dir {
                Some(ref dir) => dir.join("tals"),
                None => {
                    println!("Can't determine default working directory. \
                              Please use the -b option.\nAborting.");
                    process::exit(1)
                }
            }
        };

        if let Err(err) = fs::create_dir_all(&cache_dir) {
            println!(
                "Can't create repository directory {}: {}.\nAborting.",
                cache_dir.display(), err
            );
            process::exit(1);
        }
        if let Err(err) = fs::create_dir_all(&tal_dir) {
            println!(
                "Can't create TAL directory {}: {}.\nAborting.",
                tal_dir.display(), err
            );
            process::exit(1);
        }

        (cache_dir, tal_dir)
    }
}


//------------ LogTarget ------------------------------------------------------

/// Where to send log output.
#[derive(Clone, Debug)]
pub enum LogTarget {
    /// Stderr if attached to a terminal, syslog otherwise (unix only).
    #[cfg(unix)]
    Default(syslog::Facility),

    /// Syslog with the given facility (unix only).
    #[cfg(unix)]
    Syslog(syslog::Facility),

    /// A log file at the given path.
    File(PathBuf),

    /// Plain stderr.
    Stderr,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u32_accepts_digits() {
        let app = App::new("test").arg(
            Arg::with_name("n").long("n").takes_value(true)
                .default_value("42")
        );
        let matches = app.get_matches_from(vec!["test"]);
        assert_eq!(Config::parse_u32(&matches, "n"), 42);
    }
}
