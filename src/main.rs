use std::process::exit;
use rpki_relay::config::Config;
use rpki_relay::operation::Driver;
use rpki_relay::process::Process;

fn main() {
    if Process::init().is_err() {
        exit(1);
    }
    let config = Config::create();
    let mut process = Process::new(config);
    if process.switch_logging(process.config().daemon).is_err() {
        exit(1);
    }
    if process.setup_service(process.config().daemon).is_err() {
        exit(1);
    }
    if process.drop_privileges().is_err() {
        exit(1);
    }
    if process.create_cache_dir().is_err() {
        exit(1);
    }

    let driver = Driver::new(&process);
    match driver.run() {
        Ok(()) => exit(0),
        Err(err) => exit(err.exit_code()),
    }
}
