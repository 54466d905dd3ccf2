//! Kernel logger.
//!
//! Implements `log::Log` on top of the HAL console. Records are filtered by
//! the global max level set in [`init`]; warnings and errors carry a level
//! prefix, everything else is printed bare.

use kcore_hal::println;
use log::{Level, LevelFilter, Metadata, Record};

/// Default filter: `Trace` with the `verbose` feature, `Info` otherwise.
pub const DEFAULT_LEVEL: LevelFilter = if cfg!(feature = "verbose") {
    LevelFilter::Trace
} else {
    LevelFilter::Info
};

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error | Level::Warn => println!("{}: {}", record.level(), record.args()),
            _ => println!("{}", record.args()),
        }
    }

    fn flush(&self) {}
}

/// Install the console logger and set the maximum level.
///
/// Calling it again only changes the level.
pub fn init(max_level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("logger already installed, level now {max_level}");
    }
    log::set_max_level(max_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcore_hal::console;
    use std::string::String;
    use std::sync::Mutex;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(s: &str) {
        CAPTURED.lock().unwrap().push_str(s);
    }

    #[test]
    fn test_records_reach_console() {
        console::set_output(capture);
        init(LevelFilter::Info);

        log::info!("[MEM] 3 huge pages available");
        log::warn!("lock 4 released from unexpected state 0");
        log::trace!("filtered out at info");

        let out = CAPTURED.lock().unwrap().clone();
        assert!(out.contains("[MEM] 3 huge pages available\n"));
        assert!(out.contains("WARN: lock 4 released from unexpected state 0\n"));
        assert!(!out.contains("filtered out at info"));
    }
}
