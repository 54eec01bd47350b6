use log::{LevelFilter, Log, Metadata, Record};

use crate::globals::{DEFAULT_LOG_LEVEL, MAP_LOG_TARGET, PARSE_LOG_TARGET};

/// Targets logged below [`DEFAULT_LOG_LEVEL`] as well.
const EXTRA_LOGS: [&str; 2] = [MAP_LOG_TARGET, PARSE_LOG_TARGET];

/// Prints records to stdout, where the test harness captures them per test.
struct TestLogger;

impl Log for TestLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= DEFAULT_LOG_LEVEL || EXTRA_LOGS.contains(&metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            println!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: TestLogger = TestLogger;

/// Install the logger. Every test may call this; only the first call installs it.
pub fn init() {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Trace));
}
