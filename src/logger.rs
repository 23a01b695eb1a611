use std::io::{stderr, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

use crate::error::Result;

static LOGGER: OnceCell<StderrLogger> = OnceCell::new();

/// Installs the process-wide logger. Safe to call once per invocation; the
/// re-exec'd child installs its own copy from the propagated level.
pub fn init(level: LevelFilter) -> Result<()> {
    let logger = LOGGER.get_or_init(|| StderrLogger { level });
    // set_logger fails only if a logger is already installed, which can
    // happen in the test harness; the max level is still applied.
    let _ = log::set_logger(logger);
    log::set_max_level(level);
    Ok(())
}

/// The current level as a commandline-compatible string, used to propagate
/// `--log-level` to the child invocation.
pub fn level_arg() -> String {
    log::max_level().to_string().to_lowercase()
}

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = match record.level() {
            Level::Debug | Level::Trace => format!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            ),
            _ => format!("[{}] {}", record.level(), record.args()),
        };
        let _ = writeln!(stderr(), "{}", msg);
    }

    fn flush(&self) {
        let _ = stderr().flush();
    }
}
