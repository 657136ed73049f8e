//! Stderr logger with coloured level tags

use crate::config::CliConfig;
use log::{Level, Log, Metadata, Record};
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

struct StderrLogger {
    color: AtomicBool,
}

static LOGGER: StderrLogger = StderrLogger {
    color: AtomicBool::new(false),
};

impl StderrLogger {
    fn tag(&self, level: Level) -> String {
        let tag = format!("{level:5}");
        if !self.color.load(Ordering::Relaxed) {
            return tag;
        }
        match level {
            Level::Error => tag.bright_red().to_string(),
            Level::Warn => tag.bright_yellow().to_string(),
            Level::Info => tag.bright_blue().to_string(),
            Level::Debug => tag.bright_cyan().to_string(),
            Level::Trace => tag.bright_magenta().to_string(),
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = if self.color.load(Ordering::Relaxed) {
            record.target().dimmed().to_string()
        } else {
            record.target().to_string()
        };
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{} [{}] {}",
            self.tag(record.level()),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

pub fn init(config: &CliConfig) -> Result<(), log::SetLoggerError> {
    LOGGER.color.store(config.color, Ordering::Relaxed);
    log::set_logger(&LOGGER)?;
    log::set_max_level(config.log_level);
    Ok(())
}
