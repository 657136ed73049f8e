//! Runtime settings for the CLI

use log::LevelFilter;
use std::io::IsTerminal;
use std::str::FromStr;

/// Environment variable holding the log level (`error` .. `trace`, `off`)
pub const LOG_ENV: &str = "KLIVE_DISK_LOG";
/// Set to `1` to create containers read-only by default
pub const READONLY_ENV: &str = "KLIVE_DISK_READONLY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliConfig {
    pub log_level: LevelFilter,
    /// Colour level tags on stderr
    pub color: bool,
    /// Create containers read-only unless told otherwise
    pub read_only: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            color: std::io::stderr().is_terminal(),
            read_only: false,
        }
    }
}

impl CliConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Defaults overridden by the environment. An unparsable level is
    /// reported and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if std::env::var_os("NO_COLOR").is_some() {
            config = config.color(false);
        }
        if std::env::var(READONLY_ENV).is_ok_and(|v| v.trim() == "1") {
            config = config.read_only(true);
        }
        match std::env::var(LOG_ENV) {
            Ok(value) => match parse_level(&value) {
                Some(level) => config.log_level(level),
                None => {
                    eprintln!("{}: unknown log level {:?}, using info", LOG_ENV, value);
                    config
                }
            },
            Err(_) => config,
        }
    }
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(value.trim()).ok()
}
