//! Logger setup for the twinvault binaries.
//!
//! `TWINVAULT_LOG_LEVEL` overrides the caller's default level (`RUST_LOG`
//! still wins when set) and `TWINVAULT_LOG_FORMAT` picks `json` or `plain`.

use env_logger::{fmt::Formatter, Env};
use log::Record;
use serde_json::json;
use std::env;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "TWINVAULT_LOG_FORMAT";
const LEVEL_ENV: &str = "TWINVAULT_LOG_LEVEL";

/// Output shape of each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line with `timestamp`, `level`, `target`, `message`.
    #[default]
    Json,
    Plain,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Install the global logger once; later calls do nothing.
pub fn init(default_level: &str) {
    INIT.get_or_init(|| configure(default_level));
}

fn configure(default_level: &str) {
    let level = env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
    let format = match env::var(FORMAT_ENV) {
        Ok(raw) => raw.parse().unwrap_or_else(|err| {
            eprintln!("{err}; falling back to json logs");
            LogFormat::Json
        }),
        Err(_) => LogFormat::default(),
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    match format {
        LogFormat::Json => builder.format(write_json),
        LogFormat::Plain => builder.format(write_plain),
    };

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {err}");
    }
}

fn write_json(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    let payload = json!({
        "timestamp": buf.timestamp().to_string(),
        "level": record.level().as_str().to_ascii_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
    });
    writeln!(buf, "{payload}")
}

fn write_plain(buf: &mut Formatter, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        buf,
        "{} {:<5} {} - {}",
        buf.timestamp(),
        record.level(),
        record.target(),
        record.args()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_known_names() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" Plain ".parse::<LogFormat>(), Ok(LogFormat::Plain));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Plain));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn init_is_idempotent() {
        init("debug");
        init("warn");
    }
}
