//! Session logging
//!
//! Records go to two sinks: the console, with coloured level tags, and the session log file, with
//! plain tags so the file stays readable in any viewer. Every line is stamped with the seconds
//! elapsed since the session epoch.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level, Record};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Module whose per-expansion traces are kept out of the console.
const PLANNER_TARGET: &str = "slip_lib::nav";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The minimum log level must be INFO or more verbose, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Could not open the session log file: {0}")]
    LogFileInitError(#[from] std::io::Error),

    #[error("A logger has already been set: {0}")]
    FernInitError(#[from] log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Start logging to the console and to the session's log file.
///
/// `min_level` must be `Info` or more verbose. The console never shows planner traces, the file
/// keeps everything at `min_level`.
///
/// Only the first call in a process can succeed.
pub fn logger_init(min_level: LevelFilter, session: &Session) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(record, level_tag(record.level()), message)
            ))
        })
        .level_for(PLANNER_TARGET, min_level.min(LevelFilter::Debug))
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(record, level_tag(record.level()).clear(), message)
            ))
        })
        .chain(fern::log_file(&session.log_file_path)?);

    fern::Dispatch::new()
        .level(min_level)
        .chain(console)
        .chain(file)
        .apply()?;

    info!(
        "Logging at {:?} since {} to {:?}",
        min_level,
        session::get_epoch(),
        session.log_file_path
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build one log line. Debug and trace lines carry the record's target.
fn format_line(record: &Record, tag: ColoredString, message: &std::fmt::Arguments) -> String {
    let elapsed = session::get_elapsed_seconds();

    if record.level() > Level::Info {
        format!("[{:10.6} {}] {}: {}", elapsed, tag, record.target(), message)
    } else {
        format!("[{:10.6} {}] {}", elapsed, tag, message)
    }
}

/// Three letter tag for a level.
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info => "INF".normal(),
        Level::Warn => "WRN".yellow(),
        Level::Error => "ERR".red().bold(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plain_level_tags() {
        let tags: Vec<String> = [
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ]
        .iter()
        .map(|l| level_tag(*l).clear().to_string())
        .collect();

        assert_eq!(tags, vec!["ERR", "WRN", "INF", "DBG", "TRC"]);
    }

    fn plain_line(level: Level, target: &str, args: std::fmt::Arguments) -> String {
        let record = Record::builder()
            .level(level)
            .target(target)
            .args(args)
            .build();

        format_line(&record, level_tag(level).clear(), record.args())
    }

    #[test]
    fn test_format_line_target() {
        let line = plain_line(
            Level::Debug,
            "slip_lib::nav::dstar_lite",
            format_args!("expanded {} nodes", 12),
        );
        assert!(line.ends_with("DBG] slip_lib::nav::dstar_lite: expanded 12 nodes"));

        let line = plain_line(Level::Info, "slip_exec", format_args!("drive finished"));
        assert!(line.ends_with("INF] drive finished"));
    }
}
