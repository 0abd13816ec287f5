//! Process-wide logger for the shuttle service.
//!
//! Service modules log at the configured level. The HTTP stack used by the
//! GraphHopper provider is capped at `warn` so a `debug` run stays readable.

use std::{fmt::Display, fs::File, io::Write};

use env_logger::{Builder, Target, fmt::Formatter};
use log::{Level, LevelFilter};

use crate::options::{LogFormat, ServiceOptions};
use crate::{Error, Result};

/// Targets that only log transport chatter.
const HTTP_TARGETS: [&str; 4] = ["reqwest", "hyper", "hyper_util", "rustls"];

const CRATE_PREFIX: &str = "shuttle_core::";

pub fn init_logger(options: &ServiceOptions) -> Result<()> {
    let log_format = options.log_format;
    let log_timestamp = options.log_timestamp;
    let level = options.log_level.to_filter();

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .write_style(env_logger::WriteStyle::Never)
        .format(move |buf: &mut Formatter, record| {
            if log_timestamp {
                write!(buf, "{} ", buf.timestamp_millis())?;
            }
            writeln!(
                buf,
                "{}",
                render(log_format, record.level(), record.target(), record.args())
            )
        });
    for target in HTTP_TARGETS {
        builder.filter_module(target, dependency_level(level));
    }

    if let Some(log_path) = options.log_output_path() {
        let log_file = File::create(log_path).map_err(|e| {
            Error::invalid_input(format!(
                "failed to create log output file {}: {e}",
                log_path.display()
            ))
        })?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| Error::invariant(format!("logger init failed: {e}")))
}

fn dependency_level(level: LevelFilter) -> LevelFilter {
    level.min(LevelFilter::Warn)
}

fn render(format: LogFormat, level: Level, target: &str, message: impl Display) -> String {
    match format {
        LogFormat::Compact => format!("{} {message}", level_tag(level)),
        LogFormat::Pretty => format!(
            "{} [{}] {message}",
            level_tag(level),
            short_target(target)
        ),
    }
}

/// `shuttle_core::route_cache` logs as `route_cache`; foreign targets keep their path.
fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter};

    use super::{dependency_level, render, short_target};
    use crate::options::LogFormat;

    #[test]
    fn http_targets_never_log_below_warn() {
        assert_eq!(dependency_level(LevelFilter::Trace), LevelFilter::Warn);
        assert_eq!(dependency_level(LevelFilter::Debug), LevelFilter::Warn);
        assert_eq!(dependency_level(LevelFilter::Error), LevelFilter::Error);
        assert_eq!(dependency_level(LevelFilter::Off), LevelFilter::Off);
    }

    #[test]
    fn pretty_lines_drop_the_crate_prefix() {
        assert_eq!(
            render(
                LogFormat::Pretty,
                Level::Debug,
                "shuttle_core::route_cache",
                "route_cache.build: start line=1 n=3"
            ),
            "DEBUG [route_cache] route_cache.build: start line=1 n=3"
        );
        assert_eq!(short_target("reqwest::connect"), "reqwest::connect");
    }

    #[test]
    fn compact_lines_carry_only_level_and_message() {
        assert_eq!(
            render(LogFormat::Compact, Level::Warn, "shuttle_core::fleet", "vehicle 7 busy"),
            "WARN vehicle 7 busy"
        );
    }
}
