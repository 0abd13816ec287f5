use std::{env, path::Path, time::Duration};

use log::LevelFilter;
use shuttle_derive::{CliOptions, CliValue, KvDisplay};

use crate::{
    Error, Result,
    algo::OpenPathConfig,
    provider::{DEFAULT_GRAPHHOPPER_URL, ProviderKind},
};

/// Largest `--max-exact-stops`; the doubled matrix must stay within the exact
/// solver's node ceiling and the ghost penalty argument.
pub const MAX_EXACT_STOPS: usize = 10;

/// Runtime options for the router binary and the services it wires up.
#[derive(Clone, Debug, CliOptions, KvDisplay)]
pub struct ServiceOptions {
    /// Stop file (`id,lat,lng,kind,line` tokens). Empty means stdin.
    #[cli(long = "input")]
    pub input: String,
    /// Output file for the resolved order and previews. Empty means stdout.
    #[cli(long = "output")]
    pub output: String,
    /// Line to run.
    #[cli(long = "line")]
    pub line: u64,
    /// Vehicle that runs the line.
    #[cli(long = "vehicle")]
    pub vehicle: u64,
    /// Number of transitions to simulate after start.
    #[cli(long = "advances")]
    pub advances: usize,
    /// Upcoming stops shown after every transition.
    #[cli(long = "lookahead")]
    pub lookahead: usize,
    /// Start at the far end of the resolved order.
    pub reverse: bool,
    /// Largest stop count a line may have for the exact solver.
    #[cli(long = "max-exact-stops")]
    pub max_exact_stops: usize,
    /// Ghost/real penalty override. Unset means `round(10 * max duration)`.
    #[cli(long = "high-penalty", parse_with = "parse_penalty")]
    #[kv(fmt = "debug")]
    pub high_penalty: Option<u64>,
    /// Charge the hop back to the first stop.
    pub return_to_origin: bool,
    /// Duration matrix source.
    #[cli(long = "provider", parse_with = "ProviderKind::parse")]
    pub provider: ProviderKind,
    #[cli(long = "graphhopper-url")]
    pub graphhopper_url: String,
    #[cli(long = "graphhopper-key", env = "GRAPHHOPPER_API_KEY")]
    #[kv(fmt = "secret")]
    pub graphhopper_key: String,
    /// Transport profile passed to the provider.
    #[cli(long = "profile")]
    pub profile: String,
    /// Request timeout for network providers, in seconds.
    #[cli(long = "provider-timeout")]
    pub provider_timeout: u64,
    /// Average speed used by the offline provider.
    #[cli(long = "average-speed")]
    pub average_speed_kmh: f64,
    /// Entries kept in the lookahead cache before it is cleared. 0 disables it.
    #[cli(long = "lookahead-cache")]
    pub lookahead_cache: usize,
    /// Structured logging level.
    #[cli(long = "log-level", parse_with = "LogLevel::parse")]
    pub log_level: LogLevel,
    /// Logging output format.
    #[cli(long = "log-format", parse_with = "LogFormat::parse")]
    pub log_format: LogFormat,
    /// Include timestamps in log lines.
    pub log_timestamp: bool,
    /// Optional output file path for logs. Empty means stderr.
    #[cli(long = "log-output")]
    pub log_output: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, CliValue)]
#[cli_value(option = "log-level")]
pub enum LogLevel {
    Error,
    #[cli(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
            Self::Off => LevelFilter::Off,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, CliValue)]
#[cli_value(option = "log-format")]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: String::new(),
            line: 1,
            vehicle: 1,
            advances: 0,
            lookahead: 3,
            reverse: false,
            max_exact_stops: 9,
            high_penalty: None,
            return_to_origin: false,
            provider: ProviderKind::Haversine,
            graphhopper_url: DEFAULT_GRAPHHOPPER_URL.to_string(),
            graphhopper_key: String::new(),
            profile: "car".to_string(),
            provider_timeout: 30,
            average_speed_kmh: 30.0,
            lookahead_cache: 1_024,
            log_level: LogLevel::Warn,
            log_format: LogFormat::Compact,
            log_timestamp: true,
            log_output: String::new(),
        }
    }
}

impl ServiceOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse_from_iter(env::args().skip(1))
    }

    fn parse_from_iter<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        options.apply_env_defaults()?;

        let mut args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_owned())
            .peekable();

        while let Some(arg) = args.next() {
            if arg == "--help" || arg == "-h" {
                return Err(Error::invalid_input(Self::usage()));
            }

            let Some(raw_name) = arg.strip_prefix("--") else {
                return Err(Error::invalid_input(format!(
                    "Unexpected argument: {arg}\n\n{}",
                    Self::usage()
                )));
            };

            if raw_name.is_empty() {
                return Err(Error::invalid_input(format!(
                    "Invalid option name: {arg}\n\n{}",
                    Self::usage()
                )));
            }

            let (name, value) = Self::split_arg(raw_name, &mut args);

            if options.apply_cli_option(&name, value.clone())? {
                continue;
            }

            match name.as_str() {
                "reverse" => options.reverse = flag(&name, value)?,
                "no-reverse" => options.reverse = negated_flag(&name, value)?,
                "return-to-origin" => options.return_to_origin = flag(&name, value)?,
                "no-return-to-origin" => options.return_to_origin = negated_flag(&name, value)?,
                "log-timestamp" => options.log_timestamp = flag(&name, value)?,
                "no-log-timestamp" => options.log_timestamp = negated_flag(&name, value)?,
                _ => {
                    return Err(Error::invalid_input(format!(
                        "Unknown option: --{name}\n\n{}",
                        Self::usage()
                    )));
                }
            }
        }

        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if !(2..=MAX_EXACT_STOPS).contains(&self.max_exact_stops) {
            return Err(Error::invalid_input(format!(
                "--max-exact-stops must be in 2..={MAX_EXACT_STOPS}, got {}",
                self.max_exact_stops
            )));
        }
        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(Error::invalid_input(format!(
                "--average-speed must be > 0, got {}",
                self.average_speed_kmh
            )));
        }
        if self.provider_timeout == 0 {
            return Err(Error::invalid_input("--provider-timeout must be > 0"));
        }
        Ok(())
    }

    pub fn usage() -> &'static str {
        concat!(
            "Usage:\n",
            "  shuttle-router [options] [--input stops.txt]\n",
            "  shuttle-router [options] < stops.txt\n\n",
            "Stop tokens are whitespace separated: id,lat,lng,kind,line\n",
            "  kind: static|passenger-pickup|parcel-pickup|parcel-dropoff\n\n",
            "Options:\n",
            "  --line <u64>\n",
            "  --vehicle <u64>\n",
            "  --advances <usize>\n",
            "  --lookahead <usize>\n",
            "  --reverse[=<bool>]\n",
            "  --no-reverse\n",
            "  --max-exact-stops <2..=10>\n",
            "  --high-penalty <u64|auto>\n",
            "  --return-to-origin[=<bool>]\n",
            "  --no-return-to-origin\n",
            "  --provider <haversine|graphhopper>\n",
            "  --graphhopper-url <url>\n",
            "  --graphhopper-key <key>   (or GRAPHHOPPER_API_KEY)\n",
            "  --profile <name>\n",
            "  --provider-timeout <seconds>\n",
            "  --average-speed <km/h>\n",
            "  --lookahead-cache <usize>\n",
            "  --log-level <error|warn|info|debug|trace|off>\n",
            "  --log-format <compact|pretty>\n",
            "  --log-timestamp[=<bool>]\n",
            "  --no-log-timestamp\n",
            "  --log-output <path>\n",
            "  --input <path>\n",
            "  --output <path>\n",
            "  --help\n",
            "\n",
            "Examples:\n",
            "  shuttle-router --input stops.txt --line 3 --advances 6\n",
            "  shuttle-router --line 3 --reverse --lookahead 5 --log-level=info < stops.txt\n",
            "  shuttle-router --provider=graphhopper --profile=bike --input stops.txt\n",
        )
    }

    pub fn open_path_config(&self) -> OpenPathConfig {
        OpenPathConfig {
            high: self.high_penalty,
            return_to_origin: self.return_to_origin,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout)
    }

    pub fn log_output_path(&self) -> Option<&Path> {
        non_stdio_path(&self.log_output)
    }

    pub fn output_path(&self) -> Option<&Path> {
        non_stdio_path(&self.output)
    }

    pub fn input_path(&self) -> Option<&Path> {
        non_stdio_path(&self.input)
    }
}

fn non_stdio_path(raw: &str) -> Option<&Path> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        None
    } else {
        Some(Path::new(raw))
    }
}

fn parse_penalty(raw: &str) -> Result<Option<u64>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::invalid_input(format!(
            "Invalid value for --high-penalty: {raw} (expected a positive integer or auto)"
        ))),
        Ok(high) => Ok(Some(high)),
    }
}

fn flag(name: &str, value: Option<String>) -> Result<bool> {
    match value {
        Some(v) => parse_bool(name, &v),
        None => Ok(true),
    }
}

fn negated_flag(name: &str, value: Option<String>) -> Result<bool> {
    if value.is_some() {
        return Err(Error::invalid_input(format!(
            "Flag --{name} does not take a value"
        )));
    }
    Ok(false)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "TRUE" | "True" | "yes" | "YES" | "on" | "ON" => Ok(true),
        "0" | "false" | "FALSE" | "False" | "no" | "NO" | "off" | "OFF" => Ok(false),
        _ => Err(Error::invalid_input(format!(
            "Invalid boolean for --{name}: {value} (expected true/false)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use super::{LogFormat, LogLevel, ServiceOptions, parse_bool, parse_penalty};
    use crate::provider::ProviderKind;

    #[test]
    fn parse_bool_accepts_common_values() {
        assert!(parse_bool("x", "true").expect("parse"));
        assert!(parse_bool("x", "YES").expect("parse"));
        assert!(!parse_bool("x", "0").expect("parse"));
        assert!(!parse_bool("x", "off").expect("parse"));
    }

    #[test]
    fn parse_bool_rejects_unknown_values() {
        let err = parse_bool("reverse", "maybe").expect_err("invalid bool should fail");
        assert!(
            err.to_string()
                .contains("Invalid boolean for --reverse: maybe")
        );
    }

    #[test]
    fn log_level_maps_to_expected_filter() {
        assert_eq!(LogLevel::Warn.to_filter(), LevelFilter::Warn);
        assert_eq!(LogLevel::Trace.to_filter(), LevelFilter::Trace);
        assert_eq!(LogLevel::Off.to_filter(), LevelFilter::Off);
        assert_eq!(LogLevel::parse("warning").expect("alias"), LogLevel::Warn);
    }

    #[test]
    fn parse_penalty_accepts_auto_and_positive_values() {
        assert_eq!(parse_penalty("auto").expect("parse"), None);
        assert_eq!(parse_penalty(" 5000 ").expect("parse"), Some(5_000));
        assert!(parse_penalty("0").is_err());
        assert!(parse_penalty("-3").is_err());
    }

    #[test]
    fn parse_from_iter_applies_known_cli_options() {
        let options = ServiceOptions::parse_from_iter([
            "--input=stops.txt",
            "--output=route.txt",
            "--line=4",
            "--vehicle",
            "12",
            "--advances=6",
            "--lookahead=5",
            "--reverse",
            "--max-exact-stops=7",
            "--high-penalty=9000",
            "--return-to-origin=true",
            "--provider=gh",
            "--graphhopper-url=http://localhost:8989/matrix",
            "--graphhopper-key=abc",
            "--profile=bike",
            "--provider-timeout=5",
            "--average-speed=42.5",
            "--lookahead-cache=16",
            "--log-level=debug",
            "--log-format=pretty",
            "--log-timestamp=false",
            "--log-output=run.log",
        ])
        .expect("parse options");

        assert_eq!(options.input, "stops.txt");
        assert_eq!(options.output, "route.txt");
        assert_eq!((options.line, options.vehicle), (4, 12));
        assert_eq!((options.advances, options.lookahead), (6, 5));
        assert!(options.reverse);
        assert_eq!(options.max_exact_stops, 7);
        assert_eq!(options.high_penalty, Some(9_000));
        assert!(options.return_to_origin);
        assert_eq!(options.provider, ProviderKind::GraphHopper);
        assert_eq!(options.graphhopper_url, "http://localhost:8989/matrix");
        assert_eq!(options.graphhopper_key, "abc");
        assert_eq!(options.profile, "bike");
        assert_eq!(options.provider_timeout().as_secs(), 5);
        assert_eq!(options.average_speed_kmh, 42.5);
        assert_eq!(options.lookahead_cache, 16);
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.log_format, LogFormat::Pretty);
        assert!(!options.log_timestamp);
        assert_eq!(options.log_output, "run.log");

        let config = options.open_path_config();
        assert_eq!(config.high, Some(9_000));
        assert!(config.return_to_origin);
    }

    #[test]
    fn defaults_route_offline_without_return() {
        let options = ServiceOptions::default();
        assert_eq!(options.provider, ProviderKind::Haversine);
        assert_eq!(options.max_exact_stops, 9);
        assert_eq!(options.high_penalty, None);
        assert!(!options.return_to_origin);
        assert!(!options.reverse);
    }

    #[test]
    fn parse_from_iter_accepts_negated_flags() {
        let options =
            ServiceOptions::parse_from_iter(["--reverse", "--no-reverse", "--no-log-timestamp"])
                .expect("parse options");
        assert!(!options.reverse);
        assert!(!options.log_timestamp);
    }

    #[test]
    fn parse_from_iter_rejects_negated_flag_with_value() {
        let err = ServiceOptions::parse_from_iter(["--no-reverse=true"])
            .expect_err("expected flag value rejection");
        assert!(err.to_string().contains("does not take a value"));
    }

    #[test]
    fn parse_from_iter_rejects_out_of_range_exact_stops() {
        let err = ServiceOptions::parse_from_iter(["--max-exact-stops=11"])
            .expect_err("above ceiling");
        assert!(err.to_string().contains("--max-exact-stops must be in 2..=10"));
        assert!(ServiceOptions::parse_from_iter(["--max-exact-stops=1"]).is_err());
    }

    #[test]
    fn parse_from_iter_rejects_bad_provider_and_speed() {
        let err = ServiceOptions::parse_from_iter(["--provider=osrm"]).expect_err("unknown provider");
        assert!(err.to_string().contains("Invalid value for --provider: osrm"));

        let err =
            ServiceOptions::parse_from_iter(["--average-speed=0"]).expect_err("zero speed");
        assert!(err.to_string().contains("--average-speed must be > 0"));
    }

    #[test]
    fn parse_from_iter_rejects_unknown_option() {
        let err = ServiceOptions::parse_from_iter(["--unknown-opt=1"])
            .expect_err("expected unknown option error");
        assert!(err.to_string().contains("Unknown option: --unknown-opt"));
    }

    #[test]
    fn parse_from_iter_rejects_unexpected_positional_argument() {
        let err =
            ServiceOptions::parse_from_iter(["stops.txt"]).expect_err("expected positional error");
        assert!(err.to_string().contains("Unexpected argument: stops.txt"));
    }

    #[test]
    fn parse_from_iter_requires_value_for_line() {
        let err = ServiceOptions::parse_from_iter(["--line"]).expect_err("missing value should fail");
        assert!(err.to_string().contains("Missing value for --line"));
    }

    #[test]
    fn parse_from_iter_help_returns_usage_error() {
        let err =
            ServiceOptions::parse_from_iter(["--help"]).expect_err("help should short-circuit");
        assert!(err.to_string().contains("Usage:"));
    }

    #[test]
    fn paths_treat_empty_and_dash_as_stdio() {
        let options = ServiceOptions::default();
        assert!(options.input_path().is_none());
        assert!(options.output_path().is_none());

        let options = ServiceOptions {
            output: "-".to_string(),
            log_output: "run.log".to_string(),
            ..ServiceOptions::default()
        };
        assert!(options.output_path().is_none());
        assert_eq!(
            options.log_output_path(),
            Some(std::path::Path::new("run.log"))
        );
    }

    #[test]
    fn display_hides_the_api_key() {
        let options = ServiceOptions {
            graphhopper_key: "s3cret".to_string(),
            ..ServiceOptions::default()
        };
        let shown = options.to_string();
        assert!(shown.contains("graphhopper_key"));
        assert!(!shown.contains("s3cret"));
    }
}
