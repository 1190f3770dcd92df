//! CLI argument definitions for the conductor binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use conductor_config::{
    CACHE_DIR_ENV, DEFAULT_LOCAL_EVENT, LOG_FILTER_ENV, LOG_FORMAT_ENV, LogFormat, TEMP_DIR_ENV,
    default_log_format, verbosity_filter,
};

/// Command-line interface for the conductor CI event dispatcher.
#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Dispatch CI events to the handlers declared in a configuration file"
)]
pub(crate) struct Cli {
    /// Increases log verbosity; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Configuration file; discovered in the working directory when omitted.
    #[arg(short = 'f', long = "config", value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,
    /// Function to call instead of the event's `handle_<event>`.
    #[arg(short, long, value_name = "FUNCTION")]
    pub(crate) invoke: Option<String>,
    /// Option override as `key=value`; dotted keys nest.
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub(crate) options: Vec<String>,
    /// Runs outside CI, taking the event from `--event`.
    #[arg(short, long)]
    pub(crate) local: bool,
    /// Event dispatched in local mode.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_LOCAL_EVENT)]
    pub(crate) event: String,
    /// Log filter expression; overrides `-v`.
    #[arg(long, value_name = "FILTER", env = LOG_FILTER_ENV)]
    pub(crate) log_filter: Option<String>,
    /// Log output format.
    #[arg(
        long,
        value_name = "FORMAT",
        env = LOG_FORMAT_ENV,
        default_value_t = default_log_format()
    )]
    pub(crate) log_format: LogFormat,
    /// Cache root for fetched handler revisions.
    #[arg(long, value_name = "DIR", env = CACHE_DIR_ENV)]
    pub(crate) cache_dir: Option<PathBuf>,
    /// Base directory for the per-run temporary directory.
    #[arg(long, value_name = "DIR", env = TEMP_DIR_ENV)]
    pub(crate) temp_dir: Option<PathBuf>,
}

impl Cli {
    /// Filter expression for the log subscriber.
    pub(crate) fn log_filter(&self) -> String {
        self.log_filter
            .clone()
            .unwrap_or_else(|| verbosity_filter(self.verbose).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn log_format_defaults_to_the_configured_default() {
        let cli = Cli::try_parse_from(["conductor"]).expect("parse defaults");
        assert_eq!(cli.log_format, default_log_format());
        assert_eq!(cli.event, DEFAULT_LOCAL_EVENT);
    }

    #[rstest]
    #[case::quiet(0, verbosity_filter(0))]
    #[case::chatty(2, verbosity_filter(2))]
    fn verbosity_selects_a_filter_preset(#[case] verbose: u8, #[case] expected: &str) {
        let mut args = vec![String::from("conductor")];
        args.extend((0..verbose).map(|_| String::from("-v")));
        let cli = Cli::try_parse_from(args).expect("parse flags");
        assert_eq!(cli.log_filter(), expected);
    }

    #[test]
    fn explicit_filters_override_verbosity() {
        let cli = Cli::try_parse_from(["conductor", "-vv", "--log-filter", "warn"])
            .expect("parse flags");
        assert_eq!(cli.log_filter(), "warn");
    }
}
