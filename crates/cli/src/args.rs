use std::fmt;

use camino::Utf8PathBuf;
use clap::Parser;
use clap::builder::PossibleValue;
use tracing::level_filters::LevelFilter;

use crate::commands::Command;
use crate::context::Context;
use crate::error::CliError;
use crate::log::{LogTarget, LoggingConfig};

/// Manage DNS records on authoritative nameservers.
///
/// Records are changed with TSIG-signed dynamic updates and read with zone
/// transfers.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "dnsmanager",
    version = env!("DNSMANAGER_BUILD_VERSION"),
    disable_help_subcommand = true
)]
pub struct Args {
    /// The configuration file to use
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        env = dnsmanager_cfg::CONFIG_PATH_ENV,
        global = true
    )]
    pub config: Option<Utf8PathBuf>,

    /// The minimum severity of messages to log
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "warning",
        global = true
    )]
    pub log_level: LogLevel,

    /// Additional log filter directives, e.g. 'dnsmanager::xfr=trace'
    #[arg(long = "trace-target", value_name = "DIRECTIVE", global = true)]
    pub trace_targets: Vec<String>,

    /// Append log messages to a file instead of printing them
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<Utf8PathBuf>,

    /// Print results as JSON
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// The logging setup requested on the command line.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            trace_targets: self.trace_targets.clone(),
            target: match &self.log_file {
                Some(path) => LogTarget::File(path.clone()),
                None => LogTarget::Stderr,
            },
        }
    }

    pub async fn execute(self) -> Result<(), CliError> {
        let context = Context::new(self.config, self.json);
        self.command.execute(&context).await
    }
}

//----------- LogLevel ---------------------------------------------------------

/// A severity level for logging.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// A function or variable was interacted with, for debugging.
    Trace,

    /// Something occurred that may be relevant to debugging.
    Debug,

    /// Things are proceeding as expected.
    Info,

    /// Something does not appear to be correct.
    Warning,

    /// Something is wrong (but DNSManager can recover).
    Error,

    /// Something is wrong and DNSManager can't function at all.
    Critical,
}

impl LogLevel {
    /// Represent a [`LogLevel`] as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl clap::ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(self.as_str()))
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn global_flags() {
        let args = Args::try_parse_from([
            "dnsmanager",
            "rm",
            "www.example.com",
            "--json",
            "--log-level",
            "debug",
            "--trace-target",
            "dnsmanager::net=trace",
            "--config",
            "/tmp/dnsmanager.toml",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.log_level, LogLevel::Debug);
        assert_eq!(
            args.config.as_deref(),
            Some(camino::Utf8Path::new("/tmp/dnsmanager.toml"))
        );

        let logging = args.logging();
        assert_eq!(logging.trace_targets, ["dnsmanager::net=trace"]);
        assert!(matches!(logging.target, LogTarget::Stderr));
    }
}
