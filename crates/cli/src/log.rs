//! Logging from DNSManager.

use std::fs::File;

use camino::Utf8PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::args::LogLevel;

//----------- LoggingConfig ----------------------------------------------------

/// How to log.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// The minimum severity of messages to log.
    pub level: LogLevel,

    /// Additional filter directives.
    pub trace_targets: Vec<String>,

    /// Where to log to.
    pub target: LogTarget,
}

/// Where log messages go.
#[derive(Clone, Debug)]
pub enum LogTarget {
    /// Append to a file.
    File(Utf8PathBuf),

    /// Print to stderr, leaving stdout to results.
    Stderr,
}

/// Install the global logger.
///
/// ## Panics
///
/// Panics if a global [`tracing`] logger has been set already.
pub fn launch(config: &LoggingConfig) -> Result<(), String> {
    let filter = make_env_filter(config)?;

    match &config.target {
        LogTarget::File(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| format!("could not open '{path}': {err}"))?;

            // We never emit colors to files.
            let layer = FmtLayer::new().with_ansi(false).with_writer(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init()
        }
        LogTarget::Stderr => {
            // We try to determine whether to use colors in a bit more fancy
            // way than tracing does automatically (it only does `NO_COLOR`).
            let layer = FmtLayer::new()
                .with_ansi(supports_color::on(supports_color::Stream::Stderr).is_some())
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init()
        }
    }
    Ok(())
}

/// Make a new [`EnvFilter`] based on the config.
fn make_env_filter(config: &LoggingConfig) -> Result<EnvFilter, String> {
    // Create an EnvFilter which won't read any env vars and only print ERROR
    // by default, which we then immediately override by adding another filter
    // on top.
    let mut filter = EnvFilter::default();
    filter = filter.add_directive(LevelFilter::from(config.level).into());

    for target in &config.trace_targets {
        filter = filter.add_directive(
            target
                .parse()
                .map_err(|_| format!("invalid trace target: '{target}'"))?,
        );
    }

    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(trace_targets: &[&str]) -> LoggingConfig {
        LoggingConfig {
            level: LogLevel::Info,
            trace_targets: trace_targets.iter().map(|t| t.to_string()).collect(),
            target: LogTarget::Stderr,
        }
    }

    #[test]
    fn trace_targets() {
        assert!(make_env_filter(&config(&["dnsmanager::xfr=trace"])).is_ok());
        let err = make_env_filter(&config(&["dnsmanager=loud"])).unwrap_err();
        assert_eq!(err, "invalid trace target: 'dnsmanager=loud'");
    }
}
