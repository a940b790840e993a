//! Log configuration assembled from the command line and config file.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::category::Category;
use crate::syslog::SyslogMakeWriter;

/// `-log` was given a name that is neither a category nor a shorthand.
#[derive(Debug, Error)]
#[error("unknown log category: {name}")]
pub struct UnknownCategory {
    /// The rejected name.
    pub name: String,
}

/// Failure while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogInitError {
    /// The logfile could not be opened for appending.
    #[error("failed to open logfile {path:?}: {source}")]
    Logfile {
        /// Requested logfile path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialised")]
    AlreadySet,
}

/// Where rendered log lines go.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum LogSink {
    /// Foreground operation: write to standard error.
    #[default]
    Stderr,
    /// `-logfile PATH`: append to the named file.
    File(PathBuf),
    /// Daemonized without a logfile: syslog(3).
    Syslog,
}

/// Aggregated logging configuration.
#[derive(Clone, Debug, Default)]
pub struct LogSettings {
    categories: BTreeSet<Category>,
    all: bool,
    scarce: bool,
    sink: LogSink,
}

impl LogSettings {
    /// Creates settings with no categories enabled, writing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables a category by name; also accepts the `all` and `scarce`
    /// shorthands.
    pub fn enable(&mut self, name: &str) -> Result<(), UnknownCategory> {
        match name {
            "all" => {
                self.all = true;
                Ok(())
            }
            "scarce" => {
                self.scarce = true;
                Ok(())
            }
            other => match Category::from_name(other) {
                Some(category) => {
                    self.categories.insert(category);
                    Ok(())
                }
                None => Err(UnknownCategory {
                    name: other.to_string(),
                }),
            },
        }
    }

    /// Selects the output sink.
    pub fn set_sink(&mut self, sink: LogSink) {
        self.sink = sink;
    }

    /// Returns the configured sink.
    #[must_use]
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Builds the target filter implied by the enabled categories.
    #[must_use]
    pub fn filter(&self) -> Targets {
        let base = if self.scarce {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        };
        let mut targets = Targets::new().with_default(base);
        if self.all {
            for category in Category::ALL {
                targets = targets.with_target(category.name(), LevelFilter::DEBUG);
            }
        } else {
            for category in &self.categories {
                targets = targets.with_target(category.name(), LevelFilter::DEBUG);
            }
        }
        targets
    }

    /// Installs the global subscriber for the configured sink and filter.
    pub fn init(&self) -> Result<(), LogInitError> {
        let filter = self.filter();
        let result = match &self.sink {
            LogSink::Stderr => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .try_init(),
            LogSink::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| LogInitError::Logfile {
                        path: path.clone(),
                        source,
                    })?;
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_target(false)
                            .with_writer(Mutex::new(file)),
                    )
                    .try_init()
            }
            LogSink::Syslog => tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .without_time()
                        .with_writer(SyslogMakeWriter),
                )
                .try_init(),
        };
        result.map_err(|_| LogInitError::AlreadySet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn enable_accepts_categories_and_shorthands() {
        let mut settings = LogSettings::new();
        settings.enable("delay").unwrap();
        settings.enable("exec").unwrap();
        settings.enable("scarce").unwrap();
        settings.enable("all").unwrap();
        assert!(settings.enable("nonsense").is_err());
    }

    #[test]
    fn default_filter_keeps_categories_silent() {
        let settings = LogSettings::new();
        let filter = settings.filter();
        assert!(filter.would_enable("delay", &Level::INFO));
        assert!(!filter.would_enable("delay", &Level::DEBUG));
    }

    #[test]
    fn enabled_category_opens_debug() {
        let mut settings = LogSettings::new();
        settings.enable("collapse").unwrap();
        let filter = settings.filter();
        assert!(filter.would_enable("collapse", &Level::DEBUG));
        assert!(!filter.would_enable("delay", &Level::DEBUG));
    }

    #[test]
    fn all_opens_every_category() {
        let mut settings = LogSettings::new();
        settings.enable("all").unwrap();
        let filter = settings.filter();
        for category in Category::ALL {
            assert!(filter.would_enable(category.name(), &Level::DEBUG));
        }
    }

    #[test]
    fn scarce_suppresses_info() {
        let mut settings = LogSettings::new();
        settings.enable("scarce").unwrap();
        let filter = settings.filter();
        assert!(!filter.would_enable("anything", &Level::INFO));
        assert!(filter.would_enable("anything", &Level::WARN));
    }

    #[test]
    fn scarce_still_allows_explicit_categories() {
        let mut settings = LogSettings::new();
        settings.enable("scarce").unwrap();
        settings.enable("exec").unwrap();
        let filter = settings.filter();
        assert!(filter.would_enable("exec", &Level::DEBUG));
    }
}
