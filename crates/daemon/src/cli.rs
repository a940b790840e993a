//! Command-line front-end.
//!
//! The flag surface keeps the traditional single-dash long options
//! (`-log`, `-nodaemon`, ...), so parsing walks the raw `OsString` vector
//! instead of going through a derive-style parser.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use mirror_core::{version_banner, ExitCode, PROGRAM_NAME};
use mirror_logging::{LogSettings, LogSink};
use thiserror::Error;

use crate::config;
use crate::monitor::{self, MonitorError};
use crate::runtime::Runtime;
use crate::status::StatusWriter;
use crate::{daemonize, pidfile, signal};

/// A parsed invocation that runs the daemon.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    /// Categories enabled with `-log`.
    pub log: Vec<String>,
    /// `-logfile PATH`.
    pub logfile: Option<PathBuf>,
    /// `-monitor NAME`.
    pub monitor: Option<String>,
    /// `-nodaemon`.
    pub nodaemon: bool,
    /// `-pidfile PATH`.
    pub pidfile: Option<PathBuf>,
    /// Positional configuration file.
    pub config_file: Option<PathBuf>,
    /// Sync synthesized from `-rsync` / `-rsyncssh`.
    pub inline_sync: Option<InlineSync>,
}

/// A sync given wholly on the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InlineSync {
    /// `-rsync SRC DST`.
    Rsync {
        /// Source directory.
        source: String,
        /// rsync target specification.
        target: String,
    },
    /// `-rsyncssh SRC HOST DIR`.
    RsyncSsh {
        /// Source directory.
        source: String,
        /// Remote host.
        host: String,
        /// Absolute directory on the remote host.
        target_dir: String,
    },
}

/// What the argument vector asked for.
#[derive(Clone, Debug)]
pub enum ParsedCommand {
    /// `-help`: print usage, exit nonzero.
    Help,
    /// `-version`: print the banner, exit zero.
    Version,
    /// Bare `-monitor`: list facilities, exit nonzero.
    ListMonitors,
    /// Run the daemon.
    Run(Invocation),
}

/// Rejected argument vector.
#[derive(Debug, Error)]
pub enum CliError {
    /// An option the daemon does not know.
    #[error("unknown option: {0}")]
    UnknownOption(String),
    /// An option missing its value.
    #[error("option {0} requires a value")]
    MissingValue(&'static str),
    /// `-rsync`/`-rsyncssh` combined with a configuration file.
    #[error("a config file cannot be combined with -rsync/-rsyncssh")]
    InlineAndConfig,
    /// More than one positional argument.
    #[error("more than one config file given: {0}")]
    ExtraPositional(String),
    /// `-runner` names a driver file this build does not have.
    #[error("-runner is not supported: the engine is compiled in; use a config file")]
    RunnerUnsupported,
    /// Argument was not valid UTF-8.
    #[error("argument is not valid UTF-8: {0:?}")]
    NotUtf8(OsString),
}

/// Parses the full argument vector (including argv[0]).
pub fn parse_args(arguments: &[OsString]) -> Result<ParsedCommand, CliError> {
    let mut invocation = Invocation::default();
    let mut iter = arguments.iter().skip(1).peekable();

    while let Some(argument) = iter.next() {
        let text = argument
            .to_str()
            .ok_or_else(|| CliError::NotUtf8(argument.clone()))?;
        match text {
            "-help" | "--help" => return Ok(ParsedCommand::Help),
            "-version" | "--version" => return Ok(ParsedCommand::Version),
            "-log" => {
                let value = take_value(&mut iter, "-log")?;
                invocation.log.push(value);
            }
            "-logfile" => {
                let value = take_value(&mut iter, "-logfile")?;
                invocation.logfile = Some(PathBuf::from(value));
            }
            "-monitor" => match iter.peek() {
                Some(next) if !next.to_string_lossy().starts_with('-') => {
                    let value = take_value(&mut iter, "-monitor")?;
                    invocation.monitor = Some(value);
                }
                _ => return Ok(ParsedCommand::ListMonitors),
            },
            "-nodaemon" => invocation.nodaemon = true,
            "-pidfile" => {
                let value = take_value(&mut iter, "-pidfile")?;
                invocation.pidfile = Some(PathBuf::from(value));
            }
            "-runner" => {
                let _ = take_value(&mut iter, "-runner");
                return Err(CliError::RunnerUnsupported);
            }
            "-rsync" => {
                let source = take_value(&mut iter, "-rsync")?;
                let target = take_value(&mut iter, "-rsync")?;
                invocation.inline_sync = Some(InlineSync::Rsync { source, target });
            }
            "-rsyncssh" => {
                let source = take_value(&mut iter, "-rsyncssh")?;
                let host = take_value(&mut iter, "-rsyncssh")?;
                let target_dir = take_value(&mut iter, "-rsyncssh")?;
                invocation.inline_sync = Some(InlineSync::RsyncSsh {
                    source,
                    host,
                    target_dir,
                });
            }
            flag if flag.starts_with('-') => {
                return Err(CliError::UnknownOption(flag.to_string()));
            }
            positional => {
                if invocation.config_file.is_some() {
                    return Err(CliError::ExtraPositional(positional.to_string()));
                }
                invocation.config_file = Some(PathBuf::from(positional));
            }
        }
    }

    if invocation.config_file.is_some() && invocation.inline_sync.is_some() {
        return Err(CliError::InlineAndConfig);
    }
    Ok(ParsedCommand::Run(invocation))
}

fn take_value<'a, I>(
    iter: &mut std::iter::Peekable<I>,
    option: &'static str,
) -> Result<String, CliError>
where
    I: Iterator<Item = &'a OsString>,
{
    let value = iter.next().ok_or(CliError::MissingValue(option))?;
    value
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| CliError::NotUtf8(value.clone()))
}

/// Renders the `-help` text.
#[must_use]
pub fn render_help() -> String {
    format!(
        "\
Usage: {PROGRAM_NAME} [OPTIONS] [CONFIG-FILE]
       {PROGRAM_NAME} [OPTIONS] -rsync SRC DST
       {PROGRAM_NAME} [OPTIONS] -rsyncssh SRC HOST DIR

Live directory mirroring: watches SRC and drives rsync at the target.

Options:
  -help                  show this text and exit
  -log CATEGORY          enable a log category (also: all, scarce)
  -logfile PATH          log to PATH instead of syslog
  -monitor NAME          select the event facility; bare -monitor lists them
  -nodaemon              stay in the foreground
  -pidfile PATH          write the daemon pid to PATH
  -version               print the version and exit
  -rsync SRC DST         mirror SRC to DST with the built-in rsync action
  -rsyncssh SRC HOST DIR mirror SRC to HOST:DIR with rsync + ssh
"
    )
}

/// Runs the daemon CLI over the provided argument iterator and output
/// handles; returns the process exit code.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let arguments: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    let parsed = match parse_args(&arguments) {
        Ok(parsed) => parsed,
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            let _ = writeln!(stderr, "try '{PROGRAM_NAME} -help'");
            return ExitCode::Config.code();
        }
    };

    match parsed {
        ParsedCommand::Help => {
            let _ = stdout.write_all(render_help().as_bytes());
            ExitCode::Config.code()
        }
        ParsedCommand::Version => {
            let _ = stdout.write_all(version_banner().as_bytes());
            ExitCode::Ok.code()
        }
        ParsedCommand::ListMonitors => {
            for name in monitor::SUPPORTED {
                let _ = writeln!(stdout, "{name}");
            }
            ExitCode::Config.code()
        }
        ParsedCommand::Run(invocation) => execute(&invocation, stderr),
    }
}

fn execute<Err: Write>(invocation: &Invocation, stderr: &mut Err) -> i32 {
    let setup = match config::load(invocation) {
        Ok(setup) => setup,
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            return ExitCode::Config.code();
        }
    };

    let mut log_settings = LogSettings::new();
    for category in &setup.settings.log {
        if let Err(error) = log_settings.enable(category) {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            return ExitCode::Config.code();
        }
    }
    log_settings.set_sink(match (&setup.settings.logfile, setup.settings.nodaemon) {
        (Some(path), _) => LogSink::File(path.clone()),
        (None, true) => LogSink::Stderr,
        (None, false) => LogSink::Syslog,
    });
    if let Err(error @ mirror_logging::LogInitError::Logfile { .. }) = log_settings.init() {
        let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
        return ExitCode::Config.code();
    }

    let monitor = match monitor::create(setup.settings.monitor.as_deref()) {
        Ok(monitor) => monitor,
        Err(error @ MonitorError::Unknown { .. }) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            return ExitCode::Config.code();
        }
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            return ExitCode::Monitor.code();
        }
    };

    if !setup.settings.nodaemon {
        if let Err(error) = daemonize::detach() {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: cannot daemonize: {error}");
            return ExitCode::Internal.code();
        }
    }

    let _pidfile = match &setup.settings.pidfile {
        Some(path) => match pidfile::PidFile::write(path) {
            Ok(guard) => Some(guard),
            Err(error) => {
                tracing::error!("cannot write pidfile: {error}");
                return ExitCode::Config.code();
            }
        },
        None => None,
    };

    if let Err(error) = signal::install() {
        tracing::error!("cannot install signal handlers: {error}");
        return ExitCode::Internal.code();
    }

    let status = setup
        .settings
        .status_file
        .as_ref()
        .map(|path| StatusWriter::new(path.clone(), setup.settings.status_interval));

    let mut runtime = Runtime::new(monitor, setup.syncs, crate::launch::CommandHost, status);
    if let Err(error) = runtime.start() {
        tracing::error!("startup failed: {error}");
        return ExitCode::Internal.code();
    }
    runtime.run_loop().code()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn help_flag_short_circuits() {
        let parsed = parse_args(&args(&["oc-mirrord", "-help"])).unwrap();
        assert!(matches!(parsed, ParsedCommand::Help));
    }

    #[test]
    fn version_flag_short_circuits() {
        let parsed = parse_args(&args(&["oc-mirrord", "-version"])).unwrap();
        assert!(matches!(parsed, ParsedCommand::Version));
    }

    #[test]
    fn bare_monitor_lists_facilities() {
        let parsed = parse_args(&args(&["oc-mirrord", "-monitor"])).unwrap();
        assert!(matches!(parsed, ParsedCommand::ListMonitors));
    }

    #[test]
    fn monitor_with_name_selects_it() {
        let parsed = parse_args(&args(&["oc-mirrord", "-monitor", "inotify", "-nodaemon"]))
            .unwrap();
        match parsed {
            ParsedCommand::Run(invocation) => {
                assert_eq!(invocation.monitor.as_deref(), Some("inotify"));
                assert!(invocation.nodaemon);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn rsync_inline_sync_parses() {
        let parsed = parse_args(&args(&["oc-mirrord", "-rsync", "/src", "/dst"])).unwrap();
        match parsed {
            ParsedCommand::Run(invocation) => {
                assert_eq!(
                    invocation.inline_sync,
                    Some(InlineSync::Rsync {
                        source: "/src".into(),
                        target: "/dst".into()
                    })
                );
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn rsyncssh_inline_sync_parses() {
        let parsed =
            parse_args(&args(&["oc-mirrord", "-rsyncssh", "/src", "backup", "/srv"])).unwrap();
        match parsed {
            ParsedCommand::Run(invocation) => {
                assert_eq!(
                    invocation.inline_sync,
                    Some(InlineSync::RsyncSsh {
                        source: "/src".into(),
                        host: "backup".into(),
                        target_dir: "/srv".into()
                    })
                );
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn config_file_positional_parses() {
        let parsed = parse_args(&args(&["oc-mirrord", "/etc/oc-mirrord.toml"])).unwrap();
        match parsed {
            ParsedCommand::Run(invocation) => {
                assert_eq!(
                    invocation.config_file,
                    Some(PathBuf::from("/etc/oc-mirrord.toml"))
                );
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn inline_sync_with_config_file_is_rejected() {
        let error =
            parse_args(&args(&["oc-mirrord", "-rsync", "/a", "/b", "conf.toml"])).unwrap_err();
        assert!(matches!(error, CliError::InlineAndConfig));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let error = parse_args(&args(&["oc-mirrord", "-frobnicate"])).unwrap_err();
        assert!(matches!(error, CliError::UnknownOption(_)));
    }

    #[test]
    fn missing_value_is_rejected() {
        let error = parse_args(&args(&["oc-mirrord", "-logfile"])).unwrap_err();
        assert!(matches!(error, CliError::MissingValue("-logfile")));
    }

    #[test]
    fn runner_flag_is_rejected_with_guidance() {
        let error = parse_args(&args(&["oc-mirrord", "-runner", "/x"])).unwrap_err();
        assert!(matches!(error, CliError::RunnerUnsupported));
    }

    #[test]
    fn second_positional_is_rejected() {
        let error = parse_args(&args(&["oc-mirrord", "a.toml", "b.toml"])).unwrap_err();
        assert!(matches!(error, CliError::ExtraPositional(_)));
    }

    #[test]
    fn log_categories_accumulate() {
        let parsed =
            parse_args(&args(&["oc-mirrord", "-log", "delay", "-log", "exec"])).unwrap();
        match parsed {
            ParsedCommand::Run(invocation) => assert_eq!(invocation.log, ["delay", "exec"]),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn run_help_exits_nonzero_with_usage() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(["oc-mirrord", "-help"], &mut stdout, &mut stderr);
        assert_ne!(code, 0);
        assert!(String::from_utf8(stdout).unwrap().contains("Usage"));
    }

    #[test]
    fn run_version_exits_zero() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(["oc-mirrord", "-version"], &mut stdout, &mut stderr);
        assert_eq!(code, 0);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn run_bare_monitor_lists_and_exits_nonzero() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(["oc-mirrord", "-monitor"], &mut stdout, &mut stderr);
        assert_ne!(code, 0);
        assert!(String::from_utf8(stdout).unwrap().contains("inotify"));
    }

    #[test]
    fn run_unknown_flag_reports_config_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(["oc-mirrord", "-bogus"], &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::Config.code());
        assert!(String::from_utf8(stderr).unwrap().contains("unknown option"));
    }

    #[test]
    fn run_without_config_reports_config_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(["oc-mirrord"], &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::Config.code());
    }
}
