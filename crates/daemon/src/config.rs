//! TOML configuration loading.
//!
//! A configuration file holds one optional `[settings]` table and one or
//! more `[[sync]]` tables. Command-line flags override their file
//! counterparts; `-rsync`/`-rsyncssh` replace the file entirely.

use std::path::{Path, PathBuf};

use mirror_engine::{Sync, SyncConfig};
use mirror_filters::ExcludeError;
use serde::Deserialize;
use thiserror::Error;

use crate::actions::{RsyncAction, RsyncSshAction};
use crate::cli::{InlineSync, Invocation};

/// Default aggregation window in seconds.
pub const DEFAULT_DELAY_SECS: u64 = 15;
/// Default status-file rewrite interval in seconds.
pub const DEFAULT_STATUS_INTERVAL: u64 = 10;

/// Configuration failure; always terminates the daemon before it starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither a config file nor an inline sync was given.
    #[error("no sync configured: pass a config file or -rsync/-rsyncssh")]
    NoSyncs,
    /// The config file could not be read.
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for the expected schema.
    #[error("cannot parse config file {path:?}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying TOML failure.
        source: toml::de::Error,
    },
    /// A sync source directory is missing or inaccessible.
    #[error("source of sync '{name}' is not a usable directory: {path:?} ({source})")]
    Source {
        /// Sync display name.
        name: String,
        /// Configured source path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A sync names an action this build does not provide.
    #[error("sync '{name}' uses unknown action '{action}' (expected rsync or rsyncssh)")]
    UnknownAction {
        /// Sync display name.
        name: String,
        /// Offending action name.
        action: String,
    },
    /// An rsync sync without a target, or an rsyncssh sync without
    /// host/target_dir.
    #[error("sync '{name}': {reason}")]
    Target {
        /// Sync display name.
        name: String,
        /// What is missing.
        reason: &'static str,
    },
    /// An exclude pattern or exclude file was rejected.
    #[error("sync '{name}': {source}")]
    Exclude {
        /// Sync display name.
        name: String,
        /// Underlying exclude failure.
        source: ExcludeError,
    },
}

/// Daemon-wide settings after merging file and command line.
#[derive(Clone, Debug, Default)]
pub struct GeneralSettings {
    /// Enabled log categories.
    pub log: Vec<String>,
    /// Logfile path, if logging to a file.
    pub logfile: Option<PathBuf>,
    /// Pidfile path.
    pub pidfile: Option<PathBuf>,
    /// Status file path.
    pub status_file: Option<PathBuf>,
    /// Status rewrite interval in seconds.
    pub status_interval: u64,
    /// Stay in the foreground.
    pub nodaemon: bool,
    /// Selected monitor name.
    pub monitor: Option<String>,
}

/// Everything needed to start the runtime.
pub struct DaemonSetup {
    /// Merged daemon-wide settings.
    pub settings: GeneralSettings,
    /// Fully built syncs, handlers attached.
    pub syncs: Vec<Sync>,
}

impl std::fmt::Debug for DaemonSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonSetup")
            .field("settings", &self.settings)
            .field("syncs", &self.syncs.len())
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    settings: FileSettings,
    #[serde(default, rename = "sync")]
    syncs: Vec<SyncEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    log_file: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    status_file: Option<PathBuf>,
    status_interval: Option<u64>,
    #[serde(default)]
    nodaemon: bool,
    #[serde(default)]
    log: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncEntry {
    name: Option<String>,
    action: String,
    source: PathBuf,
    target: Option<String>,
    host: Option<String>,
    target_dir: Option<String>,
    delay: Option<u64>,
    max_processes: Option<usize>,
    max_delays: Option<usize>,
    #[serde(default)]
    exclude: Vec<String>,
    exclude_from: Option<PathBuf>,
    #[serde(default)]
    rsync_opts: Vec<String>,
}

/// Loads and validates the configuration for one invocation.
pub fn load(invocation: &Invocation) -> Result<DaemonSetup, ConfigError> {
    let mut settings = GeneralSettings {
        status_interval: DEFAULT_STATUS_INTERVAL,
        ..GeneralSettings::default()
    };
    let mut syncs = Vec::new();

    if let Some(inline) = &invocation.inline_sync {
        syncs.push(build_inline(inline)?);
    } else if let Some(path) = &invocation.config_file {
        let file = read_file(path)?;
        settings.logfile = file.settings.log_file;
        settings.pidfile = file.settings.pid_file;
        settings.status_file = file.settings.status_file;
        settings.status_interval = file
            .settings
            .status_interval
            .unwrap_or(DEFAULT_STATUS_INTERVAL);
        settings.nodaemon = file.settings.nodaemon;
        settings.log = file.settings.log;
        if file.syncs.is_empty() {
            return Err(ConfigError::NoSyncs);
        }
        for entry in file.syncs {
            syncs.push(build_sync(&entry)?);
        }
    } else {
        return Err(ConfigError::NoSyncs);
    }

    // Command-line flags win over the file.
    settings.log.extend(invocation.log.iter().cloned());
    if invocation.logfile.is_some() {
        settings.logfile = invocation.logfile.clone();
    }
    if invocation.pidfile.is_some() {
        settings.pidfile = invocation.pidfile.clone();
    }
    if invocation.nodaemon {
        settings.nodaemon = true;
    }
    settings.monitor = invocation.monitor.clone();

    Ok(DaemonSetup { settings, syncs })
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn build_inline(inline: &InlineSync) -> Result<Sync, ConfigError> {
    match inline {
        InlineSync::Rsync { source, target } => {
            let entry = SyncEntry {
                name: None,
                action: "rsync".to_string(),
                source: PathBuf::from(source),
                target: Some(target.clone()),
                host: None,
                target_dir: None,
                delay: None,
                max_processes: None,
                max_delays: None,
                exclude: Vec::new(),
                exclude_from: None,
                rsync_opts: Vec::new(),
            };
            build_sync(&entry)
        }
        InlineSync::RsyncSsh {
            source,
            host,
            target_dir,
        } => {
            let entry = SyncEntry {
                name: None,
                action: "rsyncssh".to_string(),
                source: PathBuf::from(source),
                target: None,
                host: Some(host.clone()),
                target_dir: Some(target_dir.clone()),
                delay: None,
                max_processes: None,
                max_delays: None,
                exclude: Vec::new(),
                exclude_from: None,
                rsync_opts: Vec::new(),
            };
            build_sync(&entry)
        }
    }
}

fn build_sync(entry: &SyncEntry) -> Result<Sync, ConfigError> {
    let name = entry
        .name
        .clone()
        .unwrap_or_else(|| entry.source.display().to_string());

    let source = std::fs::canonicalize(&entry.source).map_err(|source| ConfigError::Source {
        name: name.clone(),
        path: entry.source.clone(),
        source,
    })?;
    let source = source.display().to_string();

    let (target, handler, on_move): (String, _, bool) = match entry.action.as_str() {
        "rsync" => {
            let target = entry.target.clone().ok_or(ConfigError::Target {
                name: name.clone(),
                reason: "rsync action requires a target",
            })?;
            let handler: Box<dyn mirror_engine::ActionHandler> =
                Box::new(RsyncAction::new(entry.rsync_opts.clone()));
            (target, handler, false)
        }
        "rsyncssh" => {
            let host = entry.host.clone().ok_or(ConfigError::Target {
                name: name.clone(),
                reason: "rsyncssh action requires a host",
            })?;
            let target_dir = entry.target_dir.clone().ok_or(ConfigError::Target {
                name: name.clone(),
                reason: "rsyncssh action requires a target_dir",
            })?;
            let handler: Box<dyn mirror_engine::ActionHandler> = Box::new(RsyncSshAction::new(
                host.clone(),
                target_dir.clone(),
                entry.rsync_opts.clone(),
            ));
            (format!("{host}:{target_dir}"), handler, true)
        }
        other => {
            return Err(ConfigError::UnknownAction {
                name,
                action: other.to_string(),
            })
        }
    };

    let config = SyncConfig::builder(&name, &source, &target)
        .delay_secs(entry.delay.unwrap_or(DEFAULT_DELAY_SECS))
        .max_processes(entry.max_processes.unwrap_or(1))
        .max_delays(entry.max_delays.unwrap_or(1_000))
        .on_move(on_move)
        .build();
    let mut sync = Sync::new(config, handler);

    for pattern in &entry.exclude {
        sync.add_exclude(pattern)
            .map_err(|source| ConfigError::Exclude {
                name: name.clone(),
                source,
            })?;
    }
    if let Some(exclude_from) = &entry.exclude_from {
        sync.load_excludes(exclude_from)
            .map_err(|source| ConfigError::Exclude {
                name: name.clone(),
                source,
            })?;
    }
    Ok(sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("oc-mirrord.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    fn invocation_for(path: PathBuf) -> Invocation {
        Invocation {
            config_file: Some(path),
            ..Invocation::default()
        }
    }

    #[test]
    fn minimal_rsync_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[[sync]]\naction = \"rsync\"\nsource = {:?}\ntarget = \"/dst\"\n",
                src
            ),
        );

        let setup = load(&invocation_for(config)).unwrap();
        assert_eq!(setup.syncs.len(), 1);
        assert_eq!(setup.settings.status_interval, DEFAULT_STATUS_INTERVAL);
        let sync_config = setup.syncs[0].config();
        assert!(sync_config.source.ends_with('/'));
        assert_eq!(sync_config.target, "/dst/");
        assert_eq!(sync_config.delay_secs, DEFAULT_DELAY_SECS);
        assert!(!sync_config.on_move);
    }

    #[test]
    fn rsyncssh_sync_enables_move_events() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[[sync]]\naction = \"rsyncssh\"\nsource = {:?}\nhost = \"backup\"\ntarget_dir = \"/srv\"\n",
                src
            ),
        );

        let setup = load(&invocation_for(config)).unwrap();
        let sync_config = setup.syncs[0].config();
        assert!(sync_config.on_move);
        assert_eq!(sync_config.target, "backup:/srv/");
    }

    #[test]
    fn settings_table_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[settings]\nstatus_interval = 30\nnodaemon = true\nlog = [\"delay\"]\n\n\
                 [[sync]]\naction = \"rsync\"\nsource = {:?}\ntarget = \"/dst\"\n",
                src
            ),
        );

        let setup = load(&invocation_for(config)).unwrap();
        assert_eq!(setup.settings.status_interval, 30);
        assert!(setup.settings.nodaemon);
        assert_eq!(setup.settings.log, ["delay"]);
    }

    #[test]
    fn cli_flags_override_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[settings]\nlog_file = \"/var/log/from-file\"\n\n\
                 [[sync]]\naction = \"rsync\"\nsource = {:?}\ntarget = \"/dst\"\n",
                src
            ),
        );

        let mut invocation = invocation_for(config);
        invocation.logfile = Some(PathBuf::from("/var/log/from-cli"));
        invocation.log.push("exec".to_string());
        let setup = load(&invocation).unwrap();
        assert_eq!(
            setup.settings.logfile,
            Some(PathBuf::from("/var/log/from-cli"))
        );
        assert_eq!(setup.settings.log, ["exec"]);
    }

    #[test]
    fn missing_source_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            &dir,
            "[[sync]]\naction = \"rsync\"\nsource = \"/definitely/not/here\"\ntarget = \"/dst\"\n",
        );
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::Source { .. }));
    }

    #[test]
    fn unknown_action_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[[sync]]\naction = \"teleport\"\nsource = {:?}\ntarget = \"/dst\"\n",
                src
            ),
        );
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::UnknownAction { .. }));
    }

    #[test]
    fn rsync_without_target_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!("[[sync]]\naction = \"rsync\"\nsource = {:?}\n", src),
        );
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::Target { .. }));
    }

    #[test]
    fn unreadable_exclude_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[[sync]]\naction = \"rsync\"\nsource = {:?}\ntarget = \"/dst\"\n\
                 exclude_from = \"/missing/excludes\"\n",
                src
            ),
        );
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::Exclude { .. }));
    }

    #[test]
    fn config_without_syncs_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(&dir, "[settings]\nnodaemon = true\n");
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::NoSyncs));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(&dir, "[[sync]]\naction = \"rsync\"\nsped = 9\n");
        let error = load(&invocation_for(config)).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn inline_rsync_builds_one_sync() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let invocation = Invocation {
            inline_sync: Some(InlineSync::Rsync {
                source: src.display().to_string(),
                target: "/dst".to_string(),
            }),
            ..Invocation::default()
        };
        let setup = load(&invocation).unwrap();
        assert_eq!(setup.syncs.len(), 1);
        assert_eq!(setup.syncs[0].config().target, "/dst/");
    }

    #[test]
    fn excludes_from_config_are_active() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = write_config(
            &dir,
            &format!(
                "[[sync]]\naction = \"rsync\"\nsource = {:?}\ntarget = \"/dst\"\n\
                 exclude = [\"*.tmp\"]\n",
                src
            ),
        );
        let setup = load(&invocation_for(config)).unwrap();
        assert!(setup.syncs[0].excludes().test("junk.tmp"));
    }
}
