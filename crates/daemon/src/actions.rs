//! Built-in action handlers driving rsync and rsync-over-ssh.
//!
//! Both handlers follow the same shape: a blanket event turns into one
//! full-tree rsync, everything else is batched and shipped as an rsync
//! filter list fed on stdin. The ssh variant additionally consumes rename
//! events whole (`mv` on the target) and turns deletions into remote `rm`.

use std::collections::BTreeSet;

use mirror_engine::{
    ActionHandler, Agent, CollectOutcome, Delay, EngineError, EventKind, Inlet, SpawnCommand,
};

/// Options prepended to every rsync invocation when the sync configures
/// none.
const DEFAULT_RSYNC_OPTS: &[&str] = &["-lts"];

fn rsync_opts(configured: &[String]) -> Vec<String> {
    if configured.is_empty() {
        DEFAULT_RSYNC_OPTS.iter().map(|s| s.to_string()).collect()
    } else {
        configured.to_vec()
    }
}

/// Builds the rsync include list covering `paths` and their ancestor
/// directories, anchored at the transfer root.
fn filter_list(paths: &[String]) -> Vec<String> {
    let mut filters = BTreeSet::new();
    for path in paths {
        if path.is_empty() {
            continue;
        }
        let trimmed = path.trim_end_matches('/');
        for (index, byte) in trimmed.bytes().enumerate() {
            if byte == b'/' {
                filters.insert(format!("/{}/", &trimmed[..index]));
            }
        }
        filters.insert(format!("/{path}"));
        if path.ends_with('/') {
            filters.insert(format!("/{path}**"));
        }
    }
    filters.into_iter().collect()
}

fn filter_payload(filters: &[String]) -> Vec<u8> {
    let mut payload = filters.join("\n").into_bytes();
    payload.push(b'\n');
    payload
}

/// Maps an rsync exit code onto a collect outcome.
fn rsync_outcome(exit_code: i32) -> CollectOutcome {
    match exit_code {
        0 => CollectOutcome::Finished,
        // Partial transfers and files vanishing mid-run resolve on the
        // next cycle.
        23 | 24 => {
            tracing::warn!("rsync reported a partial transfer (exit {exit_code})");
            CollectOutcome::Finished
        }
        1 | 2 | 4 | 25 => {
            tracing::error!("rsync failed fatally (exit {exit_code})");
            CollectOutcome::Die
        }
        3 | 5 | 6 | 10 | 11 | 12 | 13 | 14 | 20 | 21 | 22 | 30 | 35 => {
            tracing::warn!("rsync failed transiently (exit {exit_code}), retrying");
            CollectOutcome::Again
        }
        other => {
            tracing::error!("rsync exited with unexpected code {other}");
            CollectOutcome::Die
        }
    }
}

/// Maps an ssh exit code onto a collect outcome.
fn ssh_outcome(exit_code: i32) -> CollectOutcome {
    match exit_code {
        0 => CollectOutcome::Finished,
        255 => {
            tracing::warn!("ssh connection failed, retrying");
            CollectOutcome::Again
        }
        other => {
            tracing::error!("remote command failed (exit {other})");
            CollectOutcome::Die
        }
    }
}

/// Mirrors a source tree with plain rsync invocations.
pub struct RsyncAction {
    opts: Vec<String>,
}

impl RsyncAction {
    /// Creates the handler; empty `opts` select the defaults.
    #[must_use]
    pub fn new(opts: Vec<String>) -> Self {
        Self {
            opts: rsync_opts(&opts),
        }
    }

    fn full_transfer(&self, inlet: &Inlet<'_>) -> SpawnCommand {
        let config = inlet.config();
        SpawnCommand::new("rsync")
            .args(self.opts.iter().cloned())
            .arg("-r")
            .arg("--delete")
            .arg(&config.source)
            .arg(&config.target)
    }

    fn batch_transfer(&self, inlet: &Inlet<'_>, paths: &[String]) -> SpawnCommand {
        let config = inlet.config();
        SpawnCommand::new("rsync")
            .args(self.opts.iter().cloned())
            .arg("-r")
            .arg("--delete")
            .arg("--force")
            .arg("--include-from=-")
            .arg("--exclude=*")
            .arg(&config.source)
            .arg(&config.target)
            .stdin(filter_payload(&filter_list(paths)))
    }
}

impl ActionHandler for RsyncAction {
    fn action(&mut self, inlet: &mut Inlet<'_>) -> Result<(), EngineError> {
        let Some(event) = inlet.get_event() else {
            return Ok(());
        };
        if event.kind() == EventKind::Blanket {
            let command = self.full_transfer(inlet);
            inlet.spawn(&Agent::Event(event), command)?;
            return Ok(());
        }
        let not_blanket = |delay: &Delay| delay.kind() != EventKind::Blanket;
        let events = inlet.get_events(Some(&not_blanket));
        if events.is_empty() {
            return Ok(());
        }
        let command = self.batch_transfer(inlet, &events.paths());
        inlet.spawn(&Agent::List(events), command)?;
        Ok(())
    }

    fn collect(&mut self, _agent: &Agent, exit_code: i32) -> CollectOutcome {
        rsync_outcome(exit_code)
    }
}

/// Mirrors a source tree to a remote host, using ssh for renames and
/// deletions and rsync for content.
pub struct RsyncSshAction {
    host: String,
    target_dir: String,
    opts: Vec<String>,
}

impl RsyncSshAction {
    /// Creates the handler; `target_dir` is the absolute directory on
    /// `host`.
    #[must_use]
    pub fn new(host: String, target_dir: String, opts: Vec<String>) -> Self {
        let target_dir = if target_dir.ends_with('/') {
            target_dir
        } else {
            format!("{target_dir}/")
        };
        Self {
            host,
            target_dir,
            opts: rsync_opts(&opts),
        }
    }

    fn remote_pathname(&self, relative: &str) -> String {
        format!("{}{}", self.target_dir, relative.trim_end_matches('/'))
    }
}

impl ActionHandler for RsyncSshAction {
    fn action(&mut self, inlet: &mut Inlet<'_>) -> Result<(), EngineError> {
        let Some(event) = inlet.get_event() else {
            return Ok(());
        };
        match event.kind() {
            EventKind::Blanket => {
                let config = inlet.config();
                let command = SpawnCommand::new("rsync")
                    .args(self.opts.iter().cloned())
                    .arg("-r")
                    .arg("--delete")
                    .arg(&config.source)
                    .arg(&config.target);
                inlet.spawn(&Agent::Event(event), command)?;
            }
            EventKind::Move => {
                let origin = self.remote_pathname(event.path());
                let destination = self.remote_pathname(event.path2().unwrap_or_default());
                let command = SpawnCommand::new("ssh")
                    .arg(&self.host)
                    .arg("mv")
                    .arg(origin)
                    .arg(destination);
                inlet.spawn(&Agent::Event(event), command)?;
            }
            EventKind::Delete => {
                let deletes = |delay: &Delay| delay.kind() == EventKind::Delete;
                let events = inlet.get_events(Some(&deletes));
                if events.is_empty() {
                    return Ok(());
                }
                let mut command = SpawnCommand::new("ssh").arg(&self.host).arg("rm").arg("-rf");
                for path in events.paths() {
                    command = command.arg(self.remote_pathname(&path));
                }
                inlet.spawn(&Agent::List(events), command)?;
            }
            _ => {
                let content = |delay: &Delay| {
                    matches!(
                        delay.kind(),
                        EventKind::Attrib | EventKind::Create | EventKind::Modify
                    )
                };
                let events = inlet.get_events(Some(&content));
                if events.is_empty() {
                    return Ok(());
                }
                let config = inlet.config();
                let command = SpawnCommand::new("rsync")
                    .args(self.opts.iter().cloned())
                    .arg("-r")
                    .arg("--include-from=-")
                    .arg("--exclude=*")
                    .arg(&config.source)
                    .arg(&config.target)
                    .stdin(filter_payload(&filter_list(&events.paths())));
                inlet.spawn(&Agent::List(events), command)?;
            }
        }
        Ok(())
    }

    fn collect(&mut self, agent: &Agent, exit_code: i32) -> CollectOutcome {
        let via_ssh = match agent {
            Agent::Event(event) => event.kind() == EventKind::Move,
            Agent::List(list) => list
                .entries()
                .next()
                .is_some_and(|(kind, _, _)| kind == EventKind::Delete),
        };
        if via_ssh {
            ssh_outcome(exit_code)
        } else {
            rsync_outcome(exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::Ticks;
    use mirror_engine::test_support::RecordingHost;
    use mirror_engine::{Sync, SyncConfig};

    fn now() -> Ticks {
        Ticks::from_millis(1_000)
    }

    fn rsync_sync() -> Sync {
        let config = SyncConfig::builder("docs", "/src", "/dst")
            .delay_secs(0)
            .build();
        Sync::new(config, Box::new(RsyncAction::new(Vec::new())))
    }

    fn rsyncssh_sync() -> Sync {
        let config = SyncConfig::builder("docs", "/src", "backup:/srv")
            .delay_secs(0)
            .on_move(true)
            .build();
        Sync::new(
            config,
            Box::new(RsyncSshAction::new(
                "backup".to_string(),
                "/srv".to_string(),
                Vec::new(),
            )),
        )
    }

    #[test]
    fn filter_list_includes_ancestors() {
        let filters = filter_list(&["a/b/c".to_string()]);
        assert_eq!(filters, ["/a/", "/a/b/", "/a/b/c"]);
    }

    #[test]
    fn filter_list_covers_directory_contents() {
        let filters = filter_list(&["d/".to_string()]);
        assert_eq!(filters, ["/d/", "/d/**"]);
    }

    #[test]
    fn filter_list_deduplicates_shared_ancestors() {
        let filters = filter_list(&["a/x".to_string(), "a/y".to_string()]);
        assert_eq!(filters, ["/a/", "/a/x", "/a/y"]);
    }

    #[test]
    fn blanket_spawns_full_tree_rsync() {
        let mut sync = rsync_sync();
        let mut host = RecordingHost::new();
        sync.add_blanket_delay(now());
        sync.invoke_actions(now(), &mut host).unwrap();

        let record = host.last().expect("one spawn");
        assert_eq!(record.binary, "rsync");
        assert_eq!(
            record.args,
            ["-lts", "-r", "--delete", "/src/", "/dst/"]
        );
        assert!(record.stdin.is_none());
    }

    #[test]
    fn batch_spawns_rsync_with_filter_stdin() {
        let mut sync = rsync_sync();
        let mut host = RecordingHost::new();
        sync.delay(EventKind::Create, Some(now()), now(), "a/f".into(), None);
        sync.delay(EventKind::Modify, Some(now()), now(), "g".into(), None);
        sync.invoke_actions(now(), &mut host).unwrap();

        let record = host.last().expect("one spawn");
        assert_eq!(record.binary, "rsync");
        assert!(record.args.contains(&"--include-from=-".to_string()));
        assert!(record.args.contains(&"--exclude=*".to_string()));
        let stdin = String::from_utf8(record.stdin.clone().unwrap()).unwrap();
        assert_eq!(stdin, "/a/\n/a/f\n/g\n");
    }

    #[test]
    fn rsync_success_empties_the_fifo() {
        let mut sync = rsync_sync();
        let mut host = RecordingHost::new();
        sync.add_blanket_delay(now());
        sync.invoke_actions(now(), &mut host).unwrap();

        let pid = host.last().unwrap().pid;
        assert_eq!(
            sync.collect(pid, 0, now()),
            mirror_engine::CollectResult::Handled
        );
        assert_eq!(sync.queue_len(), 0);
    }

    #[test]
    fn rsync_outcome_maps_exit_codes() {
        assert_eq!(rsync_outcome(0), CollectOutcome::Finished);
        assert_eq!(rsync_outcome(5), CollectOutcome::Again);
        assert_eq!(rsync_outcome(30), CollectOutcome::Again);
        assert_eq!(rsync_outcome(23), CollectOutcome::Finished);
        assert_eq!(rsync_outcome(24), CollectOutcome::Finished);
        assert_eq!(rsync_outcome(1), CollectOutcome::Die);
        assert_eq!(rsync_outcome(99), CollectOutcome::Die);
    }

    #[test]
    fn retry_cycle_requeues_and_retries() {
        let mut sync = rsync_sync();
        let mut host = RecordingHost::new();
        sync.delay(EventKind::Modify, Some(now()), now(), "f".into(), None);
        sync.invoke_actions(now(), &mut host).unwrap();
        let pid = host.last().unwrap().pid;

        // Transient rsync failure: the delay returns to wait with a
        // one-second floor and runs again on the next cycle.
        sync.collect(pid, 5, now());
        assert_eq!(sync.queue_len(), 1);
        assert_eq!(sync.process_count(), 0);

        let retry_at = now().add_secs(1);
        sync.invoke_actions(retry_at, &mut host).unwrap();
        assert_eq!(host.spawned.len(), 2);
    }

    #[test]
    fn ssh_move_spawns_remote_mv() {
        let mut sync = rsyncssh_sync();
        let mut host = RecordingHost::new();
        sync.delay(
            EventKind::Move,
            Some(now()),
            now(),
            "old.txt".into(),
            Some("new.txt".into()),
        );
        sync.invoke_actions(now(), &mut host).unwrap();

        let record = host.last().expect("one spawn");
        assert_eq!(record.binary, "ssh");
        assert_eq!(
            record.args,
            ["backup", "mv", "/srv/old.txt", "/srv/new.txt"]
        );
    }

    #[test]
    fn ssh_deletes_are_batched_into_remote_rm() {
        let mut sync = rsyncssh_sync();
        let mut host = RecordingHost::new();
        sync.delay(EventKind::Delete, Some(now()), now(), "a".into(), None);
        sync.delay(EventKind::Delete, Some(now()), now(), "d/".into(), None);
        sync.invoke_actions(now(), &mut host).unwrap();

        let record = host.last().expect("one spawn");
        assert_eq!(record.binary, "ssh");
        assert_eq!(record.args[..3], ["backup", "rm", "-rf"]);
        assert!(record.args.contains(&"/srv/a".to_string()));
        assert!(record.args.contains(&"/srv/d".to_string()));
    }

    #[test]
    fn ssh_content_changes_go_through_rsync() {
        let mut sync = rsyncssh_sync();
        let mut host = RecordingHost::new();
        sync.delay(EventKind::Modify, Some(now()), now(), "f".into(), None);
        sync.invoke_actions(now(), &mut host).unwrap();

        let record = host.last().expect("one spawn");
        assert_eq!(record.binary, "rsync");
        assert!(record.args.contains(&"backup:/srv/".to_string()));
    }

    #[test]
    fn ssh_outcome_retries_on_connection_loss() {
        assert_eq!(ssh_outcome(0), CollectOutcome::Finished);
        assert_eq!(ssh_outcome(255), CollectOutcome::Again);
        assert_eq!(ssh_outcome(12), CollectOutcome::Die);
    }
}
