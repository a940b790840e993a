//! The per-sync delay FIFO.
//!
//! Delays live in a `BTreeMap` keyed by their monotonically increasing id;
//! since the FIFO is append-only at the tail, id order is insertion order
//! and removal by identity stays cheap. The collapse scan walks the map in
//! reverse.

use std::collections::{BTreeMap, HashSet};

use mirror_core::{Deadline, Ticks};
use mirror_filters::Excludes;
use mirror_logging::mirror_debug;

use crate::collapse::{default_decision, CollapseDecision, CollapseFn};
use crate::delay::{Delay, DelayId, DelayStatus};
use crate::event::EventKind;

/// Insertion-ordered list of pending changes with collapse folding.
#[derive(Debug)]
pub struct DelayQueue {
    delays: BTreeMap<DelayId, Delay>,
    next_id: u64,
    delay_secs: u64,
    max_delays: usize,
}

impl DelayQueue {
    /// Creates an empty queue. `delay_secs` is the aggregation window added
    /// to event timestamps; `max_delays` the saturation bound past which the
    /// alarm gate is bypassed.
    #[must_use]
    pub fn new(delay_secs: u64, max_delays: usize) -> Self {
        Self {
            delays: BTreeMap::new(),
            next_id: 1,
            delay_secs,
            max_delays,
        }
    }

    /// Files one observed change into the queue.
    ///
    /// Applies, in order: the exclusion filter (with partial-exclusion
    /// conversion for renames), rename decomposition when the sync did not
    /// opt into move events, alarm assignment, the blanket short-circuit,
    /// and the tail-to-head collapse scan. `time` is the kernel timestamp
    /// of the observation; an absent timestamp schedules the delay at `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        kind: EventKind,
        time: Option<Ticks>,
        now: Ticks,
        path: String,
        path2: Option<String>,
        excludes: &Excludes,
        on_move: bool,
        collapse_override: Option<&CollapseFn>,
    ) {
        if kind != EventKind::Blanket {
            if kind == EventKind::Move {
                let dest = path2.clone().unwrap_or_default();
                let origin_excluded = excludes.test(&path);
                let dest_excluded = excludes.test(&dest);
                if origin_excluded && dest_excluded {
                    mirror_debug!(Delay, "excluded move: {path} -> {dest}");
                    return;
                }
                if dest_excluded {
                    self.push(
                        EventKind::Delete,
                        time,
                        now,
                        path,
                        None,
                        excludes,
                        on_move,
                        collapse_override,
                    );
                    return;
                }
                if origin_excluded {
                    self.push(
                        EventKind::Create,
                        time,
                        now,
                        dest,
                        None,
                        excludes,
                        on_move,
                        collapse_override,
                    );
                    return;
                }
            } else if excludes.test(&path) {
                mirror_debug!(Delay, "excluded: {path}");
                return;
            }
        }

        if kind == EventKind::Move && !on_move {
            let dest = path2.unwrap_or_default();
            self.push(
                EventKind::Delete,
                time,
                now,
                path,
                None,
                excludes,
                on_move,
                collapse_override,
            );
            self.push(
                EventKind::Create,
                time,
                now,
                dest,
                None,
                excludes,
                on_move,
                collapse_override,
            );
            return;
        }

        let alarm = if kind == EventKind::Blanket {
            Deadline::Immediate
        } else {
            let at = match time {
                Some(time) => {
                    let at = time.add_secs(self.delay_secs);
                    if at.before(now) {
                        now
                    } else {
                        at
                    }
                }
                None => now,
            };
            Deadline::At(at)
        };

        if kind == EventKind::Blanket {
            let tail = self.delays.keys().next_back().copied();
            let status = match tail {
                Some(_) => DelayStatus::Block,
                None => DelayStatus::Wait,
            };
            let id = self.append(kind, alarm, path, path2, status);
            if let Some(tail_id) = tail {
                if let Some(tail_delay) = self.delays.get_mut(&tail_id) {
                    tail_delay.blocks.push(id);
                }
                mirror_debug!(Delay, "blanket {id} stacked on {tail_id}");
            }
            return;
        }

        let candidate = Delay {
            id: DelayId(self.next_id),
            kind,
            alarm,
            path,
            path2,
            status: DelayStatus::Wait,
            blocks: Vec::new(),
        };

        let scan: Vec<DelayId> = self.delays.keys().rev().copied().collect();
        for old_id in scan {
            let Some(old) = self.delays.get(&old_id) else {
                continue;
            };
            if old.kind == EventKind::Blanket {
                self.stack(old_id, candidate);
                return;
            }
            let decision = collapse_override
                .and_then(|collapse| collapse(old, &candidate))
                .or_else(|| default_decision(old, &candidate));
            let Some(decision) = decision else {
                continue;
            };
            mirror_debug!(
                Collapse,
                "{:?}: {} {} vs {} {}",
                decision,
                old.kind,
                old.path,
                candidate.kind,
                candidate.path
            );
            match decision {
                CollapseDecision::Nullify => {
                    if let Some(old) = self.delays.get_mut(&old_id) {
                        old.kind = EventKind::None;
                    }
                    self.remove(old_id);
                    return;
                }
                CollapseDecision::Absorb => return,
                CollapseDecision::Replace => {
                    self.replace(old_id, candidate);
                    return;
                }
                CollapseDecision::Stack => {
                    self.stack(old_id, candidate);
                    return;
                }
            }
        }

        let id = self.append_delay(candidate);
        mirror_debug!(Delay, "queued {id}");
    }

    /// Removes a delay by identity, waking every delay it was holding back.
    pub fn remove(&mut self, id: DelayId) -> Option<Delay> {
        let mut removed = self.delays.remove(&id)?;
        removed.status = DelayStatus::Done;
        for blocked in &removed.blocks {
            if let Some(delay) = self.delays.get_mut(blocked) {
                if delay.status == DelayStatus::Block {
                    delay.status = DelayStatus::Wait;
                    mirror_debug!(Delay, "released {blocked}");
                }
            }
        }
        Some(removed)
    }

    /// Alarm of the frontmost waiting delay.
    #[must_use]
    pub fn first_wait_alarm(&self) -> Option<Deadline> {
        self.delays
            .values()
            .find(|delay| delay.status == DelayStatus::Wait)
            .map(Delay::alarm)
    }

    /// The frontmost waiting delay that may run at `now`.
    ///
    /// While the queue holds fewer than `max_delays` entries the alarm gate
    /// applies: a frontmost wait whose alarm lies in the future stops the
    /// search, since later waits are no earlier. At saturation the gate is
    /// bypassed.
    #[must_use]
    pub fn next_ready(&self, now: Ticks) -> Option<DelayId> {
        let saturated = self.delays.len() >= self.max_delays;
        let first = self
            .delays
            .values()
            .find(|delay| delay.status == DelayStatus::Wait)?;
        if saturated || first.alarm.is_due(now) {
            Some(first.id)
        } else {
            None
        }
    }

    /// Collects the batch of delays that are not active, satisfy the
    /// predicate, and are not transitively blocked by any delay outside the
    /// batch.
    #[must_use]
    pub fn ready_batch(&self, predicate: Option<&dyn Fn(&Delay) -> bool>) -> Vec<DelayId> {
        let mut blocked: HashSet<DelayId> = HashSet::new();
        let mut batch = Vec::new();
        for delay in self.delays.values() {
            let selected = !blocked.contains(&delay.id)
                && delay.status != DelayStatus::Active
                && predicate.map_or(true, |predicate| predicate(delay));
            if selected {
                batch.push(delay.id);
            } else {
                blocked.extend(delay.blocks.iter().copied());
            }
        }
        batch
    }

    /// Looks up a delay by id.
    #[must_use]
    pub fn get(&self, id: DelayId) -> Option<&Delay> {
        self.delays.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: DelayId) -> Option<&mut Delay> {
        self.delays.get_mut(&id)
    }

    /// Number of queued delays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delays.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Iterates delays head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Delay> {
        self.delays.values()
    }

    fn replace(&mut self, old_id: DelayId, candidate: Delay) {
        let Some(old) = self.delays.get_mut(&old_id) else {
            return;
        };
        if old.kind == EventKind::Move {
            // A superseded rename keeps its deletion half in place; the new
            // change is queued behind it.
            old.kind = EventKind::Delete;
            old.path2 = None;
            let id = self.append_delay(candidate);
            mirror_debug!(Delay, "rename degenerated, queued {id}");
        } else if candidate.kind == EventKind::Move {
            assert_eq!(
                Some(old.path.as_str()),
                candidate.path2.as_deref(),
                "collapse replace with mismatched paths"
            );
            old.kind = EventKind::Move;
            old.path = candidate.path;
            old.path2 = candidate.path2;
        } else {
            assert_eq!(
                old.path, candidate.path,
                "collapse replace with mismatched paths"
            );
            old.kind = candidate.kind;
        }
    }

    fn stack(&mut self, old_id: DelayId, mut candidate: Delay) {
        candidate.status = DelayStatus::Block;
        let id = self.append_delay(candidate);
        if let Some(old) = self.delays.get_mut(&old_id) {
            old.blocks.push(id);
        }
        mirror_debug!(Delay, "stacked {id} on {old_id}");
    }

    fn append(
        &mut self,
        kind: EventKind,
        alarm: Deadline,
        path: String,
        path2: Option<String>,
        status: DelayStatus,
    ) -> DelayId {
        self.append_delay(Delay {
            id: DelayId(0),
            kind,
            alarm,
            path,
            path2,
            status,
            blocks: Vec::new(),
        })
    }

    fn append_delay(&mut self, mut delay: Delay) -> DelayId {
        let id = DelayId(self.next_id);
        self.next_id += 1;
        delay.id = id;
        self.delays.insert(id, delay);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> DelayQueue {
        DelayQueue::new(15, 1_000)
    }

    fn now() -> Ticks {
        Ticks::from_millis(1_000)
    }

    fn push(queue: &mut DelayQueue, kind: EventKind, path: &str) {
        let excludes = Excludes::new();
        queue.push(
            kind,
            Some(now()),
            now(),
            path.to_string(),
            None,
            &excludes,
            false,
            None,
        );
    }

    fn push_move(queue: &mut DelayQueue, from: &str, to: &str, on_move: bool) {
        let excludes = Excludes::new();
        queue.push(
            EventKind::Move,
            Some(now()),
            now(),
            from.to_string(),
            Some(to.to_string()),
            &excludes,
            on_move,
            None,
        );
    }

    fn kinds(queue: &DelayQueue) -> Vec<EventKind> {
        queue.iter().map(Delay::kind).collect()
    }

    #[test]
    fn create_then_delete_cancels_out() {
        let mut queue = queue();
        push(&mut queue, EventKind::Create, "f");
        push(&mut queue, EventKind::Delete, "f");
        assert!(queue.is_empty());
    }

    #[test]
    fn attrib_then_modify_leaves_one_modify() {
        let mut queue = queue();
        push(&mut queue, EventKind::Attrib, "f");
        push(&mut queue, EventKind::Modify, "f");
        assert_eq!(kinds(&queue), [EventKind::Modify]);
    }

    #[test]
    fn burst_collapses_to_the_first_create() {
        let mut queue = queue();
        push(&mut queue, EventKind::Create, "f");
        push(&mut queue, EventKind::Modify, "f");
        push(&mut queue, EventKind::Modify, "f");
        assert_eq!(kinds(&queue), [EventKind::Create]);
    }

    #[test]
    fn delete_then_create_keeps_both_in_order() {
        let mut queue = queue();
        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0].kind(), EventKind::Delete);
        assert_eq!(delays[0].status(), DelayStatus::Wait);
        assert_eq!(delays[1].kind(), EventKind::Create);
        assert_eq!(delays[1].status(), DelayStatus::Block);
        assert_eq!(delays[0].blocks(), [delays[1].id()]);
    }

    #[test]
    fn unrelated_paths_do_not_collapse() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "a");
        push(&mut queue, EventKind::Modify, "b");
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|d| d.status() == DelayStatus::Wait));
    }

    #[test]
    fn directory_delete_stacks_behind_child_change() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "d/f");
        push(&mut queue, EventKind::Delete, "d/");
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[1].kind(), EventKind::Delete);
        assert_eq!(delays[1].status(), DelayStatus::Block);

        let first = delays[0].id();
        queue.remove(first);
        let remaining: Vec<_> = queue.iter().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status(), DelayStatus::Wait);
    }

    #[test]
    fn move_without_opt_in_decomposes() {
        let mut queue = queue();
        push_move(&mut queue, "a", "b", false);
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0].kind(), EventKind::Delete);
        assert_eq!(delays[0].path(), "a");
        assert_eq!(delays[1].kind(), EventKind::Create);
        assert_eq!(delays[1].path(), "b");
    }

    #[test]
    fn move_with_opt_in_stays_whole() {
        let mut queue = queue();
        push_move(&mut queue, "a", "b", true);
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].kind(), EventKind::Move);
        assert_eq!(delays[0].path(), "a");
        assert_eq!(delays[0].path2(), Some("b"));
    }

    #[test]
    fn move_with_excluded_destination_becomes_delete() {
        let mut excludes = Excludes::new();
        excludes.add("b").unwrap();
        let mut queue = queue();
        queue.push(
            EventKind::Move,
            Some(now()),
            now(),
            "a".to_string(),
            Some("b".to_string()),
            &excludes,
            true,
            None,
        );
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].kind(), EventKind::Delete);
        assert_eq!(delays[0].path(), "a");
        assert_eq!(delays[0].path2(), None);
    }

    #[test]
    fn move_with_excluded_origin_becomes_create() {
        let mut excludes = Excludes::new();
        excludes.add("a").unwrap();
        let mut queue = queue();
        queue.push(
            EventKind::Move,
            Some(now()),
            now(),
            "a".to_string(),
            Some("b".to_string()),
            &excludes,
            true,
            None,
        );
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].kind(), EventKind::Create);
        assert_eq!(delays[0].path(), "b");
    }

    #[test]
    fn move_with_both_sides_excluded_is_dropped() {
        let mut excludes = Excludes::new();
        excludes.add("a").unwrap();
        excludes.add("b").unwrap();
        let mut queue = queue();
        queue.push(
            EventKind::Move,
            Some(now()),
            now(),
            "a".to_string(),
            Some("b".to_string()),
            &excludes,
            true,
            None,
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn excluded_path_never_enters() {
        let mut excludes = Excludes::new();
        excludes.add("*.tmp").unwrap();
        let mut queue = queue();
        queue.push(
            EventKind::Create,
            Some(now()),
            now(),
            "scratch.tmp".to_string(),
            None,
            &excludes,
            false,
            None,
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn alarm_is_event_time_plus_window() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "f");
        let delay = queue.iter().next().unwrap();
        assert_eq!(delay.alarm(), Deadline::At(now().add_secs(15)));
    }

    #[test]
    fn alarm_never_lies_in_the_past() {
        let mut queue = DelayQueue::new(0, 1_000);
        let excludes = Excludes::new();
        let stale = Ticks::from_millis(10);
        queue.push(
            EventKind::Modify,
            Some(stale),
            now(),
            "f".to_string(),
            None,
            &excludes,
            false,
            None,
        );
        let delay = queue.iter().next().unwrap();
        assert_eq!(delay.alarm(), Deadline::At(now()));
    }

    #[test]
    fn missing_timestamp_schedules_at_now() {
        let mut queue = queue();
        let excludes = Excludes::new();
        queue.push(
            EventKind::Modify,
            None,
            now(),
            "f".to_string(),
            None,
            &excludes,
            false,
            None,
        );
        assert_eq!(queue.iter().next().unwrap().alarm(), Deadline::At(now()));
    }

    #[test]
    fn blanket_goes_immediate_and_blocks_later_delays() {
        let mut queue = queue();
        let excludes = Excludes::new();
        queue.push(
            EventKind::Blanket,
            None,
            now(),
            String::new(),
            None,
            &excludes,
            false,
            None,
        );
        let blanket = queue.iter().next().unwrap();
        assert_eq!(blanket.alarm(), Deadline::Immediate);
        assert_eq!(blanket.status(), DelayStatus::Wait);

        push(&mut queue, EventKind::Create, "f");
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[1].status(), DelayStatus::Block);
        assert_eq!(delays[0].blocks(), [delays[1].id()]);
    }

    #[test]
    fn blanket_stacks_behind_existing_tail() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "f");
        let excludes = Excludes::new();
        queue.push(
            EventKind::Blanket,
            None,
            now(),
            String::new(),
            None,
            &excludes,
            false,
            None,
        );
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays[1].kind(), EventKind::Blanket);
        assert_eq!(delays[1].status(), DelayStatus::Block);
        assert_eq!(delays[0].blocks(), [delays[1].id()]);
    }

    #[test]
    fn removing_the_blanket_releases_everything_it_held() {
        let mut queue = queue();
        let excludes = Excludes::new();
        queue.push(
            EventKind::Blanket,
            None,
            now(),
            String::new(),
            None,
            &excludes,
            false,
            None,
        );
        push(&mut queue, EventKind::Create, "a");
        push(&mut queue, EventKind::Create, "b");
        let blanket_id = queue.iter().next().unwrap().id();
        queue.remove(blanket_id);
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|d| d.status() == DelayStatus::Wait));
    }

    #[test]
    fn active_delay_is_not_mutated_by_collapse() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "f");
        let id = queue.iter().next().unwrap().id();
        queue.get_mut(id).unwrap().status = DelayStatus::Active;

        push(&mut queue, EventKind::Delete, "f");
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0].kind(), EventKind::Modify);
        assert_eq!(delays[1].kind(), EventKind::Delete);
        assert_eq!(delays[1].status(), DelayStatus::Block);
    }

    #[test]
    fn move_destination_overwritten_by_new_create() {
        let mut queue = queue();
        push_move(&mut queue, "a", "b", true);
        push(&mut queue, EventKind::Create, "b");
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 2);
        assert_eq!(delays[0].kind(), EventKind::Delete);
        assert_eq!(delays[0].path(), "a");
        assert_eq!(delays[0].path2(), None);
        assert_eq!(delays[1].kind(), EventKind::Create);
        assert_eq!(delays[1].path(), "b");
    }

    #[test]
    fn new_move_replaces_queued_create_at_destination() {
        let mut queue = queue();
        push(&mut queue, EventKind::Create, "b");
        push_move(&mut queue, "a", "b", true);
        let delays: Vec<_> = queue.iter().collect();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].kind(), EventKind::Move);
        assert_eq!(delays[0].path(), "a");
        assert_eq!(delays[0].path2(), Some("b"));
    }

    #[test]
    #[should_panic(expected = "mismatched paths")]
    fn replace_across_differing_paths_aborts() {
        let mut queue = queue();
        push(&mut queue, EventKind::Attrib, "a");
        let override_fn =
            |_: &Delay, _: &Delay| -> Option<CollapseDecision> { Some(CollapseDecision::Replace) };
        let excludes = Excludes::new();
        queue.push(
            EventKind::Modify,
            Some(now()),
            now(),
            "b".to_string(),
            None,
            &excludes,
            false,
            Some(&override_fn),
        );
    }

    #[test]
    fn collapse_override_wins_over_table() {
        let mut queue = queue();
        push(&mut queue, EventKind::Create, "f");
        // The table would nullify create+delete; the override stacks.
        let override_fn =
            |_: &Delay, _: &Delay| -> Option<CollapseDecision> { Some(CollapseDecision::Stack) };
        let excludes = Excludes::new();
        queue.push(
            EventKind::Delete,
            Some(now()),
            now(),
            "f".to_string(),
            None,
            &excludes,
            false,
            Some(&override_fn),
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn next_ready_honors_the_alarm_gate() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "f");
        assert_eq!(queue.next_ready(now()), None);
        let later = now().add_secs(15);
        assert!(queue.next_ready(later).is_some());
    }

    #[test]
    fn next_ready_stops_at_the_first_wait() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "early");
        push(&mut queue, EventKind::Modify, "late");
        // Both alarms in the future: nothing is ready even though a later
        // delay exists.
        assert_eq!(queue.next_ready(now()), None);
    }

    #[test]
    fn saturated_queue_ignores_alarm_gate() {
        let mut queue = DelayQueue::new(15, 2);
        push(&mut queue, EventKind::Modify, "a");
        push(&mut queue, EventKind::Modify, "b");
        // Alarms lie 15s in the future, but the queue is saturated.
        let ready = queue.next_ready(now()).expect("gate bypassed");
        assert_eq!(queue.get(ready).unwrap().path(), "a");
    }

    #[test]
    fn first_wait_alarm_skips_blocked_delays() {
        let mut queue = queue();
        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        let first = queue.first_wait_alarm().expect("one wait delay");
        assert_eq!(first, Deadline::At(now().add_secs(15)));

        let head = queue.iter().next().unwrap().id();
        queue.get_mut(head).unwrap().status = DelayStatus::Active;
        assert_eq!(queue.first_wait_alarm(), None);
    }

    #[test]
    fn ready_batch_excludes_active_and_their_dependents() {
        let mut queue = queue();
        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        push(&mut queue, EventKind::Modify, "g");

        let head = queue.iter().next().unwrap().id();
        queue.get_mut(head).unwrap().status = DelayStatus::Active;

        let batch = queue.ready_batch(None);
        let paths: Vec<_> = batch
            .iter()
            .map(|id| queue.get(*id).unwrap().path())
            .collect();
        assert_eq!(paths, ["g"]);
    }

    #[test]
    fn ready_batch_includes_delays_blocked_by_batch_members() {
        let mut queue = queue();
        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        let batch = queue.ready_batch(None);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn ready_batch_blocking_is_transitive() {
        let mut queue = queue();
        push(&mut queue, EventKind::Modify, "f");
        let head = queue.iter().next().unwrap().id();
        queue.get_mut(head).unwrap().status = DelayStatus::Active;

        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        assert_eq!(queue.len(), 3);

        // The delete is stacked on the active modify and the create on the
        // delete; neither may run while the modify is in flight.
        let batch = queue.ready_batch(None);
        assert!(batch.is_empty());
    }

    #[test]
    fn ready_batch_predicate_rejection_blocks_dependents() {
        let mut queue = queue();
        push(&mut queue, EventKind::Delete, "f");
        push(&mut queue, EventKind::Create, "f");
        let not_deletes = |delay: &Delay| delay.kind() != EventKind::Delete;
        let batch = queue.ready_batch(Some(&not_deletes));
        assert!(batch.is_empty(), "create stays blocked by rejected delete");
    }

    #[test]
    fn consecutive_same_path_pairs_always_collapse() {
        // After any two-event sequence on one path, the FIFO never retains
        // a foldable adjacent pair.
        let kinds = [
            EventKind::Attrib,
            EventKind::Create,
            EventKind::Modify,
            EventKind::Delete,
        ];
        for first in kinds {
            for second in kinds {
                let mut queue = queue();
                push(&mut queue, first, "f");
                push(&mut queue, second, "f");
                let delays: Vec<_> = queue.iter().collect();
                if delays.len() == 2 {
                    assert_eq!(
                        default_decision(delays[0], delays[1]),
                        Some(CollapseDecision::Stack),
                        "{first}+{second} left a foldable pair"
                    );
                }
            }
        }
    }
}
