//! Rules for folding a freshly observed change into an already queued one.
//!
//! The collapse scan walks the FIFO tail to head and asks, for every queued
//! delay, whether the new delay is redundant with it, supersedes it, or must
//! wait behind it. Rename delays contribute two path-bearing sub-events
//! (origin and destination) which are compared pairwise.

use crate::delay::{Delay, DelayStatus};
use crate::event::EventKind;

/// Outcome of comparing a queued delay against a new one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollapseDecision {
    /// The two cancel out: drop both (a create followed by its delete).
    Nullify,
    /// The old delay already covers the new one: drop the new one.
    Absorb,
    /// The new change supersedes the old one in place.
    Replace,
    /// The new delay must wait until the old one is gone.
    Stack,
}

/// User-supplied collapse override, consulted before the default table.
/// Returning `None` falls through to the default rules.
pub type CollapseFn = dyn Fn(&Delay, &Delay) -> Option<CollapseDecision> + Send;

/// Row/column index into the collapse table. Renames are split into their
/// origin and destination halves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Part {
    Attrib,
    Modify,
    Create,
    Delete,
    MoveFr,
    MoveTo,
}

/// The default collapse table. Rows are the queued delay, columns the new
/// one.
const fn table(old: Part, new: Part) -> CollapseDecision {
    use CollapseDecision::{Absorb, Nullify, Replace, Stack};
    use Part::{Attrib, Create, Delete, Modify, MoveFr, MoveTo};
    match (old, new) {
        (Attrib, Attrib) => Absorb,
        (Attrib, Modify | Create | Delete | MoveTo) => Replace,
        (Attrib, MoveFr) => Stack,

        (Modify, Attrib | Modify) => Absorb,
        (Modify, Create | Delete | MoveTo) => Replace,
        (Modify, MoveFr) => Stack,

        (Create, Attrib | Modify | Create) => Absorb,
        (Create, Delete) => Nullify,
        (Create, MoveFr) => Stack,
        (Create, MoveTo) => Replace,

        (Delete, Attrib | Modify | Delete) => Absorb,
        (Delete, Create) => Stack,
        (Delete, MoveFr) => Stack,
        (Delete, MoveTo) => Replace,

        // Two renames of the same origin cannot be fused soundly; keep the
        // conservative ordering.
        (MoveFr, _) => Stack,

        (MoveTo, Attrib | Modify | MoveFr) => Stack,
        (MoveTo, Create | Delete | MoveTo) => Replace,
    }
}

enum Relation {
    Same,
    DirPrefix,
    Unrelated,
}

fn relation(a: &str, b: &str) -> Relation {
    if a == b {
        Relation::Same
    } else if (a.ends_with('/') && b.starts_with(a)) || (b.ends_with('/') && a.starts_with(b)) {
        Relation::DirPrefix
    } else {
        Relation::Unrelated
    }
}

fn parts(delay: &Delay) -> [Option<(Part, &str)>; 2] {
    match delay.kind {
        EventKind::Attrib => [Some((Part::Attrib, delay.path())), None],
        EventKind::Modify => [Some((Part::Modify, delay.path())), None],
        EventKind::Create => [Some((Part::Create, delay.path())), None],
        EventKind::Delete => [Some((Part::Delete, delay.path())), None],
        EventKind::Move => [
            Some((Part::MoveFr, delay.path())),
            delay.path2().map(|path2| (Part::MoveTo, path2)),
        ],
        // Blanket delays are handled before the scan and nullified delays
        // never re-enter it.
        EventKind::Blanket | EventKind::None => [None, None],
    }
}

/// Applies the default rules to one (queued, new) pair of delays.
///
/// Returns `None` when the two are unrelated and the scan should move on to
/// the next queued delay.
pub(crate) fn default_decision(old: &Delay, new: &Delay) -> Option<CollapseDecision> {
    for (new_part, new_path) in parts(new).into_iter().flatten() {
        for (old_part, old_path) in parts(old).into_iter().flatten() {
            match relation(old_path, new_path) {
                Relation::Unrelated => {}
                Relation::DirPrefix => return Some(CollapseDecision::Stack),
                Relation::Same => {
                    if old.status == DelayStatus::Active {
                        return Some(CollapseDecision::Stack);
                    }
                    return Some(table(old_part, new_part));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::DelayId;
    use mirror_core::Deadline;

    fn delay(kind: EventKind, path: &str, path2: Option<&str>) -> Delay {
        Delay {
            id: DelayId(0),
            kind,
            alarm: Deadline::Immediate,
            path: path.to_string(),
            path2: path2.map(str::to_string),
            status: DelayStatus::Wait,
            blocks: Vec::new(),
        }
    }

    #[test]
    fn same_path_uses_table() {
        let old = delay(EventKind::Create, "f", None);
        let new = delay(EventKind::Delete, "f", None);
        assert_eq!(
            default_decision(&old, &new),
            Some(CollapseDecision::Nullify)
        );
    }

    #[test]
    fn attrib_then_modify_replaces() {
        let old = delay(EventKind::Attrib, "x", None);
        let new = delay(EventKind::Modify, "x", None);
        assert_eq!(
            default_decision(&old, &new),
            Some(CollapseDecision::Replace)
        );
    }

    #[test]
    fn modify_then_attrib_absorbs() {
        let old = delay(EventKind::Modify, "x", None);
        let new = delay(EventKind::Attrib, "x", None);
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Absorb));
    }

    #[test]
    fn delete_then_create_stacks() {
        let old = delay(EventKind::Delete, "x", None);
        let new = delay(EventKind::Create, "x", None);
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Stack));
    }

    #[test]
    fn unrelated_paths_continue_the_scan() {
        let old = delay(EventKind::Modify, "a", None);
        let new = delay(EventKind::Modify, "b", None);
        assert_eq!(default_decision(&old, &new), None);
    }

    #[test]
    fn directory_prefix_stacks_either_direction() {
        let dir = delay(EventKind::Delete, "d/", None);
        let file = delay(EventKind::Modify, "d/f", None);
        assert_eq!(default_decision(&file, &dir), Some(CollapseDecision::Stack));
        assert_eq!(default_decision(&dir, &file), Some(CollapseDecision::Stack));
    }

    #[test]
    fn shared_name_prefix_is_not_a_directory_prefix() {
        let old = delay(EventKind::Modify, "data", None);
        let new = delay(EventKind::Modify, "database", None);
        assert_eq!(default_decision(&old, &new), None);
    }

    #[test]
    fn active_delay_on_same_path_always_stacks() {
        let mut old = delay(EventKind::Modify, "x", None);
        old.status = DelayStatus::Active;
        let new = delay(EventKind::Modify, "x", None);
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Stack));
    }

    #[test]
    fn move_origin_row_always_stacks() {
        let old = delay(EventKind::Move, "a", Some("b"));
        for kind in [
            EventKind::Attrib,
            EventKind::Modify,
            EventKind::Create,
            EventKind::Delete,
        ] {
            let new = delay(kind, "a", None);
            assert_eq!(
                default_decision(&old, &new),
                Some(CollapseDecision::Stack),
                "{kind} on move origin"
            );
        }
    }

    #[test]
    fn move_destination_row_replaces_create_and_delete() {
        let old = delay(EventKind::Move, "a", Some("b"));
        for kind in [EventKind::Create, EventKind::Delete] {
            let new = delay(kind, "b", None);
            assert_eq!(
                default_decision(&old, &new),
                Some(CollapseDecision::Replace),
                "{kind} on move destination"
            );
        }
        let new = delay(EventKind::Modify, "b", None);
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Stack));
    }

    #[test]
    fn new_move_onto_queued_create_replaces() {
        let old = delay(EventKind::Create, "b", None);
        let new = delay(EventKind::Move, "a", Some("b"));
        assert_eq!(
            default_decision(&old, &new),
            Some(CollapseDecision::Replace)
        );
    }

    #[test]
    fn two_moves_of_one_origin_stack() {
        let old = delay(EventKind::Move, "a", Some("b"));
        let new = delay(EventKind::Move, "a", Some("c"));
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Stack));
    }

    #[test]
    fn pair_order_prefers_new_origin_side() {
        // old: Move a -> b; new: Move b -> c. The (old destination, new
        // origin) pair matches first and the MoveTo row stacks on MoveFr.
        let old = delay(EventKind::Move, "a", Some("b"));
        let new = delay(EventKind::Move, "b", Some("c"));
        assert_eq!(default_decision(&old, &new), Some(CollapseDecision::Stack));
    }
}
