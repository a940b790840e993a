//! Filesystem change classification.

use std::fmt;

/// What happened to a path.
///
/// `Blanket` is the synthetic full-reconciliation event queued at startup;
/// `None` marks a delay that was nullified by its inverse and is about to
/// leave the FIFO.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    /// Metadata change (permissions, ownership, times).
    Attrib,
    /// A new file or directory appeared.
    Create,
    /// File content changed.
    Modify,
    /// A file or directory vanished.
    Delete,
    /// A rename observed with both endpoints inside the watched tree.
    Move,
    /// Full-tree reconciliation; blocks and is blocked by everything.
    Blanket,
    /// Cancelled out; never observable in a live FIFO.
    None,
}

impl EventKind {
    /// Display name used in logs and the status file.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Attrib => "Attrib",
            Self::Create => "Create",
            Self::Modify => "Modify",
            Self::Delete => "Delete",
            Self::Move => "Move",
            Self::Blanket => "Blanket",
            Self::None => "None",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which half of a rename an event view represents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MoveSide {
    /// Not part of a rename.
    #[default]
    None,
    /// The origin half.
    Fr,
    /// The destination half.
    To,
}

impl MoveSide {
    /// Suffix rendered into log lines ("" / "Fr" / "To").
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Fr => "Fr",
            Self::To => "To",
        }
    }
}
