//! Debug log categories.

use std::fmt;

/// One debug category selectable with `-log CATEGORY`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Category {
    /// Delay queue bookkeeping: alarms, stacking, releases.
    Delay,
    /// Collapse decisions taken while folding new delays.
    Collapse,
    /// Kernel watch traffic: adds, removals, raw events.
    Monitor,
    /// Child process lifecycle: spawns, exits, collects.
    Exec,
    /// Action handler invocations.
    Call,
    /// Status file writes.
    Status,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 6] = [
        Self::Delay,
        Self::Collapse,
        Self::Monitor,
        Self::Exec,
        Self::Call,
        Self::Status,
    ];

    /// The category name as accepted on the command line; doubles as the
    /// `tracing` target.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Delay => "delay",
            Self::Collapse => "collapse",
            Self::Monitor => "monitor",
            Self::Exec => "exec",
            Self::Call => "call",
            Self::Status => "status",
        }
    }

    /// Parses a category name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_name(category.name()), Some(category));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(Category::from_name("verbose"), None);
        assert_eq!(Category::from_name(""), None);
    }
}
