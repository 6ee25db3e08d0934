use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A node's monotonic revision counter. `Unknown` marks a node whose version hasn't been
/// fetched from storage yet (e.g. a freshly constructed handle); it carries no ordering
/// information and must never be compared, only replaced once the real value is read.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Version {
    Unknown,
    Known(u64),
}

impl Version {
    pub const INITIAL: Version = Version::Known(1);

    pub fn is_known(&self) -> bool {
        matches!(self, Version::Known(_))
    }

    pub fn next(&self) -> Version {
        match self {
            Version::Unknown => Version::INITIAL,
            Version::Known(v) => Version::Known(v + 1),
        }
    }

    /// Numeric value, when known. Used only for wire encoding; comparisons must go through
    /// [`Version::checked_cmp`].
    pub fn value(&self) -> Option<u64> {
        match self {
            Version::Unknown => None,
            Version::Known(v) => Some(*v),
        }
    }

    /// Fallible ordering: `None` if either side is `Unknown`. Deliberately distinct from
    /// `PartialOrd` so callers can't accidentally compare an unknown version via `<`/`>`.
    pub fn checked_cmp(&self, other: &Version) -> Option<Ordering> {
        match (self, other) {
            (Version::Known(a), Version::Known(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Version::Known(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_from_unknown_is_initial() {
        assert_eq!(Version::Unknown.next(), Version::INITIAL);
    }

    #[test]
    fn next_increments_known() {
        assert_eq!(Version::Known(4).next(), Version::Known(5));
    }

    #[test]
    fn unknown_is_incomparable() {
        assert_eq!(Version::Unknown.checked_cmp(&Version::Known(1)), None);
        assert_eq!(Version::Known(1).checked_cmp(&Version::Unknown), None);
        assert_eq!(
            Version::Known(1).checked_cmp(&Version::Known(2)),
            Some(Ordering::Less)
        );
    }
}
