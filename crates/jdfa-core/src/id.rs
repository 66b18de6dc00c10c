//! Stable ID newtypes for analysis entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `ValueId` cannot be accidentally used where an `AnchorId` is
//! expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an interned value inside a [`ValueFactory`](crate::value::ValueFactory).
///
/// Two structurally equal values always receive the same `ValueId` from the
/// same factory, so identity comparison of handles is value equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Opaque handle back to the analyzed program text.
///
/// The engine never inspects anchors; it only uses them as keys for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorId(pub u32);

// Display implementations -- just print the inner value.

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ValueId {
    /// Index of this value in the factory arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_id_display() {
        assert_eq!(format!("{}", ValueId(7)), "7");
    }

    #[test]
    fn anchor_id_display() {
        assert_eq!(format!("{}", AnchorId(99)), "99");
    }

    #[test]
    fn value_id_index() {
        assert_eq!(ValueId(12).index(), 12);
    }

    #[test]
    fn serde_roundtrip() {
        let anchor = AnchorId(42);
        let json = serde_json::to_string(&anchor).unwrap();
        let back: AnchorId = serde_json::from_str(&json).unwrap();
        assert_eq!(anchor, back);
    }
}
