//! Equivalence classes of values known to be equal.
//!
//! Every class with two or more members has a representative, its smallest
//! member. Values not mentioned here are singleton classes and represent
//! themselves.

use std::collections::{BTreeMap, BTreeSet};

use jdfa_core::ValueId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqClasses {
    /// Member to representative, for members of non-singleton classes.
    rep: BTreeMap<ValueId, ValueId>,
    /// Representative to all members, the representative included.
    members: BTreeMap<ValueId, BTreeSet<ValueId>>,
}

impl EqClasses {
    pub fn rep_of(&self, value: ValueId) -> ValueId {
        self.rep.get(&value).copied().unwrap_or(value)
    }

    pub fn are_equal(&self, a: ValueId, b: ValueId) -> bool {
        self.rep_of(a) == self.rep_of(b)
    }

    /// Returns `true` if `value` belongs to a non-singleton class.
    pub fn contains(&self, value: ValueId) -> bool {
        self.rep.contains_key(&value)
    }

    /// Merges the classes of `a` and `b`.
    ///
    /// Returns `(kept, absorbed)` representatives; both are the same when
    /// the values were already equal.
    pub fn unite(&mut self, a: ValueId, b: ValueId) -> (ValueId, ValueId) {
        let (ra, rb) = (self.rep_of(a), self.rep_of(b));
        if ra == rb {
            return (ra, ra);
        }
        let (kept, absorbed) = if ra < rb { (ra, rb) } else { (rb, ra) };
        let moved = self
            .members
            .remove(&absorbed)
            .unwrap_or_else(|| BTreeSet::from([absorbed]));
        let class = self
            .members
            .entry(kept)
            .or_insert_with(|| BTreeSet::from([kept]));
        class.extend(moved.iter().copied());
        self.rep.insert(kept, kept);
        for member in moved {
            self.rep.insert(member, kept);
        }
        (kept, absorbed)
    }

    /// Takes `value` out of its class.
    ///
    /// Returns the representative of what is left of the class, if the
    /// value had company.
    pub fn remove(&mut self, value: ValueId) -> Option<ValueId> {
        let old_rep = self.rep.remove(&value)?;
        let mut class = self.members.remove(&old_rep)?;
        class.remove(&value);
        let new_rep = *class.first()?;
        if class.len() == 1 {
            self.rep.remove(&new_rep);
        } else {
            for member in &class {
                self.rep.insert(*member, new_rep);
            }
            self.members.insert(new_rep, class);
        }
        Some(new_rep)
    }

    /// Non-singleton classes keyed by representative.
    pub fn classes(&self) -> impl Iterator<Item = (ValueId, &BTreeSet<ValueId>)> {
        self.members.iter().map(|(rep, members)| (*rep, members))
    }

    /// Every value in a non-singleton class.
    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.rep.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
