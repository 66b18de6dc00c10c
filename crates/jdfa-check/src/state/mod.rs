//! Abstract memory state of one analysis path.
//!
//! A [`MemoryState`] holds the operand stack, a fact table for variables,
//! equality classes, known disequalities and the stack of active exception
//! handlers. Fact storage is shared between copies and duplicated on first
//! write, so forking a state at a branch is cheap and a copy can never
//! observe writes made through another copy.
//!
//! Only variables carry facts. Every other value derives its fact from its
//! structure: constants are exact, relations are decided against the state
//! and arithmetic is evaluated over ranges.

mod eq_classes;

pub use eq_classes::EqClasses;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use thiserror::Error;

use jdfa_core::constraint::check_instance_of;
use jdfa_core::{
    BinaryOp, ConstValue, DfType, JType, LongRangeSet, Nullability, PrimitiveType, RelationType,
    SpecialField, TypeCheckOutcome, TypeConstraint, TypeId, TypeRegistry, ValueFactory, ValueId,
    ValueKind, VariableDescriptor,
};

/// Misuse of a state by malformed instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("stack depth mismatch: {left} vs {right}")]
    StackShapeMismatch { left: usize, right: usize },

    #[error("active exception handlers differ")]
    TransferMismatch,

    #[error("no active exception handler to leave")]
    TransferUnderflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    stack: SmallVec<[ValueId; 8]>,
    /// Facts keyed by equality-class representative.
    facts: Arc<IndexMap<ValueId, DfType>>,
    classes: Arc<EqClasses>,
    /// Pairs of representatives known to differ, smaller id first.
    distinct: Arc<BTreeSet<(ValueId, ValueId)>>,
    /// Handler instruction pointers, innermost last.
    transfers: SmallVec<[usize; 2]>,
}

impl MemoryState {
    pub fn new() -> Self {
        MemoryState::default()
    }

    /// An independent copy for a forked path.
    pub fn copy(&self) -> MemoryState {
        self.clone()
    }

    // -----------------------------------------------------------------------
    // Operand stack
    // -----------------------------------------------------------------------

    pub fn push(&mut self, value: ValueId) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<ValueId, StateError> {
        self.stack.pop().ok_or(StateError::StackUnderflow)
    }

    /// Pops `count` values, returned in push order.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<ValueId>, StateError> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(StateError::StackUnderflow)?;
        Ok(self.stack.drain(at..).collect())
    }

    /// The value `depth` slots below the top.
    pub fn peek(&self, depth: usize) -> Result<ValueId, StateError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .copied()
            .ok_or(StateError::StackUnderflow)
    }

    pub fn stack(&self) -> &[ValueId] {
        &self.stack
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    // -----------------------------------------------------------------------
    // Exception handlers
    // -----------------------------------------------------------------------

    pub fn push_transfer(&mut self, handler: usize) {
        self.transfers.push(handler);
    }

    pub fn pop_transfer(&mut self) -> Result<usize, StateError> {
        self.transfers.pop().ok_or(StateError::TransferUnderflow)
    }

    /// Innermost active handler.
    pub fn active_transfer(&self) -> Option<usize> {
        self.transfers.last().copied()
    }

    // -----------------------------------------------------------------------
    // Facts
    // -----------------------------------------------------------------------

    pub fn get_df_type(&self, factory: &ValueFactory, value: ValueId) -> DfType {
        match factory.kind(value) {
            ValueKind::Variable { .. } => match self.facts.get(&self.classes.rep_of(value)) {
                Some(df) => df.clone(),
                None => factory.intrinsic_df_type(value),
            },
            ValueKind::BinOp {
                left,
                op,
                right,
                kind,
            } => self.bin_op_fact(factory, *left, *op, *right, *kind),
            ValueKind::Relation {
                left,
                relation,
                right,
            } => DfType::Boolean(self.check_relation(factory, *left, *relation, *right)),
            _ => factory.intrinsic_df_type(value),
        }
    }

    /// Replaces the fact of a variable. Other values are left alone.
    pub fn set_df_type(&mut self, factory: &ValueFactory, value: ValueId, df_type: DfType) {
        if !factory.is_variable(value) {
            return;
        }
        let rep = self.classes.rep_of(value);
        if df_type == factory.intrinsic_df_type(rep) {
            if self.facts.contains_key(&rep) {
                Arc::make_mut(&mut self.facts).swap_remove(&rep);
            }
        } else {
            Arc::make_mut(&mut self.facts).insert(rep, df_type);
        }
    }

    /// Narrows the fact of `value` by `df_type`.
    ///
    /// Returns `false` when the result is empty, i.e. the path is
    /// unreachable.
    pub fn meet_df_type(&mut self, factory: &ValueFactory, value: ValueId, df_type: &DfType) -> bool {
        let current = self.get_df_type(factory, value);
        let met = current.meet(df_type, factory.types());
        if met.is_bottom() {
            return false;
        }
        if met != current {
            self.set_df_type(factory, value, met);
        }
        true
    }

    fn bin_op_fact(
        &self,
        factory: &ValueFactory,
        left: ValueId,
        op: BinaryOp,
        right: ValueId,
        kind: PrimitiveType,
    ) -> DfType {
        let fallback = DfType::from_jtype(&JType::Primitive(kind), factory.types());
        if !kind.is_integral() {
            return fallback;
        }
        let (a, b) = (
            self.get_df_type(factory, left),
            self.get_df_type(factory, right),
        );
        let (Some(a), Some(b)) = (a.as_range(), b.as_range()) else {
            return fallback;
        };
        let range = match op {
            BinaryOp::Plus => a.plus(b, kind),
            BinaryOp::Minus => a.minus(b, kind),
            BinaryOp::Mul => a.times(b, kind),
            BinaryOp::And => {
                // A non-negative mask bounds the result.
                let bound = [a, b]
                    .into_iter()
                    .filter(|r| r.min().is_some_and(|m| m >= 0))
                    .filter_map(|r| r.max())
                    .min();
                match bound {
                    Some(hi) => LongRangeSet::range(0, hi),
                    None => LongRangeSet::of_type(kind),
                }
            }
            BinaryOp::Rem => match b.as_constant() {
                Some(divisor) if divisor != 0 => {
                    let m = (divisor.unsigned_abs() - 1) as i64;
                    match (a.min(), a.max()) {
                        (Some(lo), _) if lo >= 0 => LongRangeSet::range(0, m),
                        (_, Some(hi)) if hi <= 0 => LongRangeSet::range(-m, 0),
                        _ => LongRangeSet::range(-m, m),
                    }
                }
                _ => LongRangeSet::of_type(kind),
            },
            _ => LongRangeSet::of_type(kind),
        };
        DfType::range(kind, range.intersect(&LongRangeSet::of_type(kind)))
    }

    /// Every value the state says something about.
    pub fn known_values(&self) -> BTreeSet<ValueId> {
        let mut known: BTreeSet<ValueId> = self.facts.keys().copied().collect();
        known.extend(self.classes.values());
        for (x, y) in self.distinct.iter() {
            known.insert(*x);
            known.insert(*y);
        }
        known
    }

    pub fn classes(&self) -> &EqClasses {
        &self.classes
    }

    // -----------------------------------------------------------------------
    // Equality
    // -----------------------------------------------------------------------

    /// Whether `a` and `b` hold the same value in every concrete state.
    ///
    /// True for members of one equality class, and for two facts that pin
    /// the same constant. Floating and string constants are excluded: the
    /// former have signed zeros and NaN, the latter need not be one object.
    pub fn are_equal(&self, factory: &ValueFactory, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return has_identity(factory, a);
        }
        if self.classes.are_equal(a, b) {
            return true;
        }
        match identity_constant(&self.get_df_type(factory, a)) {
            Some(value) => identity_constant(&self.get_df_type(factory, b)) == Some(value),
            None => false,
        }
    }

    pub fn are_distinct(&self, factory: &ValueFactory, a: ValueId, b: ValueId) -> bool {
        if self.are_equal(factory, a, b) {
            return false;
        }
        let pair = ordered(self.classes.rep_of(a), self.classes.rep_of(b));
        if self.distinct.contains(&pair) {
            return true;
        }
        let (da, db) = (self.get_df_type(factory, a), self.get_df_type(factory, b));
        if matches!(da, DfType::Floating { .. }) || matches!(db, DfType::Floating { .. }) {
            // Signed zeros compare equal; leave floats to check_relation.
            return false;
        }
        da.meet(&db, factory.types()).is_bottom()
    }

    /// Records `a == b`. Returns `false` if the state becomes unreachable.
    pub fn unite(&mut self, factory: &ValueFactory, a: ValueId, b: ValueId) -> bool {
        if self.are_equal(factory, a, b) {
            return true;
        }
        if self.are_distinct(factory, a, b) {
            return false;
        }
        let da = self.get_df_type(factory, a);
        let db = self.get_df_type(factory, b);
        if !(factory.is_variable(a) && factory.is_variable(b)) {
            return self.meet_df_type(factory, a, &db) && self.meet_df_type(factory, b, &da);
        }
        let met = da.meet(&db, factory.types());
        if met.is_bottom() {
            return false;
        }
        let (kept, absorbed) = Arc::make_mut(&mut self.classes).unite(a, b);
        if self.facts.contains_key(&absorbed) {
            Arc::make_mut(&mut self.facts).swap_remove(&absorbed);
        }
        self.set_df_type(factory, kept, met);

        let moved: Vec<(ValueId, ValueId)> = self
            .distinct
            .iter()
            .filter(|(x, y)| *x == absorbed || *y == absorbed)
            .copied()
            .collect();
        if !moved.is_empty() {
            let distinct = Arc::make_mut(&mut self.distinct);
            for (x, y) in moved {
                distinct.remove(&(x, y));
                let other = if x == absorbed { y } else { x };
                if other == kept {
                    return false;
                }
                distinct.insert(ordered(kept, other));
            }
        }
        true
    }

    /// Records `a != b`. Returns `false` if the state becomes unreachable.
    pub fn make_distinct(&mut self, factory: &ValueFactory, a: ValueId, b: ValueId) -> bool {
        if self.are_equal(factory, a, b) {
            return false;
        }
        if self.are_distinct(factory, a, b) {
            return true;
        }
        for (target, other) in [(a, b), (b, a)] {
            let fact = self.get_df_type(factory, other);
            if fact.constant_value().is_none() {
                continue;
            }
            if let Some(negated) = fact.try_negate(factory.types()) {
                if !self.meet_df_type(factory, target, &negated) {
                    return false;
                }
            }
        }
        if is_trackable(factory, a) && is_trackable(factory, b) {
            let pair = ordered(self.classes.rep_of(a), self.classes.rep_of(b));
            Arc::make_mut(&mut self.distinct).insert(pair);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Conditions
    // -----------------------------------------------------------------------

    /// Assumes `condition` holds.
    ///
    /// Returns `false` if that contradicts the state.
    pub fn apply_condition(&mut self, factory: &ValueFactory, condition: ValueId) -> bool {
        match factory.kind(condition) {
            ValueKind::Relation {
                left,
                relation,
                right,
            } => self.apply_relation(factory, *left, *relation, *right),
            _ => self.meet_df_type(factory, condition, &DfType::TRUE),
        }
    }

    /// Assumes `left <relation> right` holds.
    pub fn apply_relation(
        &mut self,
        factory: &ValueFactory,
        left: ValueId,
        relation: RelationType,
        right: ValueId,
    ) -> bool {
        if let Some(known) = self.check_relation(factory, left, relation, right) {
            return known;
        }
        match relation {
            RelationType::Eq => self.unite(factory, left, right),
            RelationType::Ne => self.make_distinct(factory, left, right),
            RelationType::Lt | RelationType::Le | RelationType::Gt | RelationType::Ge => {
                self.apply_comparison(factory, left, relation, right)
            }
            RelationType::InstanceOf => self.apply_instance_of(factory, left, right, true),
            RelationType::NotInstanceOf => self.apply_instance_of(factory, left, right, false),
        }
    }

    fn apply_comparison(
        &mut self,
        factory: &ValueFactory,
        left: ValueId,
        relation: RelationType,
        right: ValueId,
    ) -> bool {
        let lt = self.get_df_type(factory, left);
        let rt = self.get_df_type(factory, right);
        let (
            DfType::Integral {
                kind: lk,
                range: lr,
            },
            DfType::Integral {
                kind: rk,
                range: rr,
            },
        ) = (&lt, &rt)
        else {
            return true;
        };
        let (Some(lmin), Some(lmax), Some(rmin), Some(rmax)) = (lr.min(), lr.max(), rr.min(), rr.max())
        else {
            return false;
        };
        let below = |hi: Option<i64>| hi.map_or_else(LongRangeSet::empty, |h| LongRangeSet::range(i64::MIN, h));
        let above = |lo: Option<i64>| lo.map_or_else(LongRangeSet::empty, |l| LongRangeSet::range(l, i64::MAX));
        let (left_allowed, right_allowed) = match relation {
            RelationType::Lt => (below(rmax.checked_sub(1)), above(lmin.checked_add(1))),
            RelationType::Le => (below(Some(rmax)), above(Some(lmin))),
            RelationType::Gt => (above(rmin.checked_add(1)), below(lmax.checked_sub(1))),
            RelationType::Ge => (above(Some(rmin)), below(Some(lmax))),
            _ => return true,
        };
        let (lk, rk) = (*lk, *rk);
        self.meet_df_type(factory, left, &DfType::range(lk, left_allowed))
            && self.meet_df_type(factory, right, &DfType::range(rk, right_allowed))
    }

    fn apply_instance_of(
        &mut self,
        factory: &ValueFactory,
        value: ValueId,
        class_value: ValueId,
        positive: bool,
    ) -> bool {
        let reg = factory.types();
        let Some(class) = self.class_constant(factory, class_value) else {
            // Even against an unknown class a successful check proves non-null.
            return !positive || self.meet_df_type(factory, value, &DfType::not_null_object());
        };
        let fact = if positive {
            DfType::not_null(TypeConstraint::instance_of(class, reg))
        } else {
            DfType::reference(
                Nullability::Unknown,
                TypeConstraint::not_instance_of(class, reg),
            )
        };
        self.meet_df_type(factory, value, &fact)
    }

    fn class_constant(&self, factory: &ValueFactory, value: ValueId) -> Option<TypeId> {
        match self.get_df_type(factory, value).constant_value() {
            Some(ConstValue::Class(id)) => Some(id),
            _ => None,
        }
    }

    /// Decides `left <relation> right` in this state, if possible.
    pub fn check_relation(
        &self,
        factory: &ValueFactory,
        left: ValueId,
        relation: RelationType,
        right: ValueId,
    ) -> Option<bool> {
        let lt = self.get_df_type(factory, left);
        let rt = self.get_df_type(factory, right);
        if let (Some(a), Some(b)) = (float_constant(&lt), float_constant(&rt)) {
            return match relation {
                RelationType::Eq => Some(a == b),
                RelationType::Ne => Some(a != b),
                RelationType::Lt => Some(a < b),
                RelationType::Le => Some(a <= b),
                RelationType::Gt => Some(a > b),
                RelationType::Ge => Some(a >= b),
                RelationType::InstanceOf | RelationType::NotInstanceOf => None,
            };
        }
        match relation {
            RelationType::Eq | RelationType::Ne => {
                let equal = if self.are_equal(factory, left, right) && !may_be_nan(&lt) {
                    Some(true)
                } else if self.are_distinct(factory, left, right) {
                    Some(false)
                } else {
                    None
                };
                equal.map(|e| e == (relation == RelationType::Eq))
            }
            RelationType::Lt | RelationType::Le | RelationType::Gt | RelationType::Ge => {
                let (lr, rr) = (lt.as_range()?, rt.as_range()?);
                if self.are_equal(factory, left, right) {
                    return Some(matches!(relation, RelationType::Le | RelationType::Ge));
                }
                let (lmin, lmax, rmin, rmax) = (lr.min()?, lr.max()?, rr.min()?, rr.max()?);
                let (always, never) = match relation {
                    RelationType::Lt => (lmax < rmin, lmin >= rmax),
                    RelationType::Le => (lmax <= rmin, lmin > rmax),
                    RelationType::Gt => (lmin > rmax, lmax <= rmin),
                    _ => (lmin >= rmax, lmax < rmin),
                };
                if always {
                    Some(true)
                } else if never {
                    Some(false)
                } else {
                    None
                }
            }
            RelationType::InstanceOf | RelationType::NotInstanceOf => {
                let class = self.class_constant(factory, right)?;
                let positive = instance_check(&lt, class, factory.types())?;
                Some(positive == (relation == RelationType::InstanceOf))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Assignment and flushing
    // -----------------------------------------------------------------------

    /// Binds variable `dest` to `value`.
    pub fn assign(&mut self, factory: &mut ValueFactory, dest: ValueId, value: ValueId) {
        if dest == value {
            return;
        }
        let df = self.get_df_type(factory, value);
        let boxed_inner = match factory.kind(value) {
            ValueKind::Boxed { inner, .. } => Some((*inner, self.get_df_type(factory, *inner))),
            _ => None,
        };
        self.flush_variable(factory, dest);

        if factory.is_variable(value) && !factory.qualifier_chain_contains(value, dest) {
            self.unite(factory, dest, value);
        } else {
            let narrowed = factory.intrinsic_df_type(dest).meet(&df, factory.types());
            let fact = if narrowed.is_bottom() { df } else { narrowed };
            self.set_df_type(factory, dest, fact);
        }

        if let Some((inner, inner_df)) = boxed_inner {
            let unboxed =
                factory.get_variable(VariableDescriptor::Special(SpecialField::Unbox), Some(dest));
            if factory.is_variable(inner) && !factory.qualifier_chain_contains(inner, dest) {
                self.unite(factory, unboxed, inner);
            } else {
                self.set_df_type(factory, unboxed, inner_df);
            }
        }
    }

    /// Forgets everything about `variable` and the variables qualified by it.
    pub fn flush_variable(&mut self, factory: &ValueFactory, variable: ValueId) {
        let dependents: Vec<ValueId> = self
            .known_values()
            .into_iter()
            .filter(|v| *v != variable && factory.qualifier_chain_contains(*v, variable))
            .collect();
        self.forget(factory, variable);
        for dependent in dependents {
            self.forget(factory, dependent);
        }
    }

    /// Flushes every non-stable field for which `affected` holds.
    pub fn flush_fields(&mut self, factory: &ValueFactory, mut affected: impl FnMut(ValueId) -> bool) {
        let doomed: Vec<ValueId> = self
            .known_values()
            .into_iter()
            .filter(|v| {
                factory
                    .descriptor(*v)
                    .is_some_and(|d| d.is_field() && !d.is_stable())
            })
            .filter(|v| affected(*v))
            .collect();
        for field in doomed {
            self.flush_variable(factory, field);
        }
    }

    fn forget(&mut self, factory: &ValueFactory, value: ValueId) {
        let rep = self.classes.rep_of(value);
        let successor = if self.classes.contains(value) {
            Arc::make_mut(&mut self.classes).remove(value)
        } else {
            None
        };
        if rep != value {
            return;
        }
        let fact = if self.facts.contains_key(&value) {
            Arc::make_mut(&mut self.facts).swap_remove(&value)
        } else {
            None
        };
        if let (Some(next), Some(fact)) = (successor, fact) {
            self.set_df_type(factory, next, fact);
        }
        let affected: Vec<(ValueId, ValueId)> = self
            .distinct
            .iter()
            .filter(|(x, y)| *x == value || *y == value)
            .copied()
            .collect();
        if affected.is_empty() {
            return;
        }
        let distinct = Arc::make_mut(&mut self.distinct);
        for (x, y) in affected {
            distinct.remove(&(x, y));
            if let Some(next) = successor {
                let other = if x == value { y } else { x };
                distinct.insert(ordered(next, other));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lattice operations on whole states
    // -----------------------------------------------------------------------

    /// Least state covering both; stacks must have the same depth.
    pub fn merge(
        &self,
        other: &MemoryState,
        factory: &mut ValueFactory,
    ) -> Result<MemoryState, StateError> {
        self.combine(other, factory, false)
    }

    /// Like [`merge`](Self::merge), but widens growing ranges of `next`.
    pub fn widen(
        &self,
        next: &MemoryState,
        factory: &mut ValueFactory,
    ) -> Result<MemoryState, StateError> {
        self.combine(next, factory, true)
    }

    fn combine(
        &self,
        other: &MemoryState,
        factory: &mut ValueFactory,
        widen: bool,
    ) -> Result<MemoryState, StateError> {
        if self.stack.len() != other.stack.len() {
            return Err(StateError::StackShapeMismatch {
                left: self.stack.len(),
                right: other.stack.len(),
            });
        }
        if self.transfers != other.transfers {
            return Err(StateError::TransferMismatch);
        }

        let mut stack = SmallVec::new();
        for (a, b) in self.stack.iter().zip(&other.stack) {
            if a == b {
                stack.push(*a);
                continue;
            }
            let joined = self
                .get_df_type(factory, *a)
                .join(&other.get_df_type(factory, *b), factory.types());
            stack.push(factory.get_type_value(joined));
        }

        let factory: &ValueFactory = factory;
        let reg = factory.types();

        // Equalities holding on both sides.
        let mut classes = EqClasses::default();
        for (_, members) in self.classes.classes() {
            let mut first_by_other_rep: BTreeMap<ValueId, ValueId> = BTreeMap::new();
            for member in members {
                let other_rep = other.classes.rep_of(*member);
                match first_by_other_rep.get(&other_rep) {
                    Some(first) => {
                        classes.unite(*first, *member);
                    }
                    None => {
                        first_by_other_rep.insert(other_rep, *member);
                    }
                }
            }
        }

        let mut facts = IndexMap::new();
        let known: BTreeSet<ValueId> = self
            .known_values()
            .union(&other.known_values())
            .copied()
            .collect();
        for value in known {
            if !factory.is_variable(value) || classes.rep_of(value) != value {
                continue;
            }
            let a = self.get_df_type(factory, value);
            let b = other.get_df_type(factory, value);
            let df = if widen { a.widen(&b, reg) } else { a.join(&b, reg) };
            if df != factory.intrinsic_df_type(value) {
                facts.insert(value, df);
            }
        }

        let mut distinct = BTreeSet::new();
        for (x, y) in self.distinct.iter() {
            if other.are_distinct(factory, *x, *y) {
                distinct.insert(ordered(classes.rep_of(*x), classes.rep_of(*y)));
            }
        }
        for (x, y) in other.distinct.iter() {
            if self.are_distinct(factory, *x, *y) {
                distinct.insert(ordered(classes.rep_of(*x), classes.rep_of(*y)));
            }
        }

        Ok(MemoryState {
            stack,
            facts: Arc::new(facts),
            classes: Arc::new(classes),
            distinct: Arc::new(distinct),
            transfers: self.transfers.clone(),
        })
    }

    /// Returns `true` if every concrete state described by `other` is
    /// described by `self`.
    pub fn is_superstate_of(&self, other: &MemoryState, factory: &ValueFactory) -> bool {
        if self.stack.len() != other.stack.len() || self.transfers != other.transfers {
            return false;
        }
        let reg = factory.types();
        for (a, b) in self.stack.iter().zip(&other.stack) {
            if a != b
                && !self
                    .get_df_type(factory, *a)
                    .is_superset_of(&other.get_df_type(factory, *b), reg)
            {
                return false;
            }
        }
        for value in self.known_values() {
            if !self
                .get_df_type(factory, value)
                .is_superset_of(&other.get_df_type(factory, value), reg)
            {
                return false;
            }
        }
        for (rep, members) in self.classes.classes() {
            if !members.iter().all(|m| other.classes.are_equal(rep, *m)) {
                return false;
            }
        }
        self.distinct
            .iter()
            .all(|(x, y)| other.are_distinct(factory, *x, *y))
    }

    /// Returns `true` if the states differ in at most one fact, so merging
    /// them loses little.
    pub fn can_merge_with(&self, other: &MemoryState, factory: &ValueFactory) -> bool {
        if self.stack.len() != other.stack.len()
            || self.transfers != other.transfers
            || self.classes != other.classes
            || self.distinct != other.distinct
        {
            return false;
        }
        let mut differences = self
            .stack
            .iter()
            .zip(&other.stack)
            .filter(|(a, b)| a != b)
            .count();
        let known = self.known_values();
        for value in known.union(&other.known_values()) {
            if self.get_df_type(factory, *value) != other.get_df_type(factory, *value) {
                differences += 1;
            }
            if differences > 1 {
                return false;
            }
        }
        differences <= 1
    }

    /// Compact rendering for traces and reports.
    pub fn describe(&self, factory: &ValueFactory) -> String {
        let reg = factory.types();
        let stack: Vec<String> = self.stack.iter().map(|v| factory.describe(*v)).collect();
        let mut parts = vec![format!("stack: [{}]", stack.join(", "))];
        let mut facts: Vec<String> = self
            .facts
            .iter()
            .map(|(v, df)| format!("{}: {}", factory.describe(*v), df.display(reg)))
            .collect();
        facts.sort();
        if !facts.is_empty() {
            parts.push(format!("facts: {{{}}}", facts.join(", ")));
        }
        for (_, members) in self.classes.classes() {
            let names: Vec<String> = members.iter().map(|m| factory.describe(*m)).collect();
            parts.push(names.join(" == "));
        }
        for (x, y) in self.distinct.iter() {
            parts.push(format!("{} != {}", factory.describe(*x), factory.describe(*y)));
        }
        parts.join("; ")
    }
}

/// Decides `value instanceof class` from a fact, null included.
pub(crate) fn instance_check(fact: &DfType, class: TypeId, reg: &TypeRegistry) -> Option<bool> {
    let reference = fact.as_reference()?;
    if reference.nullability == Nullability::Null {
        return Some(false);
    }
    let tested = TypeConstraint::instance_of(class, reg);
    match check_instance_of(&reference.constraint, &tested, reg) {
        TypeCheckOutcome::Never => Some(false),
        TypeCheckOutcome::Always if reference.nullability == Nullability::NotNull => Some(true),
        _ => None,
    }
}

/// Values whose identity means equality of the runtime values.
fn has_identity(factory: &ValueFactory, value: ValueId) -> bool {
    match factory.kind(value) {
        ValueKind::Constant { .. } | ValueKind::Variable { .. } => true,
        ValueKind::BinOp { left, right, .. } | ValueKind::Relation { left, right, .. } => {
            has_identity(factory, *left) && has_identity(factory, *right)
        }
        ValueKind::Unknown | ValueKind::Boxed { .. } | ValueKind::Typed(_) => false,
    }
}

/// Values that may appear in the disequality set.
fn is_trackable(factory: &ValueFactory, value: ValueId) -> bool {
    matches!(
        factory.kind(value),
        ValueKind::Constant { .. } | ValueKind::Variable { .. }
    )
}

fn ordered(a: ValueId, b: ValueId) -> (ValueId, ValueId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn float_constant(df: &DfType) -> Option<f64> {
    match df {
        DfType::Floating {
            constant: Some(bits),
            ..
        } => Some(bits.get()),
        _ => None,
    }
}

/// The constant pinned by `df` when equal constants imply equal values.
fn identity_constant(df: &DfType) -> Option<ConstValue> {
    match df.constant_value()? {
        ConstValue::Float(_) | ConstValue::Str(_) => None,
        value => Some(value),
    }
}

fn may_be_nan(df: &DfType) -> bool {
    match df {
        DfType::Floating { constant, .. } => constant.map_or(true, |bits| bits.get().is_nan()),
        _ => false,
    }
}
