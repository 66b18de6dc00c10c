//! Runtime type constraints on reference values.
//!
//! A [`TypeConstraint`] describes the set of runtime classes a reference may
//! have: either exactly one class, or "an instance of every type in
//! `instance_of` and of none of the types in `not_instance_of`". Constraints
//! are kept normalized so structural equality is set equality: redundant
//! supertypes and redundant exclusions are dropped, a single final class
//! collapses to [`TypeConstraint::Exact`], and contradictions become
//! [`TypeConstraint::Bottom`].
//!
//! The instanceof decision procedure lives here too: a check is `Never`
//! when the meet with the tested type is empty, `Always` when the meet with
//! the tested type's negation is empty, and `Unknown` otherwise.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::type_id::{TypeId, TypeRegistry};

/// Set of runtime classes a reference value may have.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeConstraint {
    /// No class satisfies the constraint.
    Bottom,
    /// The runtime class is exactly this class.
    Exact(TypeId),
    /// Instance of all `instance_of` types and none of `not_instance_of`.
    /// Both sets empty is the top element.
    Constrained {
        instance_of: BTreeSet<TypeId>,
        not_instance_of: BTreeSet<TypeId>,
    },
}

/// Outcome of an instanceof-style check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCheckOutcome {
    Always,
    Never,
    Unknown,
}

impl TypeConstraint {
    /// The unconstrained element: any class.
    pub fn top() -> Self {
        TypeConstraint::Constrained {
            instance_of: BTreeSet::new(),
            not_instance_of: BTreeSet::new(),
        }
    }

    /// Values that are instances of `ty`. Final classes produce an exact
    /// constraint; `Object` produces top.
    pub fn instance_of(ty: TypeId, reg: &TypeRegistry) -> Self {
        if ty == TypeId::OBJECT {
            return TypeConstraint::top();
        }
        if reg.is_final(ty) {
            return TypeConstraint::Exact(ty);
        }
        TypeConstraint::Constrained {
            instance_of: BTreeSet::from([ty]),
            not_instance_of: BTreeSet::new(),
        }
    }

    /// Values that are not instances of `ty`.
    pub fn not_instance_of(ty: TypeId, reg: &TypeRegistry) -> Self {
        normalize(BTreeSet::new(), BTreeSet::from([ty]), reg)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, TypeConstraint::Bottom)
    }

    pub fn is_top(&self) -> bool {
        matches!(
            self,
            TypeConstraint::Constrained { instance_of, not_instance_of }
                if instance_of.is_empty() && not_instance_of.is_empty()
        )
    }

    /// The runtime class when it is known exactly.
    pub fn exact_class(&self) -> Option<TypeId> {
        match self {
            TypeConstraint::Exact(id) => Some(*id),
            _ => None,
        }
    }

    /// Intersection of both class sets.
    pub fn meet(&self, other: &TypeConstraint, reg: &TypeRegistry) -> TypeConstraint {
        match (self, other) {
            (TypeConstraint::Bottom, _) | (_, TypeConstraint::Bottom) => TypeConstraint::Bottom,
            (TypeConstraint::Exact(a), TypeConstraint::Exact(b)) => {
                if a == b {
                    TypeConstraint::Exact(*a)
                } else {
                    TypeConstraint::Bottom
                }
            }
            (TypeConstraint::Exact(x), c @ TypeConstraint::Constrained { .. })
            | (c @ TypeConstraint::Constrained { .. }, TypeConstraint::Exact(x)) => {
                if c.admits_class(*x, reg) {
                    TypeConstraint::Exact(*x)
                } else {
                    TypeConstraint::Bottom
                }
            }
            (
                TypeConstraint::Constrained {
                    instance_of: i1,
                    not_instance_of: n1,
                },
                TypeConstraint::Constrained {
                    instance_of: i2,
                    not_instance_of: n2,
                },
            ) => normalize(
                i1.union(i2).copied().collect(),
                n1.union(n2).copied().collect(),
                reg,
            ),
        }
    }

    /// Smallest representable constraint containing both class sets.
    pub fn join(&self, other: &TypeConstraint, reg: &TypeRegistry) -> TypeConstraint {
        match (self, other) {
            (TypeConstraint::Bottom, x) | (x, TypeConstraint::Bottom) => x.clone(),
            (TypeConstraint::Exact(a), TypeConstraint::Exact(b)) if a == b => {
                TypeConstraint::Exact(*a)
            }
            _ => {
                let shared: BTreeSet<TypeId> = self
                    .upper_closure(reg)
                    .intersection(&other.upper_closure(reg))
                    .copied()
                    .collect();
                let excluded: BTreeSet<TypeId> = match (self, other) {
                    (
                        TypeConstraint::Constrained {
                            not_instance_of: n1,
                            ..
                        },
                        TypeConstraint::Constrained {
                            not_instance_of: n2,
                            ..
                        },
                    ) => n1.intersection(n2).copied().collect(),
                    (TypeConstraint::Exact(x), TypeConstraint::Constrained { not_instance_of, .. })
                    | (TypeConstraint::Constrained { not_instance_of, .. }, TypeConstraint::Exact(x)) => {
                        not_instance_of
                            .iter()
                            .copied()
                            .filter(|n| !reg.is_subtype(*x, *n))
                            .collect()
                    }
                    _ => BTreeSet::new(),
                };
                normalize(shared, excluded, reg)
            }
        }
    }

    /// Constraint holding exactly the classes outside this one, when that is
    /// representable.
    pub fn try_negate(&self, reg: &TypeRegistry) -> Option<TypeConstraint> {
        match self {
            TypeConstraint::Bottom => Some(TypeConstraint::top()),
            TypeConstraint::Exact(x) if reg.is_final(*x) => {
                Some(TypeConstraint::not_instance_of(*x, reg))
            }
            TypeConstraint::Exact(_) => None,
            TypeConstraint::Constrained {
                instance_of,
                not_instance_of,
            } => match (instance_of.len(), not_instance_of.len()) {
                (0, 0) => Some(TypeConstraint::Bottom),
                (1, 0) => instance_of
                    .first()
                    .map(|t| TypeConstraint::not_instance_of(*t, reg)),
                (0, 1) => not_instance_of
                    .first()
                    .map(|t| TypeConstraint::instance_of(*t, reg)),
                _ => None,
            },
        }
    }

    /// Returns `true` if every class allowed by `self` is allowed by `other`.
    pub fn is_subconstraint_of(&self, other: &TypeConstraint, reg: &TypeRegistry) -> bool {
        self.meet(other, reg) == *self
    }

    /// Returns `true` if the runtime class `class` satisfies this constraint.
    pub fn admits_class(&self, class: TypeId, reg: &TypeRegistry) -> bool {
        match self {
            TypeConstraint::Bottom => false,
            TypeConstraint::Exact(x) => *x == class,
            TypeConstraint::Constrained {
                instance_of,
                not_instance_of,
            } => {
                instance_of.iter().all(|i| reg.is_subtype(class, *i))
                    && !not_instance_of.iter().any(|n| reg.is_subtype(class, *n))
            }
        }
    }

    /// Renders the constraint with class names from `reg`.
    pub fn display(&self, reg: &TypeRegistry) -> String {
        match self {
            TypeConstraint::Bottom => "⊥".to_string(),
            TypeConstraint::Exact(id) => format!("exactly {}", reg.name(*id)),
            TypeConstraint::Constrained {
                instance_of,
                not_instance_of,
            } => {
                if self.is_top() {
                    return "any".to_string();
                }
                let mut parts: Vec<String> = instance_of
                    .iter()
                    .map(|t| format!("instanceof {}", reg.name(*t)))
                    .collect();
                parts.extend(
                    not_instance_of
                        .iter()
                        .map(|t| format!("!instanceof {}", reg.name(*t))),
                );
                parts.join(" & ")
            }
        }
    }

    /// Every type all members of this constraint are instances of.
    fn upper_closure(&self, reg: &TypeRegistry) -> BTreeSet<TypeId> {
        match self {
            TypeConstraint::Bottom => BTreeSet::new(),
            TypeConstraint::Exact(x) => reg.supertypes_closure(*x).into_iter().collect(),
            TypeConstraint::Constrained { instance_of, .. } => {
                let mut closure = BTreeSet::from([TypeId::OBJECT]);
                for t in instance_of {
                    closure.extend(reg.supertypes_closure(*t));
                }
                closure
            }
        }
    }
}

impl Default for TypeConstraint {
    fn default() -> Self {
        TypeConstraint::top()
    }
}

/// Canonical form of `instance_of ∧ ¬not_instance_of`.
fn normalize(
    mut instance_of: BTreeSet<TypeId>,
    not_instance_of: BTreeSet<TypeId>,
    reg: &TypeRegistry,
) -> TypeConstraint {
    if not_instance_of.contains(&TypeId::OBJECT) {
        return TypeConstraint::Bottom;
    }
    instance_of.remove(&TypeId::OBJECT);

    // Keep only the most specific instance_of types.
    let minimal: BTreeSet<TypeId> = instance_of
        .iter()
        .copied()
        .filter(|t| {
            !instance_of
                .iter()
                .any(|other| other != t && reg.is_subtype(*other, *t))
        })
        .collect();

    for (i, a) in minimal.iter().enumerate() {
        for b in minimal.iter().skip(i + 1) {
            if reg.are_disjoint(*a, *b) {
                return TypeConstraint::Bottom;
            }
        }
    }
    if minimal
        .iter()
        .any(|i| not_instance_of.iter().any(|n| reg.is_subtype(*i, *n)))
    {
        return TypeConstraint::Bottom;
    }

    // Exclusions that are implied by another exclusion or by disjointness
    // with a required type carry no information.
    let excluded: BTreeSet<TypeId> = not_instance_of
        .iter()
        .copied()
        .filter(|n| {
            !not_instance_of
                .iter()
                .any(|m| m != n && reg.is_subtype(*n, *m))
        })
        .filter(|n| !minimal.iter().any(|i| reg.are_disjoint(*i, *n)))
        .collect();

    if minimal.len() == 1 {
        if let Some(only) = minimal.first() {
            if reg.is_final(*only) {
                return TypeConstraint::Exact(*only);
            }
        }
    }

    TypeConstraint::Constrained {
        instance_of: minimal,
        not_instance_of: excluded,
    }
}

/// Decides `value instanceof tested` from the constraint of the value.
///
/// Nullness is not considered here; callers handle a possibly-null operand.
pub fn check_instance_of(
    value: &TypeConstraint,
    tested: &TypeConstraint,
    reg: &TypeRegistry,
) -> TypeCheckOutcome {
    if value.meet(tested, reg).is_bottom() {
        return TypeCheckOutcome::Never;
    }
    match tested.try_negate(reg) {
        Some(negated) if value.meet(&negated, reg).is_bottom() => TypeCheckOutcome::Always,
        _ => TypeCheckOutcome::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassDef;
    use proptest::prelude::*;

    fn reg() -> TypeRegistry {
        TypeRegistry::new()
    }

    fn inst(ty: TypeId) -> TypeConstraint {
        TypeConstraint::instance_of(ty, &reg())
    }

    // -----------------------------------------------------------------------
    // instanceof decision procedure
    // -----------------------------------------------------------------------

    #[test]
    fn disjoint_types_never_match() {
        let r = reg();
        let outcome = check_instance_of(&inst(TypeId::STRING), &inst(TypeId::INTEGER), &r);
        assert_eq!(outcome, TypeCheckOutcome::Never);
    }

    #[test]
    fn subtype_always_matches() {
        let r = reg();
        let outcome = check_instance_of(&inst(TypeId::ARRAY_LIST), &inst(TypeId::LIST), &r);
        assert_eq!(outcome, TypeCheckOutcome::Always);
    }

    #[test]
    fn partial_overlap_is_unknown() {
        let r = reg();
        let outcome = check_instance_of(&inst(TypeId::OBJECT), &inst(TypeId::STRING), &r);
        assert_eq!(outcome, TypeCheckOutcome::Unknown);
    }

    #[test]
    fn interface_vs_non_final_class_is_unknown() {
        let r = reg();
        let outcome = check_instance_of(&inst(TypeId::EXCEPTION), &inst(TypeId::LIST), &r);
        assert_eq!(outcome, TypeCheckOutcome::Unknown);
    }

    #[test]
    fn excluded_type_never_matches() {
        let r = reg();
        let value = TypeConstraint::not_instance_of(TypeId::LIST, &r);
        let outcome = check_instance_of(&value, &inst(TypeId::ARRAY_LIST), &r);
        assert_eq!(outcome, TypeCheckOutcome::Never);
    }

    // -----------------------------------------------------------------------
    // Lattice operations
    // -----------------------------------------------------------------------

    #[test]
    fn final_class_is_exact() {
        assert_eq!(inst(TypeId::STRING), TypeConstraint::Exact(TypeId::STRING));
        assert!(inst(TypeId::OBJECT).is_top());
    }

    #[test]
    fn meet_keeps_most_specific() {
        let r = reg();
        let m = inst(TypeId::COLLECTION).meet(&inst(TypeId::ARRAY_LIST), &r);
        assert_eq!(m, inst(TypeId::ARRAY_LIST));
    }

    #[test]
    fn meet_of_excluded_supertype_is_bottom() {
        let r = reg();
        let not_list = TypeConstraint::not_instance_of(TypeId::LIST, &r);
        assert!(inst(TypeId::ARRAY_LIST).meet(&not_list, &r).is_bottom());
    }

    #[test]
    fn join_finds_common_supertypes() {
        let r = reg();
        let j = inst(TypeId::INTEGER).join(&inst(TypeId::LONG), &r);
        let expected = TypeConstraint::Constrained {
            instance_of: BTreeSet::from([TypeId::NUMBER, TypeId::COMPARABLE]),
            not_instance_of: BTreeSet::new(),
        };
        assert_eq!(j, expected);
        assert!(inst(TypeId::INTEGER).is_subconstraint_of(&j, &r));
    }

    #[test]
    fn join_with_bottom_is_identity() {
        let r = reg();
        let list = inst(TypeId::LIST);
        assert_eq!(TypeConstraint::Bottom.join(&list, &r), list);
    }

    #[test]
    fn negation_round_trip() {
        let r = reg();
        let list = inst(TypeId::LIST);
        let negated = list.try_negate(&r).unwrap();
        assert_eq!(negated.try_negate(&r).unwrap(), list);
        assert_eq!(TypeConstraint::top().try_negate(&r), Some(TypeConstraint::Bottom));
    }

    #[test]
    fn user_final_class_implementing_interface() {
        let mut r = reg();
        let id = r
            .register(ClassDef::final_class("Impl", vec![TypeId::OBJECT, TypeId::LIST]))
            .unwrap();
        let value = TypeConstraint::instance_of(id, &r);
        let tested = TypeConstraint::instance_of(TypeId::COLLECTION, &r);
        assert_eq!(check_instance_of(&value, &tested, &r), TypeCheckOutcome::Always);
        let other = TypeConstraint::instance_of(TypeId::CHAR_SEQUENCE, &r);
        assert_eq!(check_instance_of(&value, &other, &r), TypeCheckOutcome::Never);
    }

    #[test]
    fn display_uses_class_names() {
        let r = reg();
        assert_eq!(inst(TypeId::STRING).display(&r), "exactly java.lang.String");
        assert_eq!(TypeConstraint::top().display(&r), "any");
    }

    fn builtin() -> impl Strategy<Value = TypeConstraint> {
        (0u32..27, any::<bool>()).prop_map(|(id, negate)| {
            let r = reg();
            let c = TypeConstraint::instance_of(TypeId(id), &r);
            if negate {
                c.try_negate(&r).unwrap_or(c)
            } else {
                c
            }
        })
    }

    proptest! {
        #[test]
        fn meet_is_commutative(a in builtin(), b in builtin()) {
            let r = reg();
            prop_assert_eq!(a.meet(&b, &r), b.meet(&a, &r));
        }

        #[test]
        fn join_contains_both(a in builtin(), b in builtin()) {
            let r = reg();
            let j = a.join(&b, &r);
            prop_assert!(a.is_subconstraint_of(&j, &r));
            prop_assert!(b.is_subconstraint_of(&j, &r));
        }

        #[test]
        fn meet_is_idempotent(a in builtin()) {
            let r = reg();
            prop_assert_eq!(a.meet(&a, &r), a);
        }
    }
}
