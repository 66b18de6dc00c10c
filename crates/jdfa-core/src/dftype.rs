//! Dataflow facts attached to values inside a memory state.
//!
//! A [`DfType`] is an element of a product lattice: booleans carry an
//! optional constant, integral values carry a [`LongRangeSet`], floating
//! values an optional constant, and references carry a [`Nullability`], a
//! [`TypeConstraint`] and an optional literal payload. `Bottom` marks an
//! unreachable fact, `Top` carries no information.
//!
//! Facts of different categories (e.g. a boolean fact met with a range
//! fact) do not constrain each other: `meet` keeps the left fact and `join`
//! gives `Top`.

use serde::{Deserialize, Serialize};

use crate::constraint::TypeConstraint;
use crate::range::LongRangeSet;
use crate::type_id::{TypeId, TypeRegistry};
use crate::types::{ConstValue, FloatBits, JType, PrimitiveType};

/// What is known about a reference being null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nullability {
    /// Always null.
    Null,
    /// Never null.
    NotNull,
    /// Known to be possibly null (e.g. a null flowed into it).
    Nullable,
    /// Nothing known.
    Unknown,
}

impl Nullability {
    /// Narrowing. `None` when the facts contradict each other.
    pub fn meet(self, other: Nullability) -> Option<Nullability> {
        use Nullability::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Null, NotNull) | (NotNull, Null) => None,
            (Null, _) | (_, Null) => Some(Null),
            (NotNull, _) | (_, NotNull) => Some(NotNull),
            _ => Some(Nullable),
        }
    }

    pub fn join(self, other: Nullability) -> Nullability {
        use Nullability::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Null, _) | (_, Null) | (Nullable, _) | (_, Nullable) => Nullable,
            _ => Unknown,
        }
    }

    /// Returns `true` unless the value is known to be non-null.
    pub fn may_be_null(self) -> bool {
        self != Nullability::NotNull
    }
}

/// Literal payload of a reference constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefConstant {
    Str(String),
    Class(TypeId),
}

/// Facts about a reference value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceFact {
    pub nullability: Nullability,
    /// Runtime class constraint of the value when it is not null.
    pub constraint: TypeConstraint,
    pub constant: Option<RefConstant>,
}

/// An abstract fact about a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfType {
    /// No value: the state holding this fact is unreachable.
    Bottom,
    /// Nothing is known.
    Top,
    Boolean(Option<bool>),
    Integral {
        kind: PrimitiveType,
        range: LongRangeSet,
    },
    Floating {
        kind: PrimitiveType,
        constant: Option<FloatBits>,
    },
    Reference(ReferenceFact),
}

impl DfType {
    pub const TRUE: DfType = DfType::Boolean(Some(true));
    pub const FALSE: DfType = DfType::Boolean(Some(false));

    /// The `null` literal.
    pub fn null() -> Self {
        DfType::Reference(ReferenceFact {
            nullability: Nullability::Null,
            constraint: TypeConstraint::top(),
            constant: None,
        })
    }

    /// A non-null reference with the given class constraint.
    pub fn not_null(constraint: TypeConstraint) -> Self {
        DfType::reference(Nullability::NotNull, constraint)
    }

    /// Any non-null object.
    pub fn not_null_object() -> Self {
        DfType::not_null(TypeConstraint::top())
    }

    pub fn reference(nullability: Nullability, constraint: TypeConstraint) -> Self {
        if nullability == Nullability::Null {
            return DfType::null();
        }
        if constraint.is_bottom() {
            // Only null satisfies an empty class set.
            return if nullability == Nullability::NotNull {
                DfType::Bottom
            } else {
                DfType::null()
            };
        }
        DfType::Reference(ReferenceFact {
            nullability,
            constraint,
            constant: None,
        })
    }

    /// Integral range fact.
    pub fn range(kind: PrimitiveType, range: LongRangeSet) -> Self {
        if range.is_empty() {
            DfType::Bottom
        } else {
            DfType::Integral { kind, range }
        }
    }

    /// The least informative fact for a value of static type `ty`.
    pub fn from_jtype(ty: &JType, reg: &TypeRegistry) -> Self {
        match ty {
            JType::Primitive(PrimitiveType::Boolean) => DfType::Boolean(None),
            JType::Primitive(p) if p.is_integral() => DfType::Integral {
                kind: *p,
                range: LongRangeSet::of_type(*p),
            },
            JType::Primitive(p) => DfType::Floating {
                kind: *p,
                constant: None,
            },
            JType::Class(id) => DfType::Reference(ReferenceFact {
                nullability: Nullability::Unknown,
                constraint: TypeConstraint::instance_of(*id, reg),
                constant: None,
            }),
            JType::Null => DfType::null(),
            JType::Void => DfType::Top,
        }
    }

    /// The fact describing exactly the constant `value` of type `ty`.
    pub fn constant(value: &ConstValue, ty: &JType) -> Self {
        match value {
            ConstValue::Null => DfType::null(),
            ConstValue::Bool(b) => DfType::Boolean(Some(*b)),
            ConstValue::Int(v) => {
                let kind = ty
                    .as_primitive()
                    .filter(|p| p.is_integral())
                    .unwrap_or(PrimitiveType::Long);
                DfType::Integral {
                    kind,
                    range: LongRangeSet::point(*v),
                }
            }
            ConstValue::Float(bits) => DfType::Floating {
                kind: ty
                    .as_primitive()
                    .filter(|p| p.is_floating())
                    .unwrap_or(PrimitiveType::Double),
                constant: Some(*bits),
            },
            ConstValue::Str(s) => DfType::Reference(ReferenceFact {
                nullability: Nullability::NotNull,
                constraint: TypeConstraint::Exact(TypeId::STRING),
                constant: Some(RefConstant::Str(s.clone())),
            }),
            ConstValue::Class(id) => DfType::Reference(ReferenceFact {
                nullability: Nullability::NotNull,
                constraint: TypeConstraint::Exact(TypeId::CLASS),
                constant: Some(RefConstant::Class(*id)),
            }),
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, DfType::Bottom)
    }

    pub fn is_top(&self) -> bool {
        matches!(self, DfType::Top)
    }

    pub fn nullability(&self) -> Option<Nullability> {
        match self {
            DfType::Reference(r) => Some(r.nullability),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceFact> {
        match self {
            DfType::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&LongRangeSet> {
        match self {
            DfType::Integral { range, .. } => Some(range),
            _ => None,
        }
    }

    /// The single concrete value this fact describes, if any.
    pub fn constant_value(&self) -> Option<ConstValue> {
        match self {
            DfType::Boolean(Some(b)) => Some(ConstValue::Bool(*b)),
            DfType::Integral { range, .. } => range.as_constant().map(ConstValue::Int),
            DfType::Floating {
                constant: Some(bits),
                ..
            } => Some(ConstValue::Float(*bits)),
            DfType::Reference(r) => match (&r.nullability, &r.constant) {
                (Nullability::Null, _) => Some(ConstValue::Null),
                (_, Some(RefConstant::Str(s))) => Some(ConstValue::Str(s.clone())),
                (_, Some(RefConstant::Class(id))) => Some(ConstValue::Class(*id)),
                _ => None,
            },
            _ => None,
        }
    }

    /// The static type implied by a constant fact.
    pub fn constant_type(&self) -> Option<JType> {
        match self {
            DfType::Boolean(Some(_)) => Some(JType::BOOLEAN),
            DfType::Integral { kind, range } if range.as_constant().is_some() => {
                Some(JType::Primitive(*kind))
            }
            DfType::Floating {
                kind,
                constant: Some(_),
            } => Some(JType::Primitive(*kind)),
            DfType::Reference(r) => match (&r.nullability, &r.constant) {
                (Nullability::Null, _) => Some(JType::Null),
                (_, Some(RefConstant::Str(_))) => Some(JType::STRING),
                (_, Some(RefConstant::Class(_))) => Some(JType::Class(TypeId::CLASS)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Intersection of two facts.
    pub fn meet(&self, other: &DfType, reg: &TypeRegistry) -> DfType {
        match (self, other) {
            (DfType::Bottom, _) | (_, DfType::Bottom) => DfType::Bottom,
            (DfType::Top, x) | (x, DfType::Top) => x.clone(),
            (DfType::Boolean(a), DfType::Boolean(b)) => match (a, b) {
                (None, x) | (x, None) => DfType::Boolean(*x),
                (Some(a), Some(b)) if a == b => DfType::Boolean(Some(*a)),
                _ => DfType::Bottom,
            },
            (DfType::Integral { kind, range: a }, DfType::Integral { range: b, .. }) => {
                DfType::range(*kind, a.intersect(b))
            }
            (
                DfType::Floating { kind, constant: a },
                DfType::Floating { constant: b, .. },
            ) => match (a, b) {
                (None, x) | (x, None) => DfType::Floating {
                    kind: *kind,
                    constant: *x,
                },
                (Some(a), Some(b)) if a == b => DfType::Floating {
                    kind: *kind,
                    constant: Some(*a),
                },
                _ => DfType::Bottom,
            },
            (DfType::Reference(a), DfType::Reference(b)) => meet_references(a, b, reg),
            _ => self.clone(),
        }
    }

    /// Smallest fact containing both.
    pub fn join(&self, other: &DfType, reg: &TypeRegistry) -> DfType {
        match (self, other) {
            (DfType::Bottom, x) | (x, DfType::Bottom) => x.clone(),
            (DfType::Top, _) | (_, DfType::Top) => DfType::Top,
            (DfType::Boolean(a), DfType::Boolean(b)) => {
                DfType::Boolean(if a == b { *a } else { None })
            }
            (DfType::Integral { kind, range: a }, DfType::Integral { range: b, .. }) => {
                DfType::Integral {
                    kind: *kind,
                    range: a.unite(b),
                }
            }
            (
                DfType::Floating { kind, constant: a },
                DfType::Floating { constant: b, .. },
            ) => DfType::Floating {
                kind: *kind,
                constant: if a == b { *a } else { None },
            },
            (DfType::Reference(a), DfType::Reference(b)) => join_references(a, b, reg),
            _ => DfType::Top,
        }
    }

    /// Join that forces termination on growing integral ranges.
    pub fn widen(&self, next: &DfType, reg: &TypeRegistry) -> DfType {
        match (self, next) {
            (DfType::Integral { kind, range: a }, DfType::Integral { range: b, .. }) => {
                DfType::Integral {
                    kind: *kind,
                    range: a.widen(b, *kind),
                }
            }
            (DfType::Floating { kind, constant: a }, DfType::Floating { constant: b, .. })
                if a != b =>
            {
                DfType::Floating {
                    kind: *kind,
                    constant: None,
                }
            }
            _ => self.join(next, reg),
        }
    }

    /// The complement of this fact within its category, when representable.
    pub fn try_negate(&self, reg: &TypeRegistry) -> Option<DfType> {
        match self {
            DfType::Bottom => Some(DfType::Top),
            DfType::Top => Some(DfType::Bottom),
            DfType::Boolean(Some(b)) => Some(DfType::Boolean(Some(!b))),
            DfType::Boolean(None) => Some(DfType::Bottom),
            DfType::Integral { kind, range } => {
                Some(DfType::range(*kind, range.complement_in(*kind)))
            }
            DfType::Floating { .. } => None,
            DfType::Reference(r) => {
                if r.constant.is_some() {
                    return None;
                }
                match r.nullability {
                    Nullability::Null => Some(DfType::not_null_object()),
                    Nullability::NotNull if r.constraint.is_top() => Some(DfType::null()),
                    // Not an instance of C, including null.
                    Nullability::Nullable | Nullability::Unknown => r
                        .constraint
                        .try_negate(reg)
                        .filter(|c| !c.is_bottom())
                        .map(|c| DfType::reference(Nullability::Nullable, c)),
                    Nullability::NotNull => None,
                }
            }
        }
    }

    /// Returns `true` if every value described by `other` is described by
    /// `self`.
    pub fn is_superset_of(&self, other: &DfType, reg: &TypeRegistry) -> bool {
        self.join(other, reg) == *self
    }

    /// Human-readable rendering, with class names resolved through `reg`.
    pub fn display(&self, reg: &TypeRegistry) -> String {
        match self {
            DfType::Bottom => "⊥".to_string(),
            DfType::Top => "⊤".to_string(),
            DfType::Boolean(Some(b)) => b.to_string(),
            DfType::Boolean(None) => "boolean".to_string(),
            DfType::Integral { kind, range } => match range.as_constant() {
                Some(v) => format!("{}", v),
                None => format!("{} in {}", kind, range),
            },
            DfType::Floating {
                constant: Some(bits),
                ..
            } => format!("{}", bits.get()),
            DfType::Floating { kind, .. } => kind.to_string(),
            DfType::Reference(r) => {
                if let Some(constant) = self.constant_value() {
                    return constant.to_string();
                }
                let nullability = match r.nullability {
                    Nullability::Null => "null",
                    Nullability::NotNull => "!null",
                    Nullability::Nullable => "nullable",
                    Nullability::Unknown => "",
                };
                let constraint = r.constraint.display(reg);
                if nullability.is_empty() {
                    constraint
                } else {
                    format!("{} {}", nullability, constraint)
                }
            }
        }
    }
}

impl Default for DfType {
    fn default() -> Self {
        DfType::Top
    }
}

fn meet_references(a: &ReferenceFact, b: &ReferenceFact, reg: &TypeRegistry) -> DfType {
    let Some(nullability) = a.nullability.meet(b.nullability) else {
        return DfType::Bottom;
    };
    let constant = match (&a.constant, &b.constant) {
        (Some(x), Some(y)) if x != y => return DfType::Bottom,
        (Some(x), _) | (_, Some(x)) => Some(x.clone()),
        _ => None,
    };
    if nullability == Nullability::Null {
        return if constant.is_some() {
            DfType::Bottom
        } else {
            DfType::null()
        };
    }
    let constraint = a.constraint.meet(&b.constraint, reg);
    if constraint.is_bottom() {
        return if nullability == Nullability::NotNull || constant.is_some() {
            DfType::Bottom
        } else {
            DfType::null()
        };
    }
    DfType::Reference(ReferenceFact {
        nullability: if constant.is_some() {
            Nullability::NotNull
        } else {
            nullability
        },
        constraint,
        constant,
    })
}

fn join_references(a: &ReferenceFact, b: &ReferenceFact, reg: &TypeRegistry) -> DfType {
    let nullability = a.nullability.join(b.nullability);
    // The class constraint of null is vacuous.
    let constraint = match (a.nullability, b.nullability) {
        (Nullability::Null, _) => b.constraint.clone(),
        (_, Nullability::Null) => a.constraint.clone(),
        _ => a.constraint.join(&b.constraint, reg),
    };
    let constant = match (&a.constant, &b.constant) {
        (Some(x), Some(y)) if x == y => Some(x.clone()),
        _ => None,
    };
    DfType::Reference(ReferenceFact {
        nullability,
        constraint,
        constant,
    })
}
