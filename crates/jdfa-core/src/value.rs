//! Interned values and the factory that owns them.
//!
//! Every value the engine reasons about (constants, variables, composite
//! expressions, typed placeholders) is created by one [`ValueFactory`] per
//! analysis run. The factory hash-conses values: structurally equal values
//! receive the same [`ValueId`], so identity comparison of handles is value
//! equality and memory states can key facts by handle.
//!
//! Values form a DAG: composites refer to their operands by handle, and a
//! variable may be qualified by another value (a field of `this`, the length
//! of an array held in a local).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constraint::TypeConstraint;
use crate::dftype::DfType;
use crate::id::ValueId;
use crate::instruction::Operand;
use crate::range::LongRangeSet;
use crate::type_id::{TypeId, TypeRegistry};
use crate::types::{ConstValue, FloatBits, JType, PrimitiveType};

/// Virtual fields the engine tracks on well-known classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialField {
    ArrayLength,
    StringLength,
    CollectionSize,
    /// Payload of an `Optional`; not null when present.
    OptionalValue,
    /// Primitive payload of a box.
    Unbox,
}

impl SpecialField {
    /// Returns `true` if the field cannot change while its qualifier stays
    /// the same object.
    pub fn is_stable(self) -> bool {
        !matches!(self, SpecialField::CollectionSize)
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialField::ArrayLength => "length",
            SpecialField::StringLength => "length()",
            SpecialField::CollectionSize => "size()",
            SpecialField::OptionalValue => "get()",
            SpecialField::Unbox => "unbox",
        }
    }
}

/// Storage location identified by a variable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableDescriptor {
    Local { name: String, ty: JType },
    Parameter { index: usize, name: String, ty: JType },
    This { class: TypeId },
    /// Instance or static field; `stable` fields survive field flushes.
    Field { name: String, ty: JType, stable: bool },
    Special(SpecialField),
    /// Synthetic slot for a value living on the operand stack.
    StackTemp { index: usize, ty: JType },
}

impl VariableDescriptor {
    /// Returns `true` if an opaque call cannot change the variable.
    pub fn is_stable(&self) -> bool {
        match self {
            VariableDescriptor::Field { stable, .. } => *stable,
            VariableDescriptor::Special(field) => field.is_stable(),
            _ => true,
        }
    }

    /// Returns `true` for fields, including special fields.
    pub fn is_field(&self) -> bool {
        matches!(
            self,
            VariableDescriptor::Field { .. } | VariableDescriptor::Special(_)
        )
    }
}

/// Arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Plus,
    Minus,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
        }
    }
}

/// Relations between two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    InstanceOf,
    NotInstanceOf,
}

impl RelationType {
    pub fn negate(self) -> RelationType {
        match self {
            RelationType::Eq => RelationType::Ne,
            RelationType::Ne => RelationType::Eq,
            RelationType::Lt => RelationType::Ge,
            RelationType::Ge => RelationType::Lt,
            RelationType::Le => RelationType::Gt,
            RelationType::Gt => RelationType::Le,
            RelationType::InstanceOf => RelationType::NotInstanceOf,
            RelationType::NotInstanceOf => RelationType::InstanceOf,
        }
    }

    /// The relation with operands swapped, if it is symmetric in form.
    pub fn flip(self) -> Option<RelationType> {
        match self {
            RelationType::Eq | RelationType::Ne => Some(self),
            RelationType::Lt => Some(RelationType::Gt),
            RelationType::Gt => Some(RelationType::Lt),
            RelationType::Le => Some(RelationType::Ge),
            RelationType::Ge => Some(RelationType::Le),
            RelationType::InstanceOf | RelationType::NotInstanceOf => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelationType::Eq => "==",
            RelationType::Ne => "!=",
            RelationType::Lt => "<",
            RelationType::Le => "<=",
            RelationType::Gt => ">",
            RelationType::Ge => ">=",
            RelationType::InstanceOf => "instanceof",
            RelationType::NotInstanceOf => "!instanceof",
        }
    }

    /// Integers in `[lo, hi]` satisfying `x <rel> constant`.
    pub fn range_for(self, constant: i64, lo: i64, hi: i64) -> Option<LongRangeSet> {
        let full = LongRangeSet::range(lo, hi);
        Some(match self {
            RelationType::Eq => full.intersect(&LongRangeSet::point(constant)),
            RelationType::Ne => full.without(constant),
            RelationType::Lt if constant == i64::MIN => LongRangeSet::empty(),
            RelationType::Lt => full.intersect(&LongRangeSet::range(i64::MIN, constant - 1)),
            RelationType::Le => full.intersect(&LongRangeSet::range(i64::MIN, constant)),
            RelationType::Gt if constant == i64::MAX => LongRangeSet::empty(),
            RelationType::Gt => full.intersect(&LongRangeSet::range(constant + 1, i64::MAX)),
            RelationType::Ge => full.intersect(&LongRangeSet::range(constant, i64::MAX)),
            RelationType::InstanceOf | RelationType::NotInstanceOf => return None,
        })
    }
}

/// Structural content of an interned value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Top: nothing provable.
    Unknown,
    Constant {
        value: ConstValue,
        ty: JType,
    },
    Variable {
        descriptor: VariableDescriptor,
        qualifier: Option<ValueId>,
    },
    BinOp {
        left: ValueId,
        op: BinaryOp,
        right: ValueId,
        kind: PrimitiveType,
    },
    /// Boolean value of `left <relation> right`.
    Relation {
        left: ValueId,
        relation: RelationType,
        right: ValueId,
    },
    /// Result of boxing a primitive value.
    Boxed {
        inner: ValueId,
        box_class: TypeId,
    },
    /// A value known only through its fact.
    Typed(DfType),
}

/// Hash-consing arena for the values of one analysis run.
///
/// Ids are `u32`, so a factory holds at most [`ValueFactory::MAX_VALUES`]
/// values. Callers driving an open-ended run check [`ValueFactory::is_full`]
/// between steps; one step interns only a handful of values, so the id
/// space cannot wrap before they notice.
#[derive(Debug, Clone)]
pub struct ValueFactory {
    values: Vec<ValueKind>,
    interned: HashMap<ValueKind, ValueId>,
    types: TypeRegistry,
    limit: usize,
}

impl ValueFactory {
    /// Default and largest value limit.
    pub const MAX_VALUES: usize = 1 << 31;

    pub fn new(types: TypeRegistry) -> Self {
        ValueFactory {
            values: Vec::new(),
            interned: HashMap::new(),
            types,
            limit: Self::MAX_VALUES,
        }
    }

    /// Lowers the value limit reported by [`ValueFactory::is_full`].
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(Self::MAX_VALUES);
        self
    }

    /// Whether the factory reached its value limit.
    pub fn is_full(&self) -> bool {
        self.values.len() >= self.limit
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Number of distinct values created so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The structure of an interned value.
    ///
    /// Handles from another factory are a programming error; they resolve
    /// to [`ValueKind::Unknown`].
    pub fn kind(&self, id: ValueId) -> &ValueKind {
        static UNKNOWN: ValueKind = ValueKind::Unknown;
        self.values.get(id.index()).unwrap_or(&UNKNOWN)
    }

    fn intern(&mut self, kind: ValueKind) -> ValueId {
        if let Some(id) = self.interned.get(&kind) {
            return *id;
        }
        debug_assert!(self.values.len() < u32::MAX as usize, "value id space exhausted");
        let id = ValueId(self.values.len() as u32);
        self.values.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    // -----------------------------------------------------------------------
    // Leaf values
    // -----------------------------------------------------------------------

    pub fn get_unknown(&mut self) -> ValueId {
        self.intern(ValueKind::Unknown)
    }

    pub fn get_constant(&mut self, value: ConstValue, ty: JType) -> ValueId {
        // Integral constants are stored wrapped to their declared width.
        let value = match (&value, ty.as_primitive()) {
            (ConstValue::Int(v), Some(p)) if p.is_integral() => ConstValue::Int(p.wrap(*v)),
            _ => value,
        };
        self.intern(ValueKind::Constant { value, ty })
    }

    pub fn get_boolean(&mut self, value: bool) -> ValueId {
        self.get_constant(ConstValue::Bool(value), JType::BOOLEAN)
    }

    pub fn get_int(&mut self, value: i32) -> ValueId {
        self.get_constant(ConstValue::Int(value as i64), JType::INT)
    }

    pub fn get_long(&mut self, value: i64) -> ValueId {
        self.get_constant(ConstValue::Int(value), JType::LONG)
    }

    pub fn get_null(&mut self) -> ValueId {
        self.get_constant(ConstValue::Null, JType::Null)
    }

    pub fn get_variable(
        &mut self,
        descriptor: VariableDescriptor,
        qualifier: Option<ValueId>,
    ) -> ValueId {
        self.intern(ValueKind::Variable {
            descriptor,
            qualifier,
        })
    }

    /// A value carrying `df_type`. Constant facts produce the constant
    /// itself and `Top` produces the unknown value.
    pub fn get_type_value(&mut self, df_type: DfType) -> ValueId {
        if df_type.is_top() {
            return self.get_unknown();
        }
        if let (Some(value), Some(ty)) = (df_type.constant_value(), df_type.constant_type()) {
            return self.get_constant(value, ty);
        }
        self.intern(ValueKind::Typed(df_type))
    }

    pub fn get_boxed(&mut self, inner: ValueId, box_class: TypeId) -> ValueId {
        self.intern(ValueKind::Boxed { inner, box_class })
    }

    // -----------------------------------------------------------------------
    // Composites
    // -----------------------------------------------------------------------

    /// `left <op> right` in the arithmetic of `kind`, folded when both
    /// operands are constants.
    pub fn get_bin_op(
        &mut self,
        left: ValueId,
        op: BinaryOp,
        right: ValueId,
        kind: PrimitiveType,
    ) -> ValueId {
        match (self.constant_of(left), self.constant_of(right)) {
            (Some(ConstValue::Int(a)), Some(ConstValue::Int(b))) if kind.is_integral() => {
                match fold_integral(a, op, b, kind) {
                    Some(v) => self.get_constant(ConstValue::Int(v), JType::Primitive(kind)),
                    None => {
                        let df = DfType::from_jtype(&JType::Primitive(kind), &self.types);
                        self.get_type_value(df)
                    }
                }
            }
            (Some(a), Some(b)) if kind.is_floating() => {
                let folded = match (as_f64(&a), as_f64(&b)) {
                    (Some(x), Some(y)) => fold_floating(x, op, y, kind),
                    _ => None,
                };
                match folded {
                    Some(v) => self.get_constant(
                        ConstValue::Float(FloatBits::new(v)),
                        JType::Primitive(kind),
                    ),
                    None => {
                        let df = DfType::from_jtype(&JType::Primitive(kind), &self.types);
                        self.get_type_value(df)
                    }
                }
            }
            _ => self.intern(ValueKind::BinOp {
                left,
                op,
                right,
                kind,
            }),
        }
    }

    /// The boolean value of `left <relation> right`, folded when both
    /// operands are constants.
    pub fn get_relation(
        &mut self,
        left: ValueId,
        relation: RelationType,
        right: ValueId,
    ) -> ValueId {
        if let (Some(a), Some(b)) = (self.constant_of(left), self.constant_of(right)) {
            if let Some(result) = self.fold_relation(&a, relation, &b) {
                return self.get_boolean(result);
            }
        }
        self.intern(ValueKind::Relation {
            left,
            relation,
            right,
        })
    }

    /// The condition that holds exactly when `condition` does not.
    pub fn negate_condition(&mut self, condition: ValueId) -> ValueId {
        match self.kind(condition).clone() {
            ValueKind::Constant {
                value: ConstValue::Bool(b),
                ..
            } => self.get_boolean(!b),
            ValueKind::Relation {
                left,
                relation,
                right,
            } => self.get_relation(left, relation.negate(), right),
            _ => {
                let false_value = self.get_boolean(false);
                self.get_relation(condition, RelationType::Eq, false_value)
            }
        }
    }

    /// Interns an instruction operand.
    pub fn intern_operand(&mut self, operand: &Operand) -> ValueId {
        match operand {
            Operand::Constant { value, ty } => self.get_constant(value.clone(), ty.clone()),
            Operand::Variable { var, qualifier } => {
                let qualifier = qualifier.as_deref().map(|q| self.intern_operand(q));
                self.get_variable(var.clone(), qualifier)
            }
            Operand::Unknown => self.get_unknown(),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_variable(&self, id: ValueId) -> bool {
        matches!(self.kind(id), ValueKind::Variable { .. })
    }

    pub fn constant_of(&self, id: ValueId) -> Option<ConstValue> {
        match self.kind(id) {
            ValueKind::Constant { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    pub fn descriptor(&self, id: ValueId) -> Option<&VariableDescriptor> {
        match self.kind(id) {
            ValueKind::Variable { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    pub fn qualifier(&self, id: ValueId) -> Option<ValueId> {
        match self.kind(id) {
            ValueKind::Variable { qualifier, .. } => *qualifier,
            _ => None,
        }
    }

    /// Returns `true` if `target` appears in the qualifier chain of `id`.
    pub fn qualifier_chain_contains(&self, id: ValueId, target: ValueId) -> bool {
        let mut current = self.qualifier(id);
        while let Some(q) = current {
            if q == target {
                return true;
            }
            current = self.qualifier(q);
        }
        false
    }

    /// Static type of a value, when one is known.
    pub fn value_type(&self, id: ValueId) -> Option<JType> {
        match self.kind(id) {
            ValueKind::Unknown => None,
            ValueKind::Constant { ty, .. } => Some(ty.clone()),
            ValueKind::Variable {
                descriptor,
                qualifier,
            } => match descriptor {
                VariableDescriptor::Local { ty, .. }
                | VariableDescriptor::Parameter { ty, .. }
                | VariableDescriptor::Field { ty, .. }
                | VariableDescriptor::StackTemp { ty, .. } => Some(ty.clone()),
                VariableDescriptor::This { class } => Some(JType::Class(*class)),
                VariableDescriptor::Special(SpecialField::OptionalValue) => Some(JType::OBJECT),
                VariableDescriptor::Special(SpecialField::Unbox) => qualifier
                    .and_then(|q| self.value_type(q))
                    .and_then(|t| t.as_class())
                    .and_then(PrimitiveType::from_box_class)
                    .map(JType::Primitive),
                VariableDescriptor::Special(_) => Some(JType::INT),
            },
            ValueKind::BinOp { kind, .. } => Some(JType::Primitive(*kind)),
            ValueKind::Relation { .. } => Some(JType::BOOLEAN),
            ValueKind::Boxed { box_class, .. } => Some(JType::Class(*box_class)),
            ValueKind::Typed(df) => match df {
                DfType::Boolean(_) => Some(JType::BOOLEAN),
                DfType::Integral { kind, .. } | DfType::Floating { kind, .. } => {
                    Some(JType::Primitive(*kind))
                }
                DfType::Reference(r) => match &r.constraint {
                    TypeConstraint::Exact(id) => Some(JType::Class(*id)),
                    TypeConstraint::Constrained { instance_of, .. } if instance_of.len() == 1 => {
                        instance_of.first().map(|id| JType::Class(*id))
                    }
                    _ => Some(JType::OBJECT),
                },
                _ => None,
            },
        }
    }

    /// The fact a value carries before any state narrows it.
    pub fn intrinsic_df_type(&self, id: ValueId) -> DfType {
        match self.kind(id) {
            ValueKind::Unknown => DfType::Top,
            ValueKind::Constant { value, ty } => DfType::constant(value, ty),
            ValueKind::Variable { descriptor, .. } => match descriptor {
                VariableDescriptor::This { class } => {
                    DfType::not_null(TypeConstraint::instance_of(*class, &self.types))
                }
                VariableDescriptor::Special(
                    SpecialField::ArrayLength
                    | SpecialField::StringLength
                    | SpecialField::CollectionSize,
                ) => DfType::range(PrimitiveType::Int, LongRangeSet::range(0, i32::MAX as i64)),
                VariableDescriptor::Special(SpecialField::OptionalValue) => {
                    DfType::not_null_object()
                }
                _ => match self.value_type(id) {
                    Some(ty) => DfType::from_jtype(&ty, &self.types),
                    None => DfType::Top,
                },
            },
            ValueKind::BinOp { kind, .. } => DfType::from_jtype(&JType::Primitive(*kind), &self.types),
            ValueKind::Relation { .. } => DfType::Boolean(None),
            ValueKind::Boxed { box_class, .. } => {
                DfType::not_null(TypeConstraint::Exact(*box_class))
            }
            ValueKind::Typed(df) => df.clone(),
        }
    }

    /// Short human-readable rendering of a value.
    pub fn describe(&self, id: ValueId) -> String {
        match self.kind(id) {
            ValueKind::Unknown => "?".to_string(),
            ValueKind::Constant { value, .. } => value.to_string(),
            ValueKind::Variable {
                descriptor,
                qualifier,
            } => {
                let name = match descriptor {
                    VariableDescriptor::Local { name, .. }
                    | VariableDescriptor::Parameter { name, .. }
                    | VariableDescriptor::Field { name, .. } => name.clone(),
                    VariableDescriptor::This { .. } => "this".to_string(),
                    VariableDescriptor::Special(field) => field.name().to_string(),
                    VariableDescriptor::StackTemp { index, .. } => format!("$tmp{}", index),
                };
                match qualifier {
                    Some(q) => format!("{}.{}", self.describe(*q), name),
                    None => name,
                }
            }
            ValueKind::BinOp {
                left, op, right, ..
            } => format!(
                "({} {} {})",
                self.describe(*left),
                op.symbol(),
                self.describe(*right)
            ),
            ValueKind::Relation {
                left,
                relation,
                right,
            } => format!(
                "{} {} {}",
                self.describe(*left),
                relation.symbol(),
                self.describe(*right)
            ),
            ValueKind::Boxed { inner, box_class } => {
                format!("box<{}>({})", self.types.name(*box_class), self.describe(*inner))
            }
            ValueKind::Typed(df) => format!("<{}>", df.display(&self.types)),
        }
    }

    fn fold_relation(&self, a: &ConstValue, relation: RelationType, b: &ConstValue) -> Option<bool> {
        use std::cmp::Ordering;

        let ordering = match (a, b) {
            (ConstValue::Int(x), ConstValue::Int(y)) => Some(x.cmp(y)),
            (ConstValue::Float(_) | ConstValue::Int(_), ConstValue::Float(_) | ConstValue::Int(_)) => {
                let (x, y) = (as_f64(a)?, as_f64(b)?);
                if x.is_nan() || y.is_nan() {
                    return Some(relation == RelationType::Ne);
                }
                x.partial_cmp(&y)
            }
            _ => None,
        };
        if let Some(ordering) = ordering {
            return match relation {
                RelationType::Eq => Some(ordering == Ordering::Equal),
                RelationType::Ne => Some(ordering != Ordering::Equal),
                RelationType::Lt => Some(ordering == Ordering::Less),
                RelationType::Le => Some(ordering != Ordering::Greater),
                RelationType::Gt => Some(ordering == Ordering::Greater),
                RelationType::Ge => Some(ordering != Ordering::Less),
                RelationType::InstanceOf | RelationType::NotInstanceOf => None,
            };
        }
        match (a, relation, b) {
            (ConstValue::Bool(x), RelationType::Eq, ConstValue::Bool(y)) => Some(x == y),
            (ConstValue::Bool(x), RelationType::Ne, ConstValue::Bool(y)) => Some(x != y),
            (ConstValue::Null, RelationType::Eq, other) | (other, RelationType::Eq, ConstValue::Null) => {
                Some(*other == ConstValue::Null)
            }
            (ConstValue::Null, RelationType::Ne, other) | (other, RelationType::Ne, ConstValue::Null) => {
                Some(*other != ConstValue::Null)
            }
            (ConstValue::Null, RelationType::InstanceOf, _) => Some(false),
            (ConstValue::Null, RelationType::NotInstanceOf, _) => Some(true),
            (ConstValue::Str(_), RelationType::InstanceOf, ConstValue::Class(c)) => {
                Some(self.types.is_subtype(TypeId::STRING, *c))
            }
            (ConstValue::Str(_), RelationType::NotInstanceOf, ConstValue::Class(c)) => {
                Some(!self.types.is_subtype(TypeId::STRING, *c))
            }
            (ConstValue::Class(x), RelationType::Eq, ConstValue::Class(y)) => Some(x == y),
            (ConstValue::Class(x), RelationType::Ne, ConstValue::Class(y)) => Some(x != y),
            _ => None,
        }
    }
}

fn as_f64(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Int(v) => Some(*v as f64),
        ConstValue::Float(bits) => Some(bits.get()),
        _ => None,
    }
}

/// Integral arithmetic with the width and shift masking of `kind`.
/// Sub-int kinds compute in int arithmetic. `None` on division by zero.
fn fold_integral(a: i64, op: BinaryOp, b: i64, kind: PrimitiveType) -> Option<i64> {
    let wide = kind == PrimitiveType::Long;
    let shift_mask = if wide { 63 } else { 31 };
    let result = match op {
        BinaryOp::Plus => a.wrapping_add(b),
        BinaryOp::Minus => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => return None,
        BinaryOp::Div if wide => a.wrapping_div(b),
        BinaryOp::Div => (a as i32).wrapping_div(b as i32) as i64,
        BinaryOp::Rem if b == 0 => return None,
        BinaryOp::Rem if wide => a.wrapping_rem(b),
        BinaryOp::Rem => (a as i32).wrapping_rem(b as i32) as i64,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl if wide => a.wrapping_shl((b & shift_mask) as u32),
        BinaryOp::Shl => (a as i32).wrapping_shl((b & shift_mask) as u32) as i64,
        BinaryOp::Shr if wide => a.wrapping_shr((b & shift_mask) as u32),
        BinaryOp::Shr => (a as i32).wrapping_shr((b & shift_mask) as u32) as i64,
        BinaryOp::UShr if wide => ((a as u64) >> (b & shift_mask)) as i64,
        BinaryOp::UShr => ((a as i32 as u32) >> (b & shift_mask)) as i32 as i64,
    };
    let kind = if wide { kind } else { PrimitiveType::Int };
    Some(kind.wrap(result))
}

/// Floating arithmetic; float operands compute in single precision.
/// `None` for operators without a floating meaning.
fn fold_floating(a: f64, op: BinaryOp, b: f64, kind: PrimitiveType) -> Option<f64> {
    if kind == PrimitiveType::Float {
        let (x, y) = (a as f32, b as f32);
        let r = match op {
            BinaryOp::Plus => x + y,
            BinaryOp::Minus => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            BinaryOp::Rem => x % y,
            _ => return None,
        };
        return Some(r as f64);
    }
    Some(match op {
        BinaryOp::Plus => a + b,
        BinaryOp::Minus => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dftype::Nullability;

    fn factory() -> ValueFactory {
        ValueFactory::new(TypeRegistry::new())
    }

    fn local(name: &str, ty: JType) -> VariableDescriptor {
        VariableDescriptor::Local {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn constants_are_interned() {
        let mut f = factory();
        let a = f.get_constant(ConstValue::Int(42), JType::INT);
        let b = f.get_constant(ConstValue::Int(42), JType::INT);
        assert_eq!(a, b);
        assert_eq!(f.get_boolean(true), f.get_boolean(true));
        assert_ne!(f.get_int(1), f.get_long(1));
        assert_eq!(f.len(), 4);
    }

    #[test]
    fn variables_are_interned_with_qualifier() {
        let mut f = factory();
        let arr = f.get_variable(local("a", JType::OBJECT), None);
        let len1 = f.get_variable(VariableDescriptor::Special(SpecialField::ArrayLength), Some(arr));
        let len2 = f.get_variable(VariableDescriptor::Special(SpecialField::ArrayLength), Some(arr));
        assert_eq!(len1, len2);
        assert!(f.qualifier_chain_contains(len1, arr));
        assert!(!f.qualifier_chain_contains(arr, len1));
    }

    #[test]
    fn bin_op_folds_constants() {
        let mut f = factory();
        let a = f.get_int(i32::MAX);
        let b = f.get_int(1);
        let sum = f.get_bin_op(a, BinaryOp::Plus, b, PrimitiveType::Int);
        assert_eq!(f.constant_of(sum), Some(ConstValue::Int(i32::MIN as i64)));

        let minus_one = f.get_int(-1);
        let shift = f.get_int(28);
        let shifted = f.get_bin_op(minus_one, BinaryOp::UShr, shift, PrimitiveType::Int);
        assert_eq!(f.constant_of(shifted), Some(ConstValue::Int(15)));
    }

    #[test]
    fn division_by_zero_is_unknown_int() {
        let mut f = factory();
        let a = f.get_int(1);
        let zero = f.get_int(0);
        let q = f.get_bin_op(a, BinaryOp::Div, zero, PrimitiveType::Int);
        assert_eq!(f.constant_of(q), None);
        assert_eq!(f.value_type(q), Some(JType::INT));
    }

    #[test]
    fn bin_op_over_variable_is_interned() {
        let mut f = factory();
        let x = f.get_variable(local("x", JType::INT), None);
        let one = f.get_int(1);
        let a = f.get_bin_op(x, BinaryOp::Plus, one, PrimitiveType::Int);
        let b = f.get_bin_op(x, BinaryOp::Plus, one, PrimitiveType::Int);
        assert_eq!(a, b);
        assert_eq!(f.describe(a), "(x + 1)");
    }

    #[test]
    fn relation_folding() {
        let mut f = factory();
        let null = f.get_null();
        let s = f.get_constant(ConstValue::Str("x".into()), JType::STRING);
        let eq = f.get_relation(null, RelationType::Eq, s);
        assert_eq!(f.constant_of(eq), Some(ConstValue::Bool(false)));
        let three = f.get_int(3);
        let five = f.get_int(5);
        let lt = f.get_relation(three, RelationType::Lt, five);
        assert_eq!(lt, f.get_boolean(true));
    }

    #[test]
    fn negate_condition() {
        let mut f = factory();
        let x = f.get_variable(local("x", JType::OBJECT), None);
        let null = f.get_null();
        let is_null = f.get_relation(x, RelationType::Eq, null);
        let not_null = f.negate_condition(is_null);
        assert_eq!(
            f.kind(not_null),
            &ValueKind::Relation {
                left: x,
                relation: RelationType::Ne,
                right: null
            }
        );
        let t = f.get_boolean(true);
        assert_eq!(f.negate_condition(t), f.get_boolean(false));
    }

    #[test]
    fn type_value_of_constant_fact_is_constant() {
        let mut f = factory();
        let v = f.get_type_value(DfType::constant(&ConstValue::Int(7), &JType::INT));
        assert_eq!(v, f.get_int(7));
        assert_eq!(f.get_type_value(DfType::Top), f.get_unknown());
    }

    #[test]
    fn constants_wrap_to_declared_width() {
        let mut f = factory();
        let b = f.get_constant(ConstValue::Int(300), JType::Primitive(PrimitiveType::Byte));
        assert_eq!(f.constant_of(b), Some(ConstValue::Int(44)));
    }

    #[test]
    fn intrinsic_facts() {
        let mut f = factory();
        let this = f.get_variable(VariableDescriptor::This { class: TypeId::OBJECT }, None);
        assert_eq!(f.intrinsic_df_type(this).nullability(), Some(Nullability::NotNull));
        let s = f.get_variable(local("s", JType::STRING), None);
        let len = f.get_variable(VariableDescriptor::Special(SpecialField::StringLength), Some(s));
        assert_eq!(
            f.intrinsic_df_type(len).as_range().and_then(|r| r.min()),
            Some(0)
        );
        let boxed_int = f.get_variable(local("i", JType::Class(TypeId::INTEGER)), None);
        let unboxed = f.get_variable(VariableDescriptor::Special(SpecialField::Unbox), Some(boxed_int));
        assert_eq!(f.value_type(unboxed), Some(JType::INT));
    }

    #[test]
    fn intern_operand_resolves_qualifier() {
        let mut f = factory();
        let operand = Operand::Variable {
            var: VariableDescriptor::Field {
                name: "next".into(),
                ty: JType::OBJECT,
                stable: false,
            },
            qualifier: Some(Box::new(Operand::Variable {
                var: VariableDescriptor::This { class: TypeId::OBJECT },
                qualifier: None,
            })),
        };
        let a = f.intern_operand(&operand);
        let b = f.intern_operand(&operand);
        assert_eq!(a, b);
        assert_eq!(f.describe(a), "this.next");
    }

    #[test]
    fn limit_counts_distinct_values() {
        let mut f = factory().with_limit(2);
        f.get_int(1);
        f.get_int(1);
        assert!(!f.is_full());
        f.get_int(2);
        assert!(f.is_full());
        assert!(!factory().with_limit(usize::MAX).is_full());
    }
}
