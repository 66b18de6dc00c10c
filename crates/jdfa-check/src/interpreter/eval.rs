//! Evaluation of [`EvalOp`] computations.
//!
//! Evaluations never fail: whatever cannot be decided produces a value
//! carrying the least informative fact for the result type.

use jdfa_core::constraint::check_instance_of;
use jdfa_core::{
    BinaryOp, ConstValue, DfType, EvalOp, FloatBits, JType, PrimitiveType, RelationType,
    TypeCheckOutcome, TypeConstraint, TypeId, ValueFactory, ValueId, ValueKind,
};

use crate::state::{instance_check, MemoryState};

/// Computes `op` over `args`, given in push order.
pub(crate) fn evaluate(
    factory: &mut ValueFactory,
    state: &MemoryState,
    op: &EvalOp,
    args: &[ValueId],
) -> ValueId {
    match (op, args) {
        (EvalOp::Binary { op, kind }, [left, right]) => {
            binary(factory, state, *left, *op, *right, *kind)
        }
        (EvalOp::Relation { relation }, [left, right]) => {
            match state.check_relation(factory, *left, *relation, *right) {
                Some(known) => factory.get_boolean(known),
                None => factory.get_relation(*left, *relation, *right),
            }
        }
        (EvalOp::Not, [operand]) => match state.get_df_type(factory, *operand) {
            DfType::Boolean(Some(b)) => factory.get_boolean(!b),
            _ => factory.negate_condition(*operand),
        },
        (EvalOp::StringConcat, [left, right]) => concat(factory, state, *left, *right),
        (EvalOp::InstanceOf { cast_type: Some(class) }, [value]) => {
            instance_of(factory, state, *value, *class)
        }
        (EvalOp::InstanceOf { cast_type: None }, [value, class_value]) => {
            match class_constant(factory, state, *class_value) {
                Some(class) => instance_of(factory, state, *value, class),
                None => factory.get_relation(*value, RelationType::InstanceOf, *class_value),
            }
        }
        (EvalOp::IsAssignable, [sub, sup]) => is_assignable(factory, state, *sub, *sup),
        (EvalOp::PrimitiveConversion { target }, [value]) => {
            convert(factory, state, *value, *target)
        }
        _ => factory.get_unknown(),
    }
}

fn binary(
    factory: &mut ValueFactory,
    state: &MemoryState,
    left: ValueId,
    op: BinaryOp,
    right: ValueId,
    kind: PrimitiveType,
) -> ValueId {
    // Fold through the state when both sides are known exactly.
    let constants = (
        constant_in_state(factory, state, left),
        constant_in_state(factory, state, right),
    );
    match constants {
        (Some((a, a_ty)), Some((b, b_ty))) => {
            let a = factory.get_constant(a, a_ty);
            let b = factory.get_constant(b, b_ty);
            factory.get_bin_op(a, op, b, kind)
        }
        _ => factory.get_bin_op(left, op, right, kind),
    }
}

fn constant_in_state(
    factory: &ValueFactory,
    state: &MemoryState,
    value: ValueId,
) -> Option<(ConstValue, JType)> {
    let df = state.get_df_type(factory, value);
    Some((df.constant_value()?, df.constant_type()?))
}

fn concat(factory: &mut ValueFactory, state: &MemoryState, left: ValueId, right: ValueId) -> ValueId {
    match (
        concat_text(factory, state, left),
        concat_text(factory, state, right),
    ) {
        (Some(a), Some(b)) => factory.get_constant(ConstValue::Str(a + &b), JType::STRING),
        _ => factory.get_type_value(DfType::not_null(TypeConstraint::Exact(TypeId::STRING))),
    }
}

/// String form of a constant operand, for the types whose rendering is
/// unambiguous.
fn concat_text(factory: &ValueFactory, state: &MemoryState, value: ValueId) -> Option<String> {
    let (constant, ty) = constant_in_state(factory, state, value)?;
    match (constant, ty) {
        (ConstValue::Str(s), _) => Some(s),
        (ConstValue::Bool(b), _) => Some(b.to_string()),
        (ConstValue::Null, _) => Some("null".to_string()),
        (
            ConstValue::Int(v),
            JType::Primitive(
                PrimitiveType::Int | PrimitiveType::Long | PrimitiveType::Short | PrimitiveType::Byte,
            ),
        ) => Some(v.to_string()),
        _ => None,
    }
}

fn instance_of(factory: &mut ValueFactory, state: &MemoryState, value: ValueId, class: TypeId) -> ValueId {
    let fact = state.get_df_type(factory, value);
    match instance_check(&fact, class, factory.types()) {
        Some(known) => factory.get_boolean(known),
        None => {
            let class_value =
                factory.get_constant(ConstValue::Class(class), JType::Class(TypeId::CLASS));
            factory.get_relation(value, RelationType::InstanceOf, class_value)
        }
    }
}

fn class_constant(factory: &ValueFactory, state: &MemoryState, value: ValueId) -> Option<TypeId> {
    match state.get_df_type(factory, value).constant_value() {
        Some(ConstValue::Class(id)) => Some(id),
        _ => None,
    }
}

/// `sup.isAssignableFrom(sub)` over two class literals.
fn is_assignable(factory: &mut ValueFactory, state: &MemoryState, sub: ValueId, sup: ValueId) -> ValueId {
    let classes = (
        class_constant(factory, state, sub),
        class_constant(factory, state, sup),
    );
    let (Some(sub), Some(sup)) = classes else {
        return factory.get_type_value(DfType::Boolean(None));
    };
    let reg = factory.types();
    let outcome = check_instance_of(
        &TypeConstraint::Exact(sub),
        &TypeConstraint::instance_of(sup, reg),
        reg,
    );
    match outcome {
        TypeCheckOutcome::Always => factory.get_boolean(true),
        TypeCheckOutcome::Never => factory.get_boolean(false),
        TypeCheckOutcome::Unknown => factory.get_type_value(DfType::Boolean(None)),
    }
}

fn convert(
    factory: &mut ValueFactory,
    state: &MemoryState,
    value: ValueId,
    target: PrimitiveType,
) -> ValueId {
    let source = factory.value_type(value).and_then(|t| t.as_primitive());
    if source == Some(target) {
        return value;
    }
    let fact = state.get_df_type(factory, value);
    if let Some(converted) = fact.constant_value().and_then(|c| convert_constant(&c, target)) {
        return factory.get_constant(converted, JType::Primitive(target));
    }
    match &fact {
        DfType::Integral { kind, range } if target.is_integral() => {
            let reduced = try_reduce_on_cast(factory, value, target);
            if reduced != value {
                return reduced;
            }
            if kind.is_lossless_widening_to(target) {
                return value;
            }
            factory.get_type_value(DfType::range(target, range.cast_to(target)))
        }
        _ => {
            let df = DfType::from_jtype(&JType::Primitive(target), factory.types());
            factory.get_type_value(df)
        }
    }
}

/// Applies a Java primitive conversion to a constant.
fn convert_constant(constant: &ConstValue, target: PrimitiveType) -> Option<ConstValue> {
    match (constant, target) {
        (ConstValue::Int(v), t) if t.is_integral() => Some(ConstValue::Int(t.wrap(*v))),
        (ConstValue::Int(v), PrimitiveType::Float) => {
            Some(ConstValue::Float(FloatBits::new(*v as f32 as f64)))
        }
        (ConstValue::Int(v), PrimitiveType::Double) => {
            Some(ConstValue::Float(FloatBits::new(*v as f64)))
        }
        (ConstValue::Float(bits), PrimitiveType::Long) => Some(ConstValue::Int(bits.get() as i64)),
        // Narrowing to sub-int types goes through int first.
        (ConstValue::Float(bits), t) if t.is_integral() => {
            Some(ConstValue::Int(t.wrap(bits.get() as i32 as i64)))
        }
        (ConstValue::Float(bits), PrimitiveType::Float) => {
            Some(ConstValue::Float(FloatBits::new(bits.get() as f32 as f64)))
        }
        (ConstValue::Float(bits), PrimitiveType::Double) => Some(ConstValue::Float(*bits)),
        _ => None,
    }
}

/// Narrows `(long) a op (long) b` cast back to `int` into `a op b` computed
/// in int arithmetic, when the low 32 bits do not depend on the high ones.
///
/// Returns `value` unchanged when no such rewrite applies.
pub(crate) fn try_reduce_on_cast(
    factory: &mut ValueFactory,
    value: ValueId,
    target: PrimitiveType,
) -> ValueId {
    if target != PrimitiveType::Int {
        return value;
    }
    let ValueKind::BinOp {
        left,
        op,
        right,
        kind: PrimitiveType::Long,
    } = factory.kind(value).clone()
    else {
        return value;
    };
    if !matches!(
        op,
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
    ) {
        return value;
    }
    match (narrow_to_int(factory, left), narrow_to_int(factory, right)) {
        (Some(l), Some(r)) => factory.get_bin_op(l, op, r, PrimitiveType::Int),
        _ => value,
    }
}

fn narrow_to_int(factory: &mut ValueFactory, operand: ValueId) -> Option<ValueId> {
    match factory.value_type(operand)?.as_primitive()? {
        PrimitiveType::Int | PrimitiveType::Short | PrimitiveType::Byte | PrimitiveType::Char => {
            Some(operand)
        }
        PrimitiveType::Long => match factory.constant_of(operand)? {
            ConstValue::Int(v) => Some(factory.get_int(v as i32)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{LongRangeSet, TypeRegistry, VariableDescriptor};

    fn factory() -> ValueFactory {
        ValueFactory::new(TypeRegistry::new())
    }

    fn local(f: &mut ValueFactory, name: &str, ty: JType) -> ValueId {
        f.get_variable(
            VariableDescriptor::Local {
                name: name.to_string(),
                ty,
            },
            None,
        )
    }

    fn conversion(target: PrimitiveType) -> EvalOp {
        EvalOp::PrimitiveConversion { target }
    }

    // -----------------------------------------------------------------------
    // Primitive conversion
    // -----------------------------------------------------------------------

    #[test]
    fn widening_and_narrowing_constant_round_trips() {
        let mut f = factory();
        let s = MemoryState::new();
        let five = f.get_int(5);
        let five_long = evaluate(&mut f, &s, &conversion(PrimitiveType::Long), &[five]);
        assert_eq!(five_long, f.get_long(5));
        let back = evaluate(&mut f, &s, &conversion(PrimitiveType::Int), &[five_long]);
        assert_eq!(back, five);
    }

    #[test]
    fn narrowing_to_byte_wraps() {
        let mut f = factory();
        let s = MemoryState::new();
        let big = f.get_int(300);
        let byte = evaluate(&mut f, &s, &conversion(PrimitiveType::Byte), &[big]);
        assert_eq!(f.constant_of(byte), Some(ConstValue::Int(44)));
        assert_eq!(f.value_type(byte), Some(JType::Primitive(PrimitiveType::Byte)));
    }

    #[test]
    fn double_to_int_saturates() {
        let mut f = factory();
        let s = MemoryState::new();
        let huge = f.get_constant(
            ConstValue::Float(FloatBits::new(1e20)),
            JType::Primitive(PrimitiveType::Double),
        );
        let int = evaluate(&mut f, &s, &conversion(PrimitiveType::Int), &[huge]);
        assert_eq!(f.constant_of(int), Some(ConstValue::Int(i32::MAX as i64)));
    }

    #[test]
    fn conversion_to_same_type_is_identity() {
        let mut f = factory();
        let s = MemoryState::new();
        let x = local(&mut f, "x", JType::INT);
        assert_eq!(evaluate(&mut f, &s, &conversion(PrimitiveType::Int), &[x]), x);
    }

    #[test]
    fn narrowing_a_variable_clamps_its_range() {
        let mut f = factory();
        let mut s = MemoryState::new();
        let x = local(&mut f, "x", JType::INT);
        s.set_df_type(&f, x, DfType::range(PrimitiveType::Int, LongRangeSet::range(0, 1000)));
        let b = evaluate(&mut f, &s, &conversion(PrimitiveType::Byte), &[x]);
        assert_eq!(
            s.get_df_type(&f, b).as_range(),
            Some(&LongRangeSet::of_type(PrimitiveType::Byte))
        );
        let small = local(&mut f, "small", JType::INT);
        s.set_df_type(&f, small, DfType::range(PrimitiveType::Int, LongRangeSet::range(0, 100)));
        let b = evaluate(&mut f, &s, &conversion(PrimitiveType::Byte), &[small]);
        assert_eq!(
            s.get_df_type(&f, b).as_range(),
            Some(&LongRangeSet::range(0, 100))
        );
    }

    #[test]
    fn long_sum_of_ints_reduces_on_cast_to_int() {
        let mut f = factory();
        let x = local(&mut f, "x", JType::INT);
        let one = f.get_long(1);
        let sum = f.get_bin_op(x, BinaryOp::Plus, one, PrimitiveType::Long);
        let reduced = try_reduce_on_cast(&mut f, sum, PrimitiveType::Int);
        let int_one = f.get_int(1);
        assert_eq!(reduced, f.get_bin_op(x, BinaryOp::Plus, int_one, PrimitiveType::Int));
        let quotient = f.get_bin_op(x, BinaryOp::Div, one, PrimitiveType::Long);
        assert_eq!(try_reduce_on_cast(&mut f, quotient, PrimitiveType::Int), quotient);
    }

    // -----------------------------------------------------------------------
    // Type tests
    // -----------------------------------------------------------------------

    #[test]
    fn instanceof_of_disjoint_type_is_false() {
        let mut f = factory();
        let mut s = MemoryState::new();
        let x = local(&mut f, "x", JType::OBJECT);
        s.set_df_type(&f, x, DfType::not_null(TypeConstraint::Exact(TypeId::STRING)));
        let op = EvalOp::InstanceOf {
            cast_type: Some(TypeId::INTEGER),
        };
        assert_eq!(evaluate(&mut f, &s, &op, &[x]), f.get_boolean(false));
        let op = EvalOp::InstanceOf {
            cast_type: Some(TypeId::CHAR_SEQUENCE),
        };
        assert_eq!(evaluate(&mut f, &s, &op, &[x]), f.get_boolean(true));
    }

    #[test]
    fn instanceof_of_nullable_value_stays_unknown() {
        let mut f = factory();
        let s = MemoryState::new();
        let x = local(&mut f, "x", JType::STRING);
        let op = EvalOp::InstanceOf {
            cast_type: Some(TypeId::CHAR_SEQUENCE),
        };
        let result = evaluate(&mut f, &s, &op, &[x]);
        assert!(matches!(f.kind(result), ValueKind::Relation { .. }));
    }

    #[test]
    fn is_assignable_over_class_literals() {
        let mut f = factory();
        let s = MemoryState::new();
        let class = |f: &mut ValueFactory, id| {
            f.get_constant(ConstValue::Class(id), JType::Class(TypeId::CLASS))
        };
        let number = class(&mut f, TypeId::NUMBER);
        let integer = class(&mut f, TypeId::INTEGER);
        let string = class(&mut f, TypeId::STRING);
        assert_eq!(
            evaluate(&mut f, &s, &EvalOp::IsAssignable, &[integer, number]),
            f.get_boolean(true)
        );
        assert_eq!(
            evaluate(&mut f, &s, &EvalOp::IsAssignable, &[string, number]),
            f.get_boolean(false)
        );
    }

    // -----------------------------------------------------------------------
    // Arithmetic, relations, strings
    // -----------------------------------------------------------------------

    #[test]
    fn binary_folds_through_known_facts() {
        let mut f = factory();
        let mut s = MemoryState::new();
        let x = local(&mut f, "x", JType::INT);
        s.set_df_type(&f, x, DfType::range(PrimitiveType::Int, LongRangeSet::point(20)));
        let two = f.get_int(2);
        let op = EvalOp::Binary {
            op: BinaryOp::Mul,
            kind: PrimitiveType::Int,
        };
        let product = evaluate(&mut f, &s, &op, &[x, two]);
        assert_eq!(product, f.get_int(40));
    }

    #[test]
    fn relation_decided_by_state() {
        let mut f = factory();
        let mut s = MemoryState::new();
        let x = local(&mut f, "x", JType::INT);
        s.set_df_type(&f, x, DfType::range(PrimitiveType::Int, LongRangeSet::range(0, 5)));
        let ten = f.get_int(10);
        let op = EvalOp::Relation {
            relation: RelationType::Lt,
        };
        assert_eq!(evaluate(&mut f, &s, &op, &[x, ten]), f.get_boolean(true));
    }

    #[test]
    fn string_concat_of_constants() {
        let mut f = factory();
        let s = MemoryState::new();
        let a = f.get_constant(ConstValue::Str("n=".into()), JType::STRING);
        let n = f.get_int(3);
        let joined = evaluate(&mut f, &s, &EvalOp::StringConcat, &[a, n]);
        assert_eq!(f.constant_of(joined), Some(ConstValue::Str("n=3".into())));
        let x = local(&mut f, "x", JType::STRING);
        let unknown = evaluate(&mut f, &s, &EvalOp::StringConcat, &[a, x]);
        assert_eq!(
            s.get_df_type(&f, unknown).nullability(),
            Some(jdfa_core::Nullability::NotNull)
        );
    }

    #[test]
    fn not_of_constant() {
        let mut f = factory();
        let s = MemoryState::new();
        let t = f.get_boolean(true);
        assert_eq!(evaluate(&mut f, &s, &EvalOp::Not, &[t]), f.get_boolean(false));
    }
}
