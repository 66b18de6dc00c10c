//! The instruction set of the abstract stack machine.
//!
//! A method body is lowered to a flat `Vec<Instruction>`; jump and
//! exception-transfer targets are indices into that vector. Every
//! instruction is a pure transformation of a memory state and is executed
//! read-only by the runner.
//!
//! Instructions carry [`Operand`]s rather than interned values so a lowered
//! body can be serialized independently of any value factory. The runner
//! interns operands when it executes them.

use serde::{Deserialize, Serialize};

use crate::contract::StandardMethodContract;
use crate::dftype::DfType;
use crate::error::CoreError;
use crate::id::AnchorId;
use crate::mutation::MutationSignature;
use crate::type_id::TypeId;
use crate::types::{ConstValue, JType, PrimitiveType};
use crate::value::{BinaryOp, RelationType, SpecialField, VariableDescriptor};

/// A value reference inside an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    Constant {
        value: ConstValue,
        ty: JType,
    },
    /// A variable, optionally qualified by the value it is read from.
    Variable {
        var: VariableDescriptor,
        #[serde(default)]
        qualifier: Option<Box<Operand>>,
    },
    Unknown,
}

impl Operand {
    pub fn constant(value: ConstValue, ty: JType) -> Self {
        Operand::Constant { value, ty }
    }

    pub fn variable(var: VariableDescriptor) -> Self {
        Operand::Variable {
            var,
            qualifier: None,
        }
    }

    pub fn qualified(var: VariableDescriptor, qualifier: Operand) -> Self {
        Operand::Variable {
            var,
            qualifier: Some(Box::new(qualifier)),
        }
    }
}

/// Computations that pop operands and push one result without branching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalOp {
    Binary {
        op: BinaryOp,
        kind: PrimitiveType,
    },
    Relation {
        relation: RelationType,
    },
    /// Boolean negation.
    Not,
    StringConcat,
    /// `value instanceof cast_type`. Without a static type the test type is
    /// a `Class` object popped from the stack above the value.
    InstanceOf {
        #[serde(default)]
        cast_type: Option<TypeId>,
    },
    /// `superClass.isAssignableFrom(subClass)` over two `Class` objects.
    /// Stack order is `[sub, super]`.
    IsAssignable,
    PrimitiveConversion {
        target: PrimitiveType,
    },
}

impl EvalOp {
    /// Number of stack operands consumed.
    pub fn arity(&self) -> usize {
        match self {
            EvalOp::Not | EvalOp::PrimitiveConversion { .. } => 1,
            EvalOp::InstanceOf {
                cast_type: Some(_),
            } => 1,
            EvalOp::InstanceOf { cast_type: None } => 2,
            EvalOp::Binary { .. }
            | EvalOp::Relation { .. }
            | EvalOp::StringConcat
            | EvalOp::IsAssignable => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalInstruction {
    #[serde(rename = "eval")]
    pub op: EvalOp,
    #[serde(default)]
    pub anchor: Option<AnchorId>,
}

/// Checked reference cast of the value on top of the stack.
///
/// The target is always a reference type; constructing one with a primitive
/// target fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TypeCastSpec", into = "TypeCastSpec")]
pub struct TypeCastInstruction {
    cast_to: TypeId,
    exception_transfer: Option<usize>,
    anchor: Option<AnchorId>,
}

/// Unchecked wire form of [`TypeCastInstruction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TypeCastSpec {
    cast_to: JType,
    #[serde(default)]
    exception_transfer: Option<usize>,
    #[serde(default)]
    anchor: Option<AnchorId>,
}

impl TypeCastInstruction {
    pub fn new(
        cast_to: JType,
        exception_transfer: Option<usize>,
        anchor: Option<AnchorId>,
    ) -> Result<Self, CoreError> {
        let cast_to = match cast_to {
            JType::Class(id) => id,
            JType::Primitive(target) => return Err(CoreError::PrimitiveCastTarget { target }),
            other => {
                return Err(CoreError::InvalidInstruction {
                    reason: format!("cannot cast to {:?}", other),
                })
            }
        };
        Ok(TypeCastInstruction {
            cast_to,
            exception_transfer,
            anchor,
        })
    }

    pub fn cast_to(&self) -> TypeId {
        self.cast_to
    }

    pub fn exception_transfer(&self) -> Option<usize> {
        self.exception_transfer
    }

    pub fn anchor(&self) -> Option<AnchorId> {
        self.anchor
    }
}

impl TryFrom<TypeCastSpec> for TypeCastInstruction {
    type Error = CoreError;

    fn try_from(spec: TypeCastSpec) -> Result<Self, Self::Error> {
        TypeCastInstruction::new(spec.cast_to, spec.exception_transfer, spec.anchor)
    }
}

impl From<TypeCastInstruction> for TypeCastSpec {
    fn from(cast: TypeCastInstruction) -> Self {
        TypeCastSpec {
            cast_to: JType::Class(cast.cast_to),
            exception_transfer: cast.exception_transfer,
            anchor: cast.anchor,
        }
    }
}

/// Call of a method known only through its signature and contracts.
///
/// Stack layout before the call is `[qualifier?, arg1, .., argN]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCallInstruction {
    pub arg_count: usize,
    #[serde(default)]
    pub has_qualifier: bool,
    pub return_type: JType,
    #[serde(default)]
    pub contracts: Vec<StandardMethodContract>,
    /// Pure calls change no state.
    #[serde(default)]
    pub pure: bool,
    /// When present, only these inputs may change; fields reachable from
    /// other inputs survive the call.
    #[serde(default)]
    pub mutates: Option<MutationSignature>,
    #[serde(default)]
    pub exception_transfer: Option<usize>,
    #[serde(default)]
    pub anchor: Option<AnchorId>,
}

/// One instruction of a lowered method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Push a value.
    Push {
        value: Operand,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    /// Push a fresh value carrying the given fact.
    PushValue {
        df_type: DfType,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    Eval(EvalInstruction),
    /// Stack `[dest, value]` becomes `[value]` with `dest` bound to `value`.
    /// `assigned_value`, when present, replaces the popped value.
    Assign {
        #[serde(default)]
        lhs_anchor: Option<AnchorId>,
        #[serde(default)]
        rhs_anchor: Option<AnchorId>,
        #[serde(default)]
        assigned_value: Option<Operand>,
    },
    /// Stack `[array, index]` becomes `[element]`.
    ArrayAccess {
        #[serde(default)]
        value: Option<Operand>,
        element_type: JType,
        #[serde(default)]
        exception_transfer: Option<usize>,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    /// Box the primitive on top of the stack.
    Box {
        primitive: PrimitiveType,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    TypeCast(TypeCastInstruction),
    FlushVariable {
        variable: Operand,
    },
    /// Forget every non-stable field.
    FlushFields,
    /// Dereference the qualifier of a method reference on top of the stack.
    MethodReference {
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    /// Tag the value on top of the stack with a source expression.
    ResultOf {
        anchor: AnchorId,
    },
    /// Replace the qualifier on top of the stack with one of its special
    /// fields.
    UnwrapSpecialField {
        field: SpecialField,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    MethodCall(MethodCallInstruction),
    Goto {
        target: usize,
    },
    /// Pop a condition and jump when it equals `jump_if`.
    ConditionalGoto {
        target: usize,
        jump_if: bool,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    Return {
        #[serde(default)]
        has_value: bool,
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    Throw {
        #[serde(default)]
        anchor: Option<AnchorId>,
    },
    Pop,
    Dup,
    /// Start of a protected region whose exceptions go to `handler`.
    EnterTry {
        handler: usize,
    },
    ExitTry,
}

impl Instruction {
    pub fn push(value: Operand) -> Self {
        Instruction::Push {
            value,
            anchor: None,
        }
    }

    pub fn eval(op: EvalOp) -> Self {
        Instruction::Eval(EvalInstruction { op, anchor: None })
    }

    pub fn type_cast(
        cast_to: JType,
        exception_transfer: Option<usize>,
        anchor: Option<AnchorId>,
    ) -> Result<Self, CoreError> {
        TypeCastInstruction::new(cast_to, exception_transfer, anchor).map(Instruction::TypeCast)
    }

    /// Source anchor used for diagnostics.
    pub fn anchor(&self) -> Option<AnchorId> {
        match self {
            Instruction::Push { anchor, .. }
            | Instruction::PushValue { anchor, .. }
            | Instruction::ArrayAccess { anchor, .. }
            | Instruction::Box { anchor, .. }
            | Instruction::MethodReference { anchor }
            | Instruction::UnwrapSpecialField { anchor, .. }
            | Instruction::ConditionalGoto { anchor, .. }
            | Instruction::Return { anchor, .. }
            | Instruction::Throw { anchor } => *anchor,
            Instruction::Eval(eval) => eval.anchor,
            Instruction::Assign { lhs_anchor, .. } => *lhs_anchor,
            Instruction::TypeCast(cast) => cast.anchor(),
            Instruction::MethodCall(call) => call.anchor,
            Instruction::ResultOf { anchor } => Some(*anchor),
            Instruction::FlushVariable { .. }
            | Instruction::FlushFields
            | Instruction::Goto { .. }
            | Instruction::Pop
            | Instruction::Dup
            | Instruction::EnterTry { .. }
            | Instruction::ExitTry => None,
        }
    }

    /// Where control goes when this instruction throws, if declared.
    pub fn exception_transfer(&self) -> Option<usize> {
        match self {
            Instruction::ArrayAccess {
                exception_transfer, ..
            } => *exception_transfer,
            Instruction::TypeCast(cast) => cast.exception_transfer(),
            Instruction::MethodCall(call) => call.exception_transfer,
            _ => None,
        }
    }

    /// Returns `true` if control can continue with the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto { .. } | Instruction::Return { .. } | Instruction::Throw { .. }
        )
    }

    /// Explicit control targets other than the next instruction.
    pub fn branch_targets(&self) -> Vec<usize> {
        let mut targets = Vec::new();
        match self {
            Instruction::Goto { target } | Instruction::ConditionalGoto { target, .. } => {
                targets.push(*target)
            }
            Instruction::EnterTry { handler } => targets.push(*handler),
            _ => {}
        }
        targets.extend(self.exception_transfer());
        targets
    }

    /// Short mnemonic used in traces.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Push { .. } => "push",
            Instruction::PushValue { .. } => "push_value",
            Instruction::Eval(_) => "eval",
            Instruction::Assign { .. } => "assign",
            Instruction::ArrayAccess { .. } => "array_access",
            Instruction::Box { .. } => "box",
            Instruction::TypeCast(_) => "type_cast",
            Instruction::FlushVariable { .. } => "flush_variable",
            Instruction::FlushFields => "flush_fields",
            Instruction::MethodReference { .. } => "method_reference",
            Instruction::ResultOf { .. } => "result_of",
            Instruction::UnwrapSpecialField { .. } => "unwrap_special_field",
            Instruction::MethodCall(_) => "method_call",
            Instruction::Goto { .. } => "goto",
            Instruction::ConditionalGoto { .. } => "conditional_goto",
            Instruction::Return { .. } => "return",
            Instruction::Throw { .. } => "throw",
            Instruction::Pop => "pop",
            Instruction::Dup => "dup",
            Instruction::EnterTry { .. } => "enter_try",
            Instruction::ExitTry => "exit_try",
        }
    }
}
