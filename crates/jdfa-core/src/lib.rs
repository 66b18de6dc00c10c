pub mod types;
pub mod type_id;
pub mod id;
pub mod error;
pub mod range;
pub mod constraint;
pub mod dftype;
pub mod value;
pub mod instruction;
pub mod contract;
pub mod mutation;
pub mod method;

// Re-export commonly used types
pub use types::{JType, PrimitiveType, ConstValue, FloatBits, ClassDef, ClassKind};
pub use type_id::{TypeId, TypeRegistry};
pub use id::{ValueId, AnchorId};
pub use error::CoreError;
pub use range::LongRangeSet;
pub use constraint::{TypeConstraint, TypeCheckOutcome};
pub use dftype::{DfType, Nullability, ReferenceFact, RefConstant};
pub use value::{ValueFactory, ValueKind, VariableDescriptor, SpecialField, BinaryOp, RelationType};
pub use instruction::{Instruction, Operand, EvalOp, EvalInstruction, TypeCastInstruction, MethodCallInstruction};
pub use contract::{StandardMethodContract, ValueConstraint, ReturnOutcome, ParseError};
pub use mutation::{MutationSignature, MutationError};
pub use method::{MethodDescriptor, MethodBody, Parameter};
