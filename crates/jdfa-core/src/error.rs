//! Core error types for jdfa-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of building types, values and instructions. Contract text
//! errors live in [`crate::contract::ParseError`] because they carry source
//! positions.

use crate::types::PrimitiveType;
use crate::type_id::TypeId;
use thiserror::Error;

/// Core errors produced by the jdfa-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempting to register a class name that already exists in the registry.
    #[error("duplicate class name: '{name}'")]
    DuplicateClassName { name: String },

    /// A TypeId was not found in the type registry.
    #[error("class not found: TypeId({id})", id = id.0)]
    ClassNotFound { id: TypeId },

    /// A source-level type name could not be resolved.
    #[error("unknown type name: '{name}'")]
    UnknownTypeName { name: String },

    /// Type casts only apply to references; primitive conversions use the
    /// dedicated eval operation.
    #[error("type cast target must be a reference type, got {target}")]
    PrimitiveCastTarget { target: PrimitiveType },

    /// An instruction was constructed with inconsistent operands.
    #[error("invalid instruction: {reason}")]
    InvalidInstruction { reason: String },
}
