//! Method descriptors and lowered bodies.
//!
//! A [`MethodDescriptor`] is what the host hands over about a method:
//! parameter types, return type, declared contract and mutation text. A
//! [`MethodBody`] pairs it with the lowered instruction list.

use serde::{Deserialize, Serialize};

use crate::id::AnchorId;
use crate::instruction::{Instruction, Operand};
use crate::type_id::TypeId;
use crate::types::JType;
use crate::value::VariableDescriptor;

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: JType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: JType,
    #[serde(default)]
    pub is_static: bool,
    pub declaring_class: TypeId,
    /// Anchor of the method declaration.
    pub anchor: AnchorId,
    /// Raw contract text, if declared.
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub pure: bool,
    /// Raw mutation signature text, if declared.
    #[serde(default)]
    pub mutates: Option<String>,
}

impl MethodDescriptor {
    /// A non-static method without contract on `java.lang.Object`.
    pub fn new(name: &str, params: Vec<Parameter>, return_type: JType, anchor: AnchorId) -> Self {
        MethodDescriptor {
            name: name.to_string(),
            params,
            return_type,
            is_static: false,
            declaring_class: TypeId::OBJECT,
            anchor,
            contract: None,
            pure: false,
            mutates: None,
        }
    }

    pub fn param_types(&self) -> Vec<JType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    /// The variable holding parameter `index` inside the body.
    pub fn param_variable(&self, index: usize) -> Option<VariableDescriptor> {
        self.params.get(index).map(|p| VariableDescriptor::Parameter {
            index,
            name: p.name.clone(),
            ty: p.ty.clone(),
        })
    }

    /// Operand reading parameter `index`.
    pub fn param_operand(&self, index: usize) -> Option<Operand> {
        self.param_variable(index).map(Operand::variable)
    }

    /// The `this` variable, absent for static methods.
    pub fn this_variable(&self) -> Option<VariableDescriptor> {
        if self.is_static {
            None
        } else {
            Some(VariableDescriptor::This {
                class: self.declaring_class,
            })
        }
    }
}

impl Parameter {
    pub fn new(name: &str, ty: JType) -> Self {
        Parameter {
            name: name.to_string(),
            ty,
        }
    }
}

/// A method together with its lowered instruction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    pub descriptor: MethodDescriptor,
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    pub fn new(descriptor: MethodDescriptor, instructions: Vec<Instruction>) -> Self {
        MethodBody {
            descriptor,
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_variables() {
        let m = MethodDescriptor::new(
            "f",
            vec![Parameter::new("a", JType::INT), Parameter::new("b", JType::STRING)],
            JType::Void,
            AnchorId(0),
        );
        assert_eq!(
            m.param_variable(1),
            Some(VariableDescriptor::Parameter {
                index: 1,
                name: "b".into(),
                ty: JType::STRING
            })
        );
        assert_eq!(m.param_variable(2), None);
        assert_eq!(m.param_types(), vec![JType::INT, JType::STRING]);
    }

    #[test]
    fn static_methods_have_no_this() {
        let mut m = MethodDescriptor::new("f", vec![], JType::Void, AnchorId(0));
        assert!(m.this_variable().is_some());
        m.is_static = true;
        assert!(m.this_variable().is_none());
    }

    #[test]
    fn descriptor_json_defaults() {
        let json = r#"{
            "name": "isEmpty",
            "params": [{"name": "s", "ty": {"Class": 5}}],
            "return_type": {"Primitive": "boolean"},
            "declaring_class": 0,
            "anchor": 1,
            "contract": "null -> true"
        }"#;
        let m: MethodDescriptor = serde_json::from_str(json).unwrap();
        assert!(!m.is_static);
        assert_eq!(m.params[0].ty, JType::STRING);
        assert_eq!(m.contract.as_deref(), Some("null -> true"));
    }
}
