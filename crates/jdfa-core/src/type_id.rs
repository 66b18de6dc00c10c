//! TypeId and TypeRegistry for the nominal class hierarchy.
//!
//! Every class, interface or array type has a unique [`TypeId`] providing
//! O(1) identity comparison. The [`TypeRegistry`] manages registration and
//! lookup, pre-registering the platform classes the engine reasons about
//! (boxes, strings, collections, exceptions) on construction.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ClassDef, JType, PrimitiveType};

/// Unique identifier for a class type in the type registry.
///
/// The inner value is an index into the [`TypeRegistry`]'s class vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for built-in classes.
impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const CHAR_SEQUENCE: TypeId = TypeId(1);
    pub const COMPARABLE: TypeId = TypeId(2);
    pub const SERIALIZABLE: TypeId = TypeId(3);
    pub const CLONEABLE: TypeId = TypeId(4);
    pub const STRING: TypeId = TypeId(5);
    pub const NUMBER: TypeId = TypeId(6);
    pub const INTEGER: TypeId = TypeId(7);
    pub const LONG: TypeId = TypeId(8);
    pub const SHORT: TypeId = TypeId(9);
    pub const BYTE: TypeId = TypeId(10);
    pub const CHARACTER: TypeId = TypeId(11);
    pub const BOOLEAN: TypeId = TypeId(12);
    pub const FLOAT: TypeId = TypeId(13);
    pub const DOUBLE: TypeId = TypeId(14);
    pub const CLASS: TypeId = TypeId(15);
    pub const ITERABLE: TypeId = TypeId(16);
    pub const COLLECTION: TypeId = TypeId(17);
    pub const LIST: TypeId = TypeId(18);
    pub const ARRAY_LIST: TypeId = TypeId(19);
    pub const OPTIONAL: TypeId = TypeId(20);
    pub const THROWABLE: TypeId = TypeId(21);
    pub const EXCEPTION: TypeId = TypeId(22);
    pub const RUNTIME_EXCEPTION: TypeId = TypeId(23);
    pub const NULL_POINTER_EXCEPTION: TypeId = TypeId(24);
    pub const CLASS_CAST_EXCEPTION: TypeId = TypeId(25);
    pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: TypeId = TypeId(26);
}

/// Registry of all class types known to one analysis, providing nominal
/// identity via [`TypeId`] and subtype queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    /// Classes indexed by TypeId.0
    classes: Vec<ClassDef>,
    /// Fully qualified name lookup
    names: IndexMap<String, TypeId>,
}

impl TypeRegistry {
    /// Number of built-in classes pre-registered on construction.
    const BUILTIN_COUNT: u32 = 27;

    /// Creates a new registry with the built-in platform classes registered
    /// at the ids given by the `TypeId` constants.
    pub fn new() -> Self {
        use TypeId as T;

        let builtins = vec![
            ClassDef::class("java.lang.Object", vec![]),
            ClassDef::interface("java.lang.CharSequence", vec![]),
            ClassDef::interface("java.lang.Comparable", vec![]),
            ClassDef::interface("java.io.Serializable", vec![]),
            ClassDef::interface("java.lang.Cloneable", vec![]),
            ClassDef::final_class(
                "java.lang.String",
                vec![T::OBJECT, T::CHAR_SEQUENCE, T::COMPARABLE, T::SERIALIZABLE],
            ),
            ClassDef {
                is_abstract: true,
                ..ClassDef::class("java.lang.Number", vec![T::OBJECT, T::SERIALIZABLE])
            },
            ClassDef::final_class("java.lang.Integer", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class("java.lang.Long", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class("java.lang.Short", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class("java.lang.Byte", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class(
                "java.lang.Character",
                vec![T::OBJECT, T::COMPARABLE, T::SERIALIZABLE],
            ),
            ClassDef::final_class(
                "java.lang.Boolean",
                vec![T::OBJECT, T::COMPARABLE, T::SERIALIZABLE],
            ),
            ClassDef::final_class("java.lang.Float", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class("java.lang.Double", vec![T::NUMBER, T::COMPARABLE]),
            ClassDef::final_class("java.lang.Class", vec![T::OBJECT, T::SERIALIZABLE]),
            ClassDef::interface("java.lang.Iterable", vec![]),
            ClassDef::interface("java.util.Collection", vec![T::ITERABLE]),
            ClassDef::interface("java.util.List", vec![T::COLLECTION]),
            ClassDef::class(
                "java.util.ArrayList",
                vec![T::OBJECT, T::LIST, T::CLONEABLE, T::SERIALIZABLE],
            ),
            ClassDef::final_class("java.util.Optional", vec![T::OBJECT]),
            ClassDef::class("java.lang.Throwable", vec![T::OBJECT, T::SERIALIZABLE]),
            ClassDef::class("java.lang.Exception", vec![T::THROWABLE]),
            ClassDef::class("java.lang.RuntimeException", vec![T::EXCEPTION]),
            ClassDef::class("java.lang.NullPointerException", vec![T::RUNTIME_EXCEPTION]),
            ClassDef::class("java.lang.ClassCastException", vec![T::RUNTIME_EXCEPTION]),
            ClassDef::class(
                "java.lang.ArrayIndexOutOfBoundsException",
                vec![T::RUNTIME_EXCEPTION],
            ),
        ];
        debug_assert_eq!(builtins.len() as u32, Self::BUILTIN_COUNT);

        let names = builtins
            .iter()
            .enumerate()
            .map(|(i, def)| (def.name.clone(), TypeId(i as u32)))
            .collect();

        TypeRegistry {
            classes: builtins,
            names,
        }
    }

    /// Registers a named class, returning its new [`TypeId`].
    ///
    /// Returns [`CoreError::DuplicateClassName`] if the name is taken and
    /// [`CoreError::ClassNotFound`] if a supertype is not registered.
    pub fn register(&mut self, def: ClassDef) -> Result<TypeId, CoreError> {
        if self.names.contains_key(&def.name) {
            return Err(CoreError::DuplicateClassName { name: def.name });
        }
        if let Some(missing) = def.supertypes.iter().find(|s| self.get(**s).is_none()) {
            return Err(CoreError::ClassNotFound { id: *missing });
        }
        let id = TypeId(self.classes.len() as u32);
        self.names.insert(def.name.clone(), id);
        self.classes.push(def);
        Ok(id)
    }

    /// Returns the array class with the given element type, registering it
    /// on first use. Arrays are final and implement `Cloneable` and
    /// `Serializable`.
    pub fn array_of(&mut self, element: &JType) -> TypeId {
        let name = format!("{}[]", self.type_name(element));
        if let Some(id) = self.names.get(&name) {
            return *id;
        }
        let id = TypeId(self.classes.len() as u32);
        self.names.insert(name.clone(), id);
        self.classes.push(ClassDef::final_class(
            &name,
            vec![TypeId::OBJECT, TypeId::CLONEABLE, TypeId::SERIALIZABLE],
        ));
        id
    }

    /// Looks up a class by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&ClassDef> {
        self.classes.get(id.0 as usize)
    }

    /// Looks up a class by fully qualified or simple name.
    pub fn get_by_name(&self, name: &str) -> Option<TypeId> {
        if let Some(id) = self.names.get(name) {
            return Some(*id);
        }
        self.names
            .iter()
            .find(|(full, _)| full.rsplit('.').next() == Some(name))
            .map(|(_, id)| *id)
    }

    /// Resolves a source-level type name: a primitive keyword, `void`, or a
    /// registered class name.
    pub fn resolve_type_name(&self, name: &str) -> Option<JType> {
        let name = name.trim();
        if name == "void" {
            return Some(JType::Void);
        }
        if let Some(p) = PrimitiveType::from_name(name) {
            return Some(JType::Primitive(p));
        }
        self.get_by_name(name).map(JType::Class)
    }

    /// Fully qualified name of a class, or `"?"` if not registered.
    pub fn name(&self, id: TypeId) -> &str {
        self.get(id).map(|c| c.name.as_str()).unwrap_or("?")
    }

    /// Human-readable rendering of a type.
    pub fn type_name(&self, ty: &JType) -> String {
        match ty {
            JType::Primitive(p) => p.name().to_string(),
            JType::Class(id) => self.name(*id).to_string(),
            JType::Null => "null".to_string(),
            JType::Void => "void".to_string(),
        }
    }

    pub fn is_final(&self, id: TypeId) -> bool {
        self.get(id).is_some_and(|c| c.is_final)
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        self.get(id).is_some_and(|c| c.is_interface())
    }

    /// Returns `true` if `sub` is `sup` or inherits from it, directly or
    /// transitively. Every class is a subtype of `Object`.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup || sup == TypeId::OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![sub];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(def) = self.get(current) else {
                continue;
            };
            for s in &def.supertypes {
                if *s == sup {
                    return true;
                }
                stack.push(*s);
            }
        }
        false
    }

    /// All supertypes of `id`, including `id` itself and `Object`.
    pub fn supertypes_closure(&self, id: TypeId) -> HashSet<TypeId> {
        let mut seen = HashSet::new();
        seen.insert(TypeId::OBJECT);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) && current != TypeId::OBJECT {
                continue;
            }
            if let Some(def) = self.get(current) {
                stack.extend(def.supertypes.iter().copied());
            }
        }
        seen
    }

    /// Returns `true` if no object can be an instance of both `a` and `b`.
    ///
    /// Unrelated classes are disjoint (single inheritance). An interface is
    /// disjoint from a final class that does not implement it. Two
    /// interfaces, or an interface and a non-final class, may share a
    /// subclass and are never disjoint.
    pub fn are_disjoint(&self, a: TypeId, b: TypeId) -> bool {
        if self.is_subtype(a, b) || self.is_subtype(b, a) {
            return false;
        }
        match (self.is_interface(a), self.is_interface(b)) {
            (false, false) => true,
            (true, true) => false,
            (true, false) => self.is_final(b),
            (false, true) => self.is_final(a),
        }
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_has_builtin_classes() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.len(), TypeRegistry::BUILTIN_COUNT as usize);
        assert_eq!(reg.name(TypeId::STRING), "java.lang.String");
        assert_eq!(reg.name(TypeId::ARRAY_LIST), "java.util.ArrayList");
        assert_eq!(
            reg.name(TypeId::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION),
            "java.lang.ArrayIndexOutOfBoundsException"
        );
    }

    #[test]
    fn builtin_subtyping() {
        let reg = TypeRegistry::new();
        assert!(reg.is_subtype(TypeId::ARRAY_LIST, TypeId::LIST));
        assert!(reg.is_subtype(TypeId::ARRAY_LIST, TypeId::ITERABLE));
        assert!(reg.is_subtype(TypeId::INTEGER, TypeId::NUMBER));
        assert!(reg.is_subtype(TypeId::STRING, TypeId::OBJECT));
        assert!(!reg.is_subtype(TypeId::LIST, TypeId::ARRAY_LIST));
        assert!(!reg.is_subtype(TypeId::STRING, TypeId::NUMBER));
    }

    #[test]
    fn disjointness() {
        let reg = TypeRegistry::new();
        // Two unrelated final classes.
        assert!(reg.are_disjoint(TypeId::STRING, TypeId::INTEGER));
        // Final class vs interface it does not implement.
        assert!(reg.are_disjoint(TypeId::STRING, TypeId::LIST));
        // Non-final class vs interface: a subclass could implement it.
        assert!(!reg.are_disjoint(TypeId::EXCEPTION, TypeId::LIST));
        // Two interfaces always overlap.
        assert!(!reg.are_disjoint(TypeId::LIST, TypeId::CHAR_SEQUENCE));
        // Related types overlap.
        assert!(!reg.are_disjoint(TypeId::OBJECT, TypeId::STRING));
    }

    #[test]
    fn register_user_class() {
        let mut reg = TypeRegistry::new();
        let id = reg
            .register(ClassDef::class("com.example.MyList", vec![TypeId::ARRAY_LIST]))
            .unwrap();
        assert_eq!(id, TypeId(TypeRegistry::BUILTIN_COUNT));
        assert!(reg.is_subtype(id, TypeId::LIST));
        assert_eq!(reg.get_by_name("MyList"), Some(id));
    }

    #[test]
    fn duplicate_name_returns_error() {
        let mut reg = TypeRegistry::new();
        let result = reg.register(ClassDef::class("java.lang.String", vec![]));
        match result {
            Err(CoreError::DuplicateClassName { name }) => assert_eq!(name, "java.lang.String"),
            other => panic!("expected DuplicateClassName error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_supertype_returns_error() {
        let mut reg = TypeRegistry::new();
        let result = reg.register(ClassDef::class("Broken", vec![TypeId(999)]));
        assert!(matches!(result, Err(CoreError::ClassNotFound { .. })));
    }

    #[test]
    fn array_types_are_interned_and_final() {
        let mut reg = TypeRegistry::new();
        let a = reg.array_of(&JType::INT);
        let b = reg.array_of(&JType::INT);
        assert_eq!(a, b);
        assert_eq!(reg.name(a), "int[]");
        assert!(reg.is_final(a));
        assert!(reg.is_subtype(a, TypeId::CLONEABLE));
        assert!(reg.are_disjoint(a, TypeId::LIST));
    }

    #[test]
    fn resolve_type_names() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.resolve_type_name("int"), Some(JType::INT));
        assert_eq!(reg.resolve_type_name("String"), Some(JType::STRING));
        assert_eq!(
            reg.resolve_type_name("java.util.List"),
            Some(JType::Class(TypeId::LIST))
        );
        assert_eq!(reg.resolve_type_name("void"), Some(JType::Void));
        assert_eq!(reg.resolve_type_name("Nope"), None);
    }

    #[test]
    fn supertypes_closure_contains_object() {
        let reg = TypeRegistry::new();
        let closure = reg.supertypes_closure(TypeId::INTEGER);
        assert!(closure.contains(&TypeId::OBJECT));
        assert!(closure.contains(&TypeId::NUMBER));
        assert!(closure.contains(&TypeId::SERIALIZABLE));
        assert!(closure.contains(&TypeId::INTEGER));
        assert!(!closure.contains(&TypeId::STRING));
    }

    #[test]
    fn serde_roundtrip() {
        let mut reg = TypeRegistry::new();
        reg.register(ClassDef::class("Test", vec![])).unwrap();

        let json = serde_json::to_string(&reg).unwrap();
        let back: TypeRegistry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), reg.len());
        assert_eq!(back.get_by_name("Test"), Some(TypeId(TypeRegistry::BUILTIN_COUNT)));
    }
}
