//! Type references and type signatures.
//!
//! Every place in a module that names a type does so through a [`TypeSig`]: a primitive, a
//! reference to a class or value type ([`TypeRef`]), a generic instantiation, a generic
//! parameter or a constructed type (arrays, pointers, by-refs).
//!
//! # Full names
//!
//! Full names follow the conventions of Mono.Cecil, since facade symbol maps are keyed by them:
//!
//! - namespace and name joined by `.` (`Game.HeroController`)
//! - nested types joined by `/` (`Game.HeroController/State`)
//! - generic instances list their arguments (``System.Collections.Generic.List`1<System.Int32>``)
//! - primitives use their `System.*` names (`System.Int32`, `System.String`, ...)
//! - arrays `T[]` / `T[,]`, pointers `T*`, by-refs `T&`
//!
//! # Examples
//!
//! ```rust
//! use cilfacade::metadata::typesystem::{TypeRef, TypeSig};
//!
//! let list = TypeRef::new("mscorlib", "System.Collections.Generic", "List`1");
//! let sig = TypeSig::GenericInst(Box::new(TypeSig::Class(list)), vec![TypeSig::I4]);
//! assert_eq!(sig.full_name(), "System.Collections.Generic.List`1<System.Int32>");
//! ```

mod attributes;

pub use attributes::{
    FieldAttributes, MethodAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
    MEMBER_ACCESS_MASK, TYPE_VISIBILITY_MASK,
};

use std::fmt;

use crate::Result;

/// Name of the core library that hosts the primitive types and framework attributes
pub const CORLIB: &str = "mscorlib";

#[allow(non_snake_case, missing_docs)]
/// Element type tags of ECMA-335 II.23.1.16, used as the signature encoding of module images
pub mod ELEMENT_TYPE {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by a type reference
    pub const VALUETYPE: u8 = 0x11;
    // Followed by a type reference
    pub const CLASS: u8 = 0x12;
    // Generic parameter of a type, followed by its name
    pub const VAR: u8 = 0x13;
    // Followed by type and rank
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter of a method, followed by its name
    pub const MVAR: u8 = 0x1e;
}

/// A reference to a named class or value type.
///
/// `scope` is the name of the assembly that defines the type. An empty scope means the type
/// is defined in the module that holds the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Defining assembly, empty for the owning module
    pub scope: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name, including the generic arity suffix (``List`1``)
    pub name: String,
    /// Enclosing type for nested types
    pub declaring: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// Reference to a top-level type.
    pub fn new(scope: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef {
            scope: scope.into(),
            namespace: namespace.into(),
            name: name.into(),
            declaring: None,
        }
    }

    /// Reference to a type nested in `declaring`; the scope is inherited.
    pub fn nested(declaring: TypeRef, name: impl Into<String>) -> Self {
        TypeRef {
            scope: declaring.scope.clone(),
            namespace: String::new(),
            name: name.into(),
            declaring: Some(Box::new(declaring)),
        }
    }

    /// Fully qualified name, `Ns.Outer/Inner`.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// The outermost enclosing type (`self` for top-level types).
    #[must_use]
    pub fn outermost(&self) -> &TypeRef {
        let mut current = self;
        while let Some(declaring) = &current.declaring {
            current = declaring;
        }
        current
    }

    /// Type names from the outermost type down to this one.
    #[must_use]
    pub fn name_path(&self) -> Vec<&str> {
        let mut path = match &self.declaring {
            Some(declaring) => declaring.name_path(),
            None => Vec::new(),
        };
        path.push(&self.name);
        path
    }

    /// Returns `true` if the (outermost) namespace is `namespace` or one of its children.
    #[must_use]
    pub fn is_in_namespace(&self, namespace: &str) -> bool {
        let ns = &self.outermost().namespace;
        ns == namespace
            || (ns.len() > namespace.len()
                && ns.starts_with(namespace)
                && ns.as_bytes()[namespace.len()] == b'.')
    }

    /// Copy of this reference with an empty scope replaced by `scope`.
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> TypeRef {
        if !self.scope.is_empty() {
            return self.clone();
        }

        TypeRef {
            scope: scope.to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            declaring: self
                .declaring
                .as_ref()
                .map(|declaring| Box::new(declaring.with_scope(scope))),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declaring {
            Some(declaring) => write!(f, "{}/{}", declaring, self.name),
            None if self.namespace.is_empty() => write!(f, "{}", self.name),
            None => write!(f, "{}.{}", self.namespace, self.name),
        }
    }
}

/// A type as it appears in a signature.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    I,
    U,
    TypedByRef,
    /// A reference type
    Class(TypeRef),
    /// A value type
    ValueType(TypeRef),
    /// A generic type instantiated with arguments
    GenericInst(Box<TypeSig>, Vec<TypeSig>),
    /// A generic parameter of the enclosing type, by name
    Var(String),
    /// A generic parameter of the enclosing method, by name
    MVar(String),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array with the given rank
    Array(Box<TypeSig>, u32),
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Managed reference
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    /// Fully qualified name, see the module documentation.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// The `System.*` name of a primitive, `None` for every other kind.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeSig::Void => "System.Void",
            TypeSig::Boolean => "System.Boolean",
            TypeSig::Char => "System.Char",
            TypeSig::I1 => "System.SByte",
            TypeSig::U1 => "System.Byte",
            TypeSig::I2 => "System.Int16",
            TypeSig::U2 => "System.UInt16",
            TypeSig::I4 => "System.Int32",
            TypeSig::U4 => "System.UInt32",
            TypeSig::I8 => "System.Int64",
            TypeSig::U8 => "System.UInt64",
            TypeSig::R4 => "System.Single",
            TypeSig::R8 => "System.Double",
            TypeSig::String => "System.String",
            TypeSig::Object => "System.Object",
            TypeSig::I => "System.IntPtr",
            TypeSig::U => "System.UIntPtr",
            TypeSig::TypedByRef => "System.TypedReference",
            _ => return None,
        })
    }

    /// Returns `true` for generic type and method parameters.
    #[must_use]
    pub fn is_generic_param(&self) -> bool {
        matches!(self, TypeSig::Var(_) | TypeSig::MVar(_))
    }

    /// The named type this signature resolves to.
    ///
    /// Constructed types (arrays, pointers, by-refs) and generic instances resolve to their
    /// element type. Primitives and generic parameters have no named type.
    #[must_use]
    pub fn element_ref(&self) -> Option<&TypeRef> {
        match self {
            TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => Some(type_ref),
            TypeSig::GenericInst(element, _)
            | TypeSig::SzArray(element)
            | TypeSig::Array(element, _)
            | TypeSig::Ptr(element)
            | TypeSig::ByRef(element) => element.element_ref(),
            _ => None,
        }
    }

    /// Returns `true` if any type reference in this signature, generic arguments included,
    /// satisfies `predicate`.
    pub fn mentions(&self, predicate: &impl Fn(&TypeRef) -> bool) -> bool {
        match self {
            TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => predicate(type_ref),
            TypeSig::GenericInst(element, args) => {
                element.mentions(predicate) || args.iter().any(|arg| arg.mentions(predicate))
            }
            TypeSig::SzArray(element)
            | TypeSig::Array(element, _)
            | TypeSig::Ptr(element)
            | TypeSig::ByRef(element) => element.mentions(predicate),
            _ => false,
        }
    }

    /// Rebuild this signature, substituting type references.
    ///
    /// `map` is called for every class or value type reference; returning `Some` replaces
    /// the whole reference (including its class / value type flavor), `None` keeps it.
    ///
    /// # Errors
    /// Propagates the first error returned by `map`.
    pub fn try_map_refs(
        &self,
        map: &mut impl FnMut(&TypeRef) -> Result<Option<TypeSig>>,
    ) -> Result<TypeSig> {
        Ok(match self {
            TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => match map(type_ref)? {
                Some(replacement) => replacement,
                None => self.clone(),
            },
            TypeSig::GenericInst(element, args) => TypeSig::GenericInst(
                Box::new(element.try_map_refs(map)?),
                args.iter()
                    .map(|arg| arg.try_map_refs(map))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TypeSig::SzArray(element) => TypeSig::SzArray(Box::new(element.try_map_refs(map)?)),
            TypeSig::Array(element, rank) => {
                TypeSig::Array(Box::new(element.try_map_refs(map)?), *rank)
            }
            TypeSig::Ptr(element) => TypeSig::Ptr(Box::new(element.try_map_refs(map)?)),
            TypeSig::ByRef(element) => TypeSig::ByRef(Box::new(element.try_map_refs(map)?)),
            _ => self.clone(),
        })
    }

    /// Copy of this signature with every empty reference scope replaced by `scope`.
    ///
    /// This is how a signature taken from one module is imported into another one.
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> TypeSig {
        match self {
            TypeSig::Class(type_ref) => TypeSig::Class(type_ref.with_scope(scope)),
            TypeSig::ValueType(type_ref) => TypeSig::ValueType(type_ref.with_scope(scope)),
            TypeSig::GenericInst(element, args) => TypeSig::GenericInst(
                Box::new(element.with_scope(scope)),
                args.iter().map(|arg| arg.with_scope(scope)).collect(),
            ),
            TypeSig::SzArray(element) => TypeSig::SzArray(Box::new(element.with_scope(scope))),
            TypeSig::Array(element, rank) => {
                TypeSig::Array(Box::new(element.with_scope(scope)), *rank)
            }
            TypeSig::Ptr(element) => TypeSig::Ptr(Box::new(element.with_scope(scope))),
            TypeSig::ByRef(element) => TypeSig::ByRef(Box::new(element.with_scope(scope))),
            _ => self.clone(),
        }
    }

    /// Collect the scopes of every type reference in this signature.
    pub fn collect_scopes<'a>(&'a self, scopes: &mut Vec<&'a str>) {
        match self {
            TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => {
                scopes.push(&type_ref.scope);
            }
            TypeSig::GenericInst(element, args) => {
                element.collect_scopes(scopes);
                for arg in args {
                    arg.collect_scopes(scopes);
                }
            }
            TypeSig::SzArray(element)
            | TypeSig::Array(element, _)
            | TypeSig::Ptr(element)
            | TypeSig::ByRef(element) => element.collect_scopes(scopes),
            _ => {}
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.primitive_name() {
            return f.write_str(name);
        }

        match self {
            TypeSig::Class(type_ref) | TypeSig::ValueType(type_ref) => write!(f, "{type_ref}"),
            TypeSig::GenericInst(element, args) => {
                write!(f, "{element}<")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            TypeSig::Var(name) | TypeSig::MVar(name) => f.write_str(name),
            TypeSig::SzArray(element) => write!(f, "{element}[]"),
            TypeSig::Array(element, rank) => {
                write!(f, "{element}[")?;
                for _ in 1..*rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            TypeSig::Ptr(element) => write!(f, "{element}*"),
            TypeSig::ByRef(element) => write!(f, "{element}&"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_type(name: &str) -> TypeRef {
        TypeRef::new("", "Game", name)
    }

    #[test]
    fn full_names() {
        let outer = game_type("HeroController");
        let inner = TypeRef::nested(outer.clone(), "State");
        assert_eq!(outer.full_name(), "Game.HeroController");
        assert_eq!(inner.full_name(), "Game.HeroController/State");
        assert_eq!(TypeRef::new("", "", "Global").full_name(), "Global");

        let dict = TypeRef::new(CORLIB, "System.Collections.Generic", "Dictionary`2");
        let sig = TypeSig::GenericInst(
            Box::new(TypeSig::Class(dict)),
            vec![TypeSig::String, TypeSig::SzArray(Box::new(TypeSig::Class(inner)))],
        );
        assert_eq!(
            sig.full_name(),
            "System.Collections.Generic.Dictionary`2<System.String,Game.HeroController/State[]>"
        );

        assert_eq!(TypeSig::Array(Box::new(TypeSig::I4), 3).full_name(), "System.Int32[,,]");
        assert_eq!(TypeSig::ByRef(Box::new(TypeSig::R4)).full_name(), "System.Single&");
        assert_eq!(TypeSig::Ptr(Box::new(TypeSig::U1)).full_name(), "System.Byte*");
        assert_eq!(TypeSig::MVar("T".into()).full_name(), "T");
    }

    #[test]
    fn namespace_membership() {
        let facade = TypeRef::new("HKReflect", "HKReflect.Game", "Hero");
        assert!(facade.is_in_namespace("HKReflect"));
        assert!(!facade.is_in_namespace("HKRef"));
        assert!(!facade.is_in_namespace("HKReflect.Gam"));

        let nested = TypeRef::nested(TypeRef::new("", "HKReflect", "Reflector"), "Inner");
        assert!(nested.is_in_namespace("HKReflect"));
        assert!(!TypeRef::new("", "HKReflectX", "A").is_in_namespace("HKReflect"));
    }

    #[test]
    fn element_ref_of_constructed_types() {
        let hero = game_type("Hero");
        let sig = TypeSig::ByRef(Box::new(TypeSig::SzArray(Box::new(TypeSig::Class(hero.clone())))));
        assert_eq!(sig.element_ref(), Some(&hero));
        assert_eq!(TypeSig::I4.element_ref(), None);
        assert_eq!(TypeSig::Var("T".into()).element_ref(), None);
    }

    #[test]
    fn mentions_generic_arguments() {
        let list = TypeRef::new(CORLIB, "System.Collections.Generic", "List`1");
        let sig = TypeSig::GenericInst(
            Box::new(TypeSig::Class(list)),
            vec![TypeSig::Class(TypeRef::new("HKReflect", "HKReflect", "Hero"))],
        );
        assert!(sig.mentions(&|r: &TypeRef| r.is_in_namespace("HKReflect")));
        assert!(!TypeSig::Object.mentions(&|_: &TypeRef| true));
    }

    #[test]
    fn map_refs_replaces_nested_occurrences() {
        let facade = TypeRef::new("HKReflect", "HKReflect.Game", "Hero");
        let sig = TypeSig::SzArray(Box::new(TypeSig::Class(facade)));

        let mapped = sig
            .try_map_refs(&mut |r| {
                Ok(r.is_in_namespace("HKReflect")
                    .then(|| TypeSig::Class(TypeRef::new("Assembly-CSharp", "Game", "Hero"))))
            })
            .unwrap();
        assert_eq!(mapped.full_name(), "Game.Hero[]");
        assert_eq!(mapped.element_ref().unwrap().scope, "Assembly-CSharp");
    }

    #[test]
    fn with_scope_only_fills_empty() {
        let local = TypeRef::nested(game_type("Hero"), "State");
        let imported = TypeSig::Class(local).with_scope("Assembly-CSharp");
        let type_ref = imported.element_ref().unwrap();
        assert_eq!(type_ref.scope, "Assembly-CSharp");
        assert_eq!(type_ref.declaring.as_ref().unwrap().scope, "Assembly-CSharp");

        let foreign = TypeSig::Class(TypeRef::new("UnityEngine", "UnityEngine", "Vector3"));
        assert_eq!(
            foreign.with_scope("Assembly-CSharp").element_ref().unwrap().scope,
            "UnityEngine"
        );
    }
}
