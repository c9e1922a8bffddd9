//! Type and member definitions.
//!
//! Definitions own their members: a [`TypeDef`] holds its fields, methods, properties and
//! nested types directly. A definition does not know its own full name since that depends on
//! the enclosing types; [`crate::metadata::CilModule::walk_types`] hands out the matching
//! [`TypeRef`] alongside each definition.

use crate::{
    assembly::MethodBody,
    metadata::{
        references::{FieldRef, MethodRef},
        typesystem::{
            FieldAttributes, MethodAttributes, ParamAttributes, PropertyAttributes,
            TypeAttributes, TypeRef, TypeSig,
        },
    },
};

/// Full name of the attribute compilers put on synthesized members
pub const COMPILER_GENERATED_ATTRIBUTE: &str = "System.Runtime.CompilerServices.CompilerGeneratedAttribute";
/// Full name of the attribute that marks extension methods and their containers
pub const EXTENSION_ATTRIBUTE: &str = "System.Runtime.CompilerServices.ExtensionAttribute";

/// A custom attribute argument value.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum AttrValue {
    Bool(bool),
    I4(i32),
    I8(i64),
    R4(f32),
    R8(f64),
    /// A string, `None` for a null reference
    String(Option<String>),
    /// A `System.Type` argument
    Type(TypeSig),
    /// An enum value together with its enum type
    Enum { enum_type: TypeRef, value: i64 },
}

/// A named custom attribute argument (field or property assignment).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    /// `true` for field assignments, `false` for properties
    pub is_field: bool,
    /// Name of the assigned member
    pub name: String,
    /// Assigned value
    pub value: AttrValue,
}

/// A custom attribute attached to a type, member, parameter or assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// The attribute constructor
    pub ctor: MethodRef,
    /// Constructor arguments
    pub fixed_args: Vec<AttrValue>,
    /// Field and property assignments
    pub named_args: Vec<NamedArg>,
}

impl CustomAttribute {
    /// Attribute created through its parameterless constructor.
    #[must_use]
    pub fn parameterless(attribute_type: TypeRef) -> Self {
        CustomAttribute {
            ctor: MethodRef::new(
                TypeSig::Class(attribute_type),
                ".ctor",
                true,
                TypeSig::Void,
                Vec::new(),
            ),
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Full name of the attribute type.
    #[must_use]
    pub fn attribute_type_name(&self) -> String {
        self.ctor.declaring_type.full_name()
    }

    /// Copy with every empty type scope replaced by `scope`.
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> CustomAttribute {
        CustomAttribute {
            ctor: self.ctor.with_scope(scope),
            fixed_args: self.fixed_args.clone(),
            named_args: self.named_args.clone(),
        }
    }
}

/// Returns `true` if `attributes` contain an attribute of type `full_name`.
#[must_use]
pub fn has_attribute(attributes: &[CustomAttribute], full_name: &str) -> bool {
    attributes
        .iter()
        .any(|attribute| attribute.attribute_type_name() == full_name)
}

/// A generic parameter of a type or method.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    /// Parameter name
    pub name: String,
    /// Constraint types
    pub constraints: Vec<TypeSig>,
}

/// A field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field flags
    pub flags: FieldAttributes,
    /// Declared type
    pub field_type: TypeSig,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a field without custom attributes.
    pub fn new(name: impl Into<String>, flags: FieldAttributes, field_type: TypeSig) -> Self {
        FieldDef {
            name: name.into(),
            flags,
            field_type,
            custom_attributes: Vec::new(),
        }
    }

    /// Static field
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }

    /// Compile-time constant
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags.contains(FieldAttributes::LITERAL)
    }

    /// Only assignable during initialization
    #[must_use]
    pub fn is_init_only(&self) -> bool {
        self.flags.contains(FieldAttributes::INIT_ONLY)
    }

    /// Reference to this field as declared by `declaring`.
    #[must_use]
    pub fn reference(&self, declaring: TypeSig) -> FieldRef {
        FieldRef::new(declaring, self.name.clone(), self.field_type.clone())
    }
}

/// A method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name, may be empty
    pub name: String,
    /// Parameter flags
    pub flags: ParamAttributes,
    /// Parameter type
    pub param_type: TypeSig,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParamDef {
    /// Create a parameter without flags or custom attributes.
    pub fn new(name: impl Into<String>, param_type: TypeSig) -> Self {
        ParamDef {
            name: name.into(),
            flags: ParamAttributes::empty(),
            param_type,
            custom_attributes: Vec::new(),
        }
    }
}

/// A method definition, with an optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method flags
    pub flags: MethodAttributes,
    /// Implementation flags (ECMA-335 II.23.1.11), kept verbatim
    pub impl_flags: u16,
    /// Return type
    pub return_type: TypeSig,
    /// Parameters, without the implicit `this`
    pub params: Vec<ParamDef>,
    /// Generic parameters of the method
    pub generic_params: Vec<GenericParam>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// CIL body, `None` for abstract, extern and facade methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Create a method without parameters, attributes or body.
    pub fn new(name: impl Into<String>, flags: MethodAttributes, return_type: TypeSig) -> Self {
        MethodDef {
            name: name.into(),
            flags,
            impl_flags: 0,
            return_type,
            params: Vec::new(),
            generic_params: Vec::new(),
            custom_attributes: Vec::new(),
            body: None,
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, param_type: TypeSig) -> Self {
        self.params.push(ParamDef::new(name, param_type));
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Static method
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Public method
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.access() == MethodAttributes::PUBLIC.bits()
    }

    /// Special-name method (accessors, operators, constructors)
    #[must_use]
    pub fn is_special_name(&self) -> bool {
        self.flags.contains(MethodAttributes::SPECIAL_NAME)
    }

    /// Returns `true` if the method declares generic parameters.
    #[must_use]
    pub fn has_generic_params(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Reference to this method as declared by `declaring`.
    #[must_use]
    pub fn reference(&self, declaring: TypeSig) -> MethodRef {
        MethodRef {
            declaring_type: declaring,
            name: self.name.clone(),
            has_this: !self.is_static(),
            return_type: self.return_type.clone(),
            params: self.params.iter().map(|p| p.param_type.clone()).collect(),
            generic_arity: self.generic_params.len() as u32,
            generic_args: Vec::new(),
        }
    }

    /// Cecil-compatible full name as declared by `declaring`.
    #[must_use]
    pub fn full_name(&self, declaring: &TypeRef) -> String {
        self.reference(TypeSig::Class(declaring.clone())).full_name()
    }
}

/// A property definition; accessors are referenced by method name.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Property flags
    pub flags: PropertyAttributes,
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub property_type: TypeSig,
    /// Name of the getter method in the declaring type
    pub getter: Option<String>,
    /// Name of the setter method in the declaring type
    pub setter: Option<String>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl PropertyDef {
    /// Create a property without accessors.
    pub fn new(
        name: impl Into<String>,
        flags: PropertyAttributes,
        has_this: bool,
        property_type: TypeSig,
    ) -> Self {
        PropertyDef {
            name: name.into(),
            flags,
            has_this,
            property_type,
            getter: None,
            setter: None,
            custom_attributes: Vec::new(),
        }
    }
}

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type flags
    pub flags: TypeAttributes,
    /// Declared base type, `None` for interfaces and `System.Object`
    pub base_type: Option<TypeSig>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeSig>,
    /// Generic parameters of the type
    pub generic_params: Vec<GenericParam>,
    /// Fields
    pub fields: Vec<FieldDef>,
    /// Methods, including property accessors
    pub methods: Vec<MethodDef>,
    /// Properties
    pub properties: Vec<PropertyDef>,
    /// Nested types
    pub nested_types: Vec<TypeDef>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Create an empty type.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, flags: TypeAttributes) -> Self {
        TypeDef {
            namespace: namespace.into(),
            name: name.into(),
            flags,
            base_type: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            nested_types: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Set the base type.
    #[must_use]
    pub fn with_base(mut self, base_type: TypeSig) -> Self {
        self.base_type = Some(base_type);
        self
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a method.
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Append a nested type.
    #[must_use]
    pub fn with_nested(mut self, nested: TypeDef) -> Self {
        self.nested_types.push(nested);
        self
    }

    /// Interface type
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Abstract type
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeAttributes::ABSTRACT)
    }

    /// Sealed type
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED)
    }

    /// Abstract and sealed, the shape of a static class
    #[must_use]
    pub fn is_static_class(&self) -> bool {
        self.is_abstract() && self.is_sealed()
    }

    /// Value type (struct or enum)
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.base_type.as_ref().is_some_and(|base| {
            let name = base.full_name();
            (name == "System.ValueType" || name == "System.Enum")
                && !(self.namespace == "System" && self.name == "Enum")
        })
    }

    /// Returns `true` if the type declares generic parameters.
    #[must_use]
    pub fn has_generic_params(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Top-level public type
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.is_public()
    }

    /// Publicly visible nested type
    #[must_use]
    pub fn is_nested_public(&self) -> bool {
        self.flags.is_nested_public()
    }

    /// First field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// First method called `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Nested type called `name`.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&TypeDef> {
        self.nested_types.iter().find(|nested| nested.name == name)
    }

    /// Mutable access to the nested type called `name`.
    pub fn nested_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.nested_types.iter_mut().find(|nested| nested.name == name)
    }
}
