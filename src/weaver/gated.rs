//! Accessor selection for the visibility-gated type.
//!
//! Fields of the gated type are never touched directly. Loads go through its typed getters
//! (`GetInt(name)`), stores through the setters taking the value first and the field name
//! second (`SetIntSwappedArgs(value, name)`). Field types without a dedicated overload use
//! the generic `GetVariable<T>` / `SetVariableSwappedArgs<T>`.

use crate::{
    assembly::OpCode,
    metadata::{
        members::TypeDef,
        references::{FieldRef, MethodRef},
        typesystem::{TypeRef, TypeSig},
        CilModule,
    },
    Result,
};

/// Dedicated overloads by field type full name: (field type, getter, setter)
const OVERLOADS: &[(&str, &str, &str)] = &[
    ("System.Boolean", "GetBool", "SetBoolSwappedArgs"),
    ("System.Int32", "GetInt", "SetIntSwappedArgs"),
    ("System.Single", "GetFloat", "SetFloatSwappedArgs"),
    ("UnityEngine.Vector3", "GetVector3", "SetVector3SwappedArgs"),
];

const GENERIC_GETTER: &str = "GetVariable";
const GENERIC_SETTER: &str = "SetVariableSwappedArgs";

/// Direction of a field access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `ldfld`
    Load,
    /// `stfld`
    Store,
}

impl Access {
    /// Accessor direction for `opcode`, `None` for static and address accesses, which keep a
    /// plain field operand.
    #[must_use]
    pub fn of(opcode: OpCode) -> Option<Access> {
        match opcode {
            OpCode::Ldfld => Some(Access::Load),
            OpCode::Stfld => Some(Access::Store),
            _ => None,
        }
    }
}

/// Name of the accessor for a field of type `field_type`; `true` if it is the generic one.
#[must_use]
pub fn accessor_name(access: Access, field_type: &str) -> (&'static str, bool) {
    let overload = OVERLOADS.iter().find(|(name, _, _)| *name == field_type);
    match (access, overload) {
        (Access::Load, Some((_, getter, _))) => (getter, false),
        (Access::Store, Some((_, _, setter))) => (setter, false),
        (Access::Load, None) => (GENERIC_GETTER, true),
        (Access::Store, None) => (GENERIC_SETTER, true),
    }
}

/// Resolves accessors on the gated type of one target module.
pub struct GatedAccessors<'a> {
    target: &'a CilModule,
    def: &'a TypeDef,
    declaring: TypeSig,
}

impl<'a> GatedAccessors<'a> {
    /// Accessors of the target type `type_name`, `None` if the target does not define it.
    #[must_use]
    pub fn new(target: &'a CilModule, type_name: &str) -> Option<Self> {
        let def = target.find_type(type_name)?;
        let declaring = TypeSig::Class(TypeRef::new(
            target.name.clone(),
            def.namespace.clone(),
            def.name.clone(),
        ));
        Some(GatedAccessors {
            target,
            def,
            declaring,
        })
    }

    /// The accessor replacing `access` of `field`, a field of the gated type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the gated type lacks the accessor.
    pub fn accessor(&self, access: Access, field: &FieldRef) -> Result<MethodRef> {
        let (name, generic) = accessor_name(access, &field.field_type.full_name());
        let method = self
            .def
            .methods
            .iter()
            .find(|method| method.name == name && method.has_generic_params() == generic)
            .ok_or_else(|| {
                invariant_error!(field.full_name(), "accessor {}::{} is missing", self.declaring, name)
            })?;

        let reference = method
            .reference(self.declaring.clone())
            .with_scope(&self.target.name);
        if generic {
            reference.make_generic(vec![field.field_type.clone()])
        } else {
            Ok(reference)
        }
    }
}
