//! Regeneration of singleton accessors.
//!
//! A call to `<root>.Singletons::get_<Name>R()` becomes the instance accessor of the target type
//! `<Name>`: a `call` of its static getter, or a `ldsfld` of its static instance field.

use crate::{
    assembly::{OpCode, Operand},
    facade::singletons::{Singleton, SingletonAccess},
    metadata::{typesystem::TypeRef, typesystem::TypeSig, CilModule},
    Result,
};

/// Singleton table bound to one target module.
pub struct SingletonRegistry<'a> {
    target: &'a CilModule,
    entries: &'a [Singleton],
}

impl<'a> SingletonRegistry<'a> {
    /// Registry over `entries`, resolving accessors in `target`.
    #[must_use]
    pub fn new(target: &'a CilModule, entries: &'a [Singleton]) -> Self {
        SingletonRegistry { target, entries }
    }

    /// Registry entry for the target type `type_name`.
    #[must_use]
    pub fn entry(&self, type_name: &str) -> Option<&Singleton> {
        self.entries.iter().find(|entry| entry.type_name == type_name)
    }

    /// The instruction that loads the instance of the target type `type_name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the type is not a registered singleton or lacks
    /// its accessor, and [`crate::Error::TypeNotFound`] if the target does not define it.
    pub fn accessor(&self, type_name: &str) -> Result<(OpCode, Operand)> {
        let entry = self
            .entry(type_name)
            .ok_or_else(|| invariant_error!(type_name, "type is not a registered singleton"))?;

        let def = self.target.require_type(type_name)?;
        let (namespace, name) = type_name.rsplit_once('.').unwrap_or(("", type_name));
        let declaring = TypeSig::Class(TypeRef::new(self.target.name.clone(), namespace, name));

        match entry.access {
            SingletonAccess::Getter(getter) => {
                let method = def
                    .method(getter)
                    .filter(|method| method.is_static())
                    .ok_or_else(|| invariant_error!(type_name, "static accessor {} is missing", getter))?;
                Ok((
                    OpCode::Call,
                    Operand::Method(method.reference(declaring).with_scope(&self.target.name)),
                ))
            }
            SingletonAccess::Field(field) => {
                let field = def
                    .field(field)
                    .filter(|field| field.is_static())
                    .ok_or_else(|| invariant_error!(type_name, "static field {} is missing", field))?;
                Ok((
                    OpCode::Ldsfld,
                    Operand::Field(field.reference(declaring).with_scope(&self.target.name)),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{facade::singletons::SINGLETONS, test::TargetBuilder, Error};

    #[test]
    fn getter_and_field_access() {
        let target = TargetBuilder::scenario();
        let registry = SingletonRegistry::new(&target, SINGLETONS);

        let (opcode, operand) = registry.accessor("PlayerData").unwrap();
        assert_eq!(opcode, OpCode::Call);
        let Operand::Method(method) = operand else {
            panic!("expected a method operand");
        };
        assert_eq!(method.full_name(), "PlayerData PlayerData::get_instance()");
        assert!(!method.has_this);

        let (opcode, operand) = registry.accessor("InputHandler").unwrap();
        assert_eq!(opcode, OpCode::Ldsfld);
        let Operand::Field(field) = operand else {
            panic!("expected a field operand");
        };
        assert_eq!(field.full_name(), "InputHandler InputHandler::Instance");
        assert_eq!(field.declaring_type.element_ref().unwrap().scope, "Assembly-CSharp");
    }

    #[test]
    fn unknown_singletons_are_rejected() {
        let target = TargetBuilder::scenario();
        let registry = SingletonRegistry::new(&target, SINGLETONS);

        assert!(matches!(registry.accessor("Game.T"), Err(Error::Invariant { .. })));
        // Registered, but the scenario target does not define it
        assert!(matches!(registry.accessor("ObjectPool"), Err(Error::TypeNotFound(_))));
    }
}
