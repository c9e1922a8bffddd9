//! Member references as they appear in instruction operands and custom attributes.
//!
//! A reference names its declaring type and carries the full signature, so that it can be
//! resolved against any module and rendered with Cecil-compatible full names:
//!
//! - fields: `FieldType DeclaringType::Name`
//! - methods: `ReturnType DeclaringType::Name<GenericArgs>(ParamType,ParamType)`

use std::fmt;

use crate::{metadata::typesystem::TypeSig, Result};

/// Reference to a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// The type that declares the field
    pub declaring_type: TypeSig,
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: TypeSig,
}

impl FieldRef {
    /// Create a new field reference.
    pub fn new(declaring_type: TypeSig, name: impl Into<String>, field_type: TypeSig) -> Self {
        FieldRef {
            declaring_type,
            name: name.into(),
            field_type,
        }
    }

    /// Cecil-compatible full name.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// Copy with every empty type scope replaced by `scope`.
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> FieldRef {
        FieldRef {
            declaring_type: self.declaring_type.with_scope(scope),
            name: self.name.clone(),
            field_type: self.field_type.with_scope(scope),
        }
    }

    /// Collect the scopes of every type named by this reference.
    pub fn collect_scopes<'a>(&'a self, scopes: &mut Vec<&'a str>) {
        self.declaring_type.collect_scopes(scopes);
        self.field_type.collect_scopes(scopes);
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// Reference to a method, or to an instantiation of a generic method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    /// The type that declares the method
    pub declaring_type: TypeSig,
    /// Method name
    pub name: String,
    /// Instance method (has an implicit `this`)
    pub has_this: bool,
    /// Return type
    pub return_type: TypeSig,
    /// Parameter types
    pub params: Vec<TypeSig>,
    /// Number of generic parameters of the method definition
    pub generic_arity: u32,
    /// Generic arguments, non-empty for generic method instances
    pub generic_args: Vec<TypeSig>,
}

impl MethodRef {
    /// Create a reference to a non-generic method.
    pub fn new(
        declaring_type: TypeSig,
        name: impl Into<String>,
        has_this: bool,
        return_type: TypeSig,
        params: Vec<TypeSig>,
    ) -> Self {
        MethodRef {
            declaring_type,
            name: name.into(),
            has_this,
            return_type,
            params,
            generic_arity: 0,
            generic_args: Vec::new(),
        }
    }

    /// Returns `true` for instantiations of generic methods.
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Cecil-compatible full name, including generic arguments.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// The generic method definition behind an instantiation (a copy of `self` otherwise).
    #[must_use]
    pub fn element_method(&self) -> MethodRef {
        MethodRef {
            generic_args: Vec::new(),
            ..self.clone()
        }
    }

    /// Full name of [`MethodRef::element_method`], the key used by method symbol maps.
    #[must_use]
    pub fn element_full_name(&self) -> String {
        self.element_method().to_string()
    }

    /// Instantiate this generic method definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if the number of arguments does not match the
    /// method's generic arity.
    pub fn make_generic(&self, args: Vec<TypeSig>) -> Result<MethodRef> {
        if args.len() != self.generic_arity as usize {
            return Err(crate::Error::Error(format!(
                "Generic argument count mismatch for {}, expects {}, got {}",
                self.full_name(),
                self.generic_arity,
                args.len()
            )));
        }

        Ok(MethodRef {
            generic_args: args,
            ..self.element_method()
        })
    }

    /// Copy with every empty type scope replaced by `scope`.
    #[must_use]
    pub fn with_scope(&self, scope: &str) -> MethodRef {
        MethodRef {
            declaring_type: self.declaring_type.with_scope(scope),
            name: self.name.clone(),
            has_this: self.has_this,
            return_type: self.return_type.with_scope(scope),
            params: self.params.iter().map(|p| p.with_scope(scope)).collect(),
            generic_arity: self.generic_arity,
            generic_args: self.generic_args.iter().map(|a| a.with_scope(scope)).collect(),
        }
    }

    /// Collect the scopes of every type named by this reference.
    pub fn collect_scopes<'a>(&'a self, scopes: &mut Vec<&'a str>) {
        self.declaring_type.collect_scopes(scopes);
        self.return_type.collect_scopes(scopes);
        for sig in self.params.iter().chain(&self.generic_args) {
            sig.collect_scopes(scopes);
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.return_type, self.declaring_type, self.name)?;

        if !self.generic_args.is_empty() {
            f.write_str("<")?;
            write_list(f, &self.generic_args)?;
            f.write_str(">")?;
        }

        f.write_str("(")?;
        write_list(f, &self.params)?;
        f.write_str(")")
    }
}

/// Stand-alone method signature, the operand of `calli`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Instance call (has an implicit `this`)
    pub has_this: bool,
    /// Return type
    pub return_type: TypeSig,
    /// Parameter types
    pub params: Vec<TypeSig>,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} *(", self.return_type)?;
        write_list(f, &self.params)?;
        f.write_str(")")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, sigs: &[TypeSig]) -> fmt::Result {
    for (index, sig) in sigs.iter().enumerate() {
        if index > 0 {
            f.write_str(",")?;
        }
        write!(f, "{sig}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeRef;

    fn player_data() -> TypeSig {
        TypeSig::Class(TypeRef::new("Assembly-CSharp", "", "PlayerData"))
    }

    #[test]
    fn field_full_name() {
        let field = FieldRef::new(player_data(), "health", TypeSig::I4);
        assert_eq!(field.full_name(), "System.Int32 PlayerData::health");
    }

    #[test]
    fn method_full_names() {
        let method = MethodRef::new(
            player_data(),
            "SetIntSwappedArgs",
            true,
            TypeSig::Void,
            vec![TypeSig::I4, TypeSig::String],
        );
        assert_eq!(
            method.full_name(),
            "System.Void PlayerData::SetIntSwappedArgs(System.Int32,System.String)"
        );
    }

    #[test]
    fn generic_instances() {
        let mut get_variable = MethodRef::new(
            player_data(),
            "GetVariable",
            true,
            TypeSig::MVar("T".into()),
            vec![TypeSig::String],
        );
        get_variable.generic_arity = 1;

        let instance = get_variable.make_generic(vec![TypeSig::R8]).unwrap();
        assert_eq!(
            instance.full_name(),
            "T PlayerData::GetVariable<System.Double>(System.String)"
        );
        assert_eq!(instance.element_full_name(), "T PlayerData::GetVariable(System.String)");
        assert_eq!(instance.element_method(), get_variable);

        assert!(get_variable.make_generic(vec![]).is_err());
    }

    #[test]
    fn with_scope_imports_signature() {
        let local = TypeSig::Class(TypeRef::new("", "Game", "Hero"));
        let method = MethodRef::new(local.clone(), "Attack", true, local, vec![TypeSig::I4]);

        let imported = method.with_scope("Assembly-CSharp");
        let mut scopes = Vec::new();
        imported.collect_scopes(&mut scopes);
        assert_eq!(scopes, vec!["Assembly-CSharp", "Assembly-CSharp"]);
        assert_eq!(imported.full_name(), method.full_name());
    }
}
