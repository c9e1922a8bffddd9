//! Declarative security of a module.
//!
//! Rewritten modules access members of the target program that are not visible to them. The
//! runtime accepts this when the assembly requests `SkipVerification` through an assembly-level
//! `RequestMinimum` declaration of `System.Security.Permissions.SecurityPermissionAttribute`.
//! [`CilModule::ensure_skip_verification`] adds that declaration unless the module already
//! carries it, either as a security declaration or as the equivalent custom attribute.
//!
//! # Reference
//! * ECMA-335 II.22.11
//! * <https://learn.microsoft.com/en-us/dotnet/api/system.security.permissions.securityaction>

use strum::{Display, FromRepr};

use crate::metadata::{
    members::{AttrValue, CustomAttribute, NamedArg},
    module::CilModule,
    typesystem::{TypeRef, CORLIB},
};

/// Full name of the permission attribute carrying `SkipVerification`
pub const SECURITY_PERMISSION_ATTRIBUTE: &str =
    "System.Security.Permissions.SecurityPermissionAttribute";

/// Name of the flag that disables visibility checks
pub const SKIP_VERIFICATION: &str = "SkipVerification";

/// Security actions as defined in ECMA-335 and the .NET Framework.
///
/// These values control how a permission set is applied to the code element that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u16)]
pub enum SecurityAction {
    /// Request a permission (unused by the runtime)
    Request = 0x0001,
    /// Check that all callers in the call chain have been granted the permission
    Demand = 0x0002,
    /// Satisfy demands for the permission without further checks
    Assert = 0x0003,
    /// Refuse demands for the permission without further checks
    Deny = 0x0004,
    /// Refuse demands for all permissions other than the specified ones
    PermitOnly = 0x0005,
    /// Check that the immediate caller has been granted the permission
    LinkDemand = 0x0006,
    /// The permission is required to inherit from a type or override a method
    InheritanceDemand = 0x0007,
    /// Minimum permissions the assembly needs to run
    RequestMinimum = 0x0008,
    /// Optional permissions the assembly would like to be granted
    RequestOptional = 0x0009,
    /// Permissions the assembly must not be granted
    RequestRefuse = 0x000A,
    /// Reserved for prejitting
    PreJitGrant = 0x000B,
    /// Reserved for prejitting
    PreJitDeny = 0x000C,
    /// Non-CAS version of `Demand`
    NonCasDemand = 0x000D,
    /// Non-CAS version of `LinkDemand`
    NonCasLinkDemand = 0x000E,
    /// Non-CAS version of `InheritanceDemand`
    NonCasInheritance = 0x000F,
}

/// One permission attribute inside a security declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityAttribute {
    /// The permission attribute type
    pub attribute_type: TypeRef,
    /// Property and field assignments
    pub named_args: Vec<NamedArg>,
}

/// A declarative security declaration (`DeclSecurity` row).
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityDeclaration {
    /// How the permissions are applied
    pub action: SecurityAction,
    /// The permission attributes
    pub attributes: Vec<SecurityAttribute>,
}

impl SecurityDeclaration {
    /// The `RequestMinimum` declaration requesting `SkipVerification = true`.
    #[must_use]
    pub fn skip_verification() -> Self {
        SecurityDeclaration {
            action: SecurityAction::RequestMinimum,
            attributes: vec![SecurityAttribute {
                attribute_type: TypeRef::new(
                    CORLIB,
                    "System.Security.Permissions",
                    "SecurityPermissionAttribute",
                ),
                named_args: vec![NamedArg {
                    is_field: false,
                    name: SKIP_VERIFICATION.to_string(),
                    value: AttrValue::Bool(true),
                }],
            }],
        }
    }

    /// Returns `true` if this declaration grants `SkipVerification` at load time.
    #[must_use]
    pub fn requests_skip_verification(&self) -> bool {
        self.action == SecurityAction::RequestMinimum
            && self.attributes.iter().any(|attribute| {
                attribute.attribute_type.full_name() == SECURITY_PERMISSION_ATTRIBUTE
                    && skips_verification(&attribute.named_args)
            })
    }
}

fn skips_verification(named_args: &[NamedArg]) -> bool {
    named_args
        .iter()
        .any(|arg| arg.name == SKIP_VERIFICATION && arg.value == AttrValue::Bool(true))
}

fn is_request_minimum(value: &AttrValue) -> bool {
    let raw = match value {
        AttrValue::Enum { value, .. } => *value,
        AttrValue::I4(value) => i64::from(*value),
        _ => return false,
    };
    raw == SecurityAction::RequestMinimum as i64
}

/// Returns `true` if `attribute` is `[SecurityPermission(RequestMinimum, SkipVerification = true)]`.
fn is_skip_verification_attribute(attribute: &CustomAttribute) -> bool {
    if attribute.attribute_type_name() != SECURITY_PERMISSION_ATTRIBUTE {
        return false;
    }

    let action = attribute.fixed_args.first().is_some_and(is_request_minimum)
        || attribute
            .named_args
            .iter()
            .any(|arg| arg.name == "Action" && is_request_minimum(&arg.value));

    action && skips_verification(&attribute.named_args)
}

impl CilModule {
    /// Returns `true` if the module already requests `SkipVerification`.
    #[must_use]
    pub fn has_skip_verification(&self) -> bool {
        self.security_declarations
            .iter()
            .any(SecurityDeclaration::requests_skip_verification)
            || self.custom_attributes.iter().any(is_skip_verification_attribute)
    }

    /// Request `SkipVerification` unless the module already does.
    ///
    /// Returns `true` if a declaration was added.
    pub fn ensure_skip_verification(&mut self) -> bool {
        if self.has_skip_verification() {
            return false;
        }

        self.security_declarations
            .push(SecurityDeclaration::skip_verification());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{module::Version, typesystem::TypeSig};

    #[test]
    fn action_values() {
        assert_eq!(SecurityAction::RequestMinimum as u16, 8);
        assert_eq!(SecurityAction::from_repr(8), Some(SecurityAction::RequestMinimum));
        assert_eq!(SecurityAction::from_repr(0), None);
        assert_eq!(SecurityAction::Demand.to_string(), "Demand");
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut module = CilModule::new("Plugin", Version::default());
        assert!(!module.has_skip_verification());

        assert!(module.ensure_skip_verification());
        assert!(module.has_skip_verification());
        assert!(!module.ensure_skip_verification());
        assert_eq!(module.security_declarations.len(), 1);
    }

    #[test]
    fn other_declarations_do_not_count() {
        let mut module = CilModule::new("Plugin", Version::default());
        let mut declaration = SecurityDeclaration::skip_verification();
        declaration.action = SecurityAction::RequestOptional;
        module.security_declarations.push(declaration);
        assert!(!module.has_skip_verification());

        let mut declaration = SecurityDeclaration::skip_verification();
        declaration.attributes[0].named_args[0].value = AttrValue::Bool(false);
        module.security_declarations.push(declaration);
        assert!(!module.has_skip_verification());
    }

    #[test]
    fn custom_attribute_form_is_recognized() {
        let mut module = CilModule::new("Plugin", Version::default());
        let permission = TypeRef::new(CORLIB, "System.Security.Permissions", "SecurityPermissionAttribute");
        let action_type = TypeRef::new(CORLIB, "System.Security.Permissions", "SecurityAction");

        let mut attribute = CustomAttribute::parameterless(permission);
        attribute.ctor.params.push(TypeSig::ValueType(action_type.clone()));
        attribute.fixed_args.push(AttrValue::Enum {
            enum_type: action_type,
            value: 8,
        });
        attribute.named_args.push(NamedArg {
            is_field: false,
            name: SKIP_VERIFICATION.to_string(),
            value: AttrValue::Bool(true),
        });
        module.custom_attributes.push(attribute);

        assert!(module.has_skip_verification());
        assert!(!module.ensure_skip_verification());
        assert!(module.security_declarations.is_empty());
    }
}
