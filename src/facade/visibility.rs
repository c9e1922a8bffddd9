//! Eligibility rules for facade generation.
//!
//! Only members whose whole signature can be named from outside the target program are
//! mirrored. A type counts as publicly available if it is a generic parameter or if its
//! visibility is `Public` xor `NestedPublic`; the visibility of enclosing types is not taken
//! into account. References that can not be resolved count as unavailable.

use crate::metadata::{
    members::{
        has_attribute, CustomAttribute, FieldDef, GenericParam, MethodDef, PropertyDef, TypeDef,
        COMPILER_GENERATED_ATTRIBUTE,
    },
    typesystem::TypeSig,
    AssemblyResolver, CilModule,
};

/// Returns `true` if `attributes` mark a compiler-synthesized member.
#[must_use]
pub fn is_compiler_generated(attributes: &[CustomAttribute]) -> bool {
    has_attribute(attributes, COMPILER_GENERATED_ATTRIBUTE)
}

/// Publicly available type definition.
#[must_use]
pub fn is_type_def_available(def: &TypeDef) -> bool {
    def.is_public() ^ def.is_nested_public()
}

/// Answers availability questions about members of one module.
pub struct Visibility<'a> {
    context: &'a CilModule,
    resolver: &'a AssemblyResolver,
}

impl<'a> Visibility<'a> {
    /// Classifier for members of `context`, resolving foreign types through `resolver`.
    #[must_use]
    pub fn new(context: &'a CilModule, resolver: &'a AssemblyResolver) -> Self {
        Visibility { context, resolver }
    }

    /// Publicly available type signature.
    ///
    /// Primitives and generic parameters are always available. Constructed types and generic
    /// instances are judged by their element type; a constructed generic parameter (`T[]`)
    /// names no definition and is unavailable.
    #[must_use]
    pub fn is_type_available(&self, sig: &TypeSig) -> bool {
        if sig.is_generic_param() {
            return true;
        }

        let element = innermost(sig);
        if element.primitive_name().is_some() {
            return true;
        }

        let Some(type_ref) = element.element_ref() else {
            return false;
        };

        matches!(
            self.resolver
                .with_type(self.context, type_ref, |def| Ok(is_type_def_available(def))),
            Ok(Some(true))
        )
    }

    /// Field that can be mirrored: not a constant, not init-only, of an available type.
    #[must_use]
    pub fn is_field_available(&self, field: &FieldDef) -> bool {
        !field.is_literal() && !field.is_init_only() && self.is_type_available(&field.field_type)
    }

    /// Property of an available type.
    #[must_use]
    pub fn is_property_available(&self, property: &PropertyDef) -> bool {
        self.is_type_available(&property.property_type)
    }

    /// Method whose return type, parameter types and generic constraints are available.
    #[must_use]
    pub fn is_method_available(&self, method: &MethodDef) -> bool {
        self.is_type_available(&method.return_type)
            && method
                .params
                .iter()
                .all(|param| self.is_type_available(&param.param_type))
            && method
                .generic_params
                .iter()
                .all(|param| self.is_generic_param_available(param))
    }

    fn is_generic_param_available(&self, param: &GenericParam) -> bool {
        param
            .constraints
            .iter()
            .all(|constraint| self.is_type_available(constraint))
    }
}

/// The element type under arrays, pointers, by-refs and generic instantiations.
fn innermost(sig: &TypeSig) -> &TypeSig {
    match sig {
        TypeSig::GenericInst(element, _)
        | TypeSig::SzArray(element)
        | TypeSig::Array(element, _)
        | TypeSig::Ptr(element)
        | TypeSig::ByRef(element) => innermost(element),
        _ => sig,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            members::ParamDef,
            typesystem::{FieldAttributes, MethodAttributes, PropertyAttributes, TypeAttributes, TypeRef},
            Version,
        },
        test::TargetBuilder,
    };

    fn local(name: &str) -> TypeSig {
        TypeSig::Class(TypeRef::new("", "Game", name))
    }

    fn module() -> CilModule {
        TargetBuilder::new()
            .class("Game", "Open", TypeAttributes::PUBLIC)
            .class("Game", "Hidden", TypeAttributes::empty())
            .build()
    }

    #[test]
    fn type_rule() {
        let module = module();
        let resolver = AssemblyResolver::new();
        let visibility = Visibility::new(&module, &resolver);

        assert!(visibility.is_type_available(&TypeSig::I4));
        assert!(visibility.is_type_available(&TypeSig::MVar("T".into())));
        assert!(visibility.is_type_available(&local("Open")));
        assert!(visibility.is_type_available(&TypeSig::SzArray(Box::new(local("Open")))));
        assert!(visibility.is_type_available(&TypeSig::ByRef(Box::new(TypeSig::R8))));
        assert!(!visibility.is_type_available(&TypeSig::SzArray(Box::new(TypeSig::Var("T".into())))));
        assert!(!visibility.is_type_available(&local("Hidden")));
        assert!(!visibility.is_type_available(&TypeSig::SzArray(Box::new(local("Hidden")))));
        assert!(!visibility.is_type_available(&local("Missing")));

        let foreign = TypeSig::Class(TypeRef::new("Elsewhere", "X", "Y"));
        assert!(!visibility.is_type_available(&foreign));
    }

    #[test]
    fn nested_public_ignores_enclosing_visibility() {
        let hidden = TypeDef::new("", "Inner", TypeAttributes::NESTED_PUBLIC);
        let outer = TypeDef::new("Game", "Outer", TypeAttributes::empty()).with_nested(hidden);
        let mut module = CilModule::new("Assembly-CSharp", Version::default());
        module.types.push(outer);

        let resolver = AssemblyResolver::new();
        let visibility = Visibility::new(&module, &resolver);
        let inner = TypeRef::nested(TypeRef::new("", "Game", "Outer"), "Inner");
        assert!(visibility.is_type_available(&TypeSig::Class(inner)));
        assert!(!visibility.is_type_available(&local("Outer")));
    }

    #[test]
    fn field_rule() {
        let module = module();
        let resolver = AssemblyResolver::new();
        let visibility = Visibility::new(&module, &resolver);

        assert!(visibility.is_field_available(&FieldDef::new("a", FieldAttributes::PRIVATE, TypeSig::I4)));
        assert!(!visibility.is_field_available(&FieldDef::new(
            "b",
            FieldAttributes::PRIVATE | FieldAttributes::LITERAL | FieldAttributes::STATIC,
            TypeSig::I4
        )));
        assert!(!visibility.is_field_available(&FieldDef::new(
            "c",
            FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
            TypeSig::I4
        )));
        assert!(!visibility.is_field_available(&FieldDef::new("d", FieldAttributes::PRIVATE, local("Hidden"))));
    }

    #[test]
    fn method_and_property_rules() {
        let module = module();
        let resolver = AssemblyResolver::new();
        let visibility = Visibility::new(&module, &resolver);

        let open = MethodDef::new("M", MethodAttributes::PRIVATE, local("Open")).with_param("x", TypeSig::R4);
        assert!(visibility.is_method_available(&open));

        let hidden_param = open.clone().with_param("y", local("Hidden"));
        assert!(!visibility.is_method_available(&hidden_param));

        let mut constrained = open.clone();
        constrained.generic_params.push(GenericParam {
            name: "T".into(),
            constraints: vec![local("Hidden")],
        });
        assert!(!visibility.is_method_available(&constrained));

        let mut forwarded = open.clone();
        forwarded.params.push(ParamDef::new("z", TypeSig::MVar("T".into())));
        assert!(visibility.is_method_available(&forwarded));

        let property = PropertyDef::new("P", PropertyAttributes::empty(), true, local("Hidden"));
        assert!(!visibility.is_property_available(&property));
    }

    #[test]
    fn compiler_generated_detection() {
        let mut field = FieldDef::new("<x>k__BackingField", FieldAttributes::PRIVATE, TypeSig::I4);
        assert!(!is_compiler_generated(&field.custom_attributes));
        field.custom_attributes.push(crate::test::compiler_generated());
        assert!(is_compiler_generated(&field.custom_attributes));
    }
}
