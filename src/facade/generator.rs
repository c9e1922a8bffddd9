//! Mirroring of target types into facade types.
//!
//! Every candidate type goes through two phases: its eligible members are collected into a
//! [`FacadeType`] draft, and the draft only becomes a type of the facade module if something
//! was collected. Abstract sealed types (static classes) take the static path, everything
//! else the instance path.

use crate::{
    facade::{
        symbolmap::SymbolMap,
        visibility::{is_compiler_generated, is_type_def_available, Visibility},
        SynthesizerConfig,
    },
    metadata::{
        members::{
            CustomAttribute, FieldDef, MethodDef, ParamDef, PropertyDef, TypeDef,
            EXTENSION_ATTRIBUTE,
        },
        typesystem::{
            FieldAttributes, MethodAttributes, PropertyAttributes, TypeAttributes, TypeRef,
            TypeSig, CORLIB,
        },
        AssemblyResolver, CilModule,
    },
    Result,
};

/// Name of the namespace partition holding static facades
pub const STATIC_PARTITION: &str = "Static";
/// Suffix appended to the names of static facades
pub const STATIC_SUFFIX: char = 'R';

const SYSTEM_OBJECT: &str = "System.Object";
const SYSTEM_ATTRIBUTE: &str = "System.Attribute";
/// Bound for base type chains, cycles in damaged modules end here
const MAX_BASE_DEPTH: usize = 64;

/// `System.Runtime.CompilerServices.ExtensionAttribute`
pub(crate) fn extension_attribute() -> CustomAttribute {
    let (namespace, name) = EXTENSION_ATTRIBUTE.rsplit_once('.').unwrap_or(("", EXTENSION_ATTRIBUTE));
    CustomAttribute::parameterless(TypeRef::new(CORLIB, namespace, name))
}

/// A facade type under construction together with its symbol map.
pub(crate) struct FacadeType {
    /// The reference naming the facade type inside the facade module
    pub type_ref: TypeRef,
    /// The definition
    pub def: TypeDef,
    /// Mirrored member to original member
    pub map: SymbolMap,
    emitted: bool,
}

impl FacadeType {
    fn new(type_ref: TypeRef, flags: TypeAttributes) -> Self {
        let def = TypeDef::new(type_ref.namespace.clone(), type_ref.name.clone(), flags);
        FacadeType {
            type_ref,
            def,
            map: SymbolMap::new(),
            emitted: false,
        }
    }

    fn full_name(&self) -> String {
        self.type_ref.full_name()
    }

    fn add_field(&mut self, field: FieldDef) {
        self.def.fields.push(field);
        self.emitted = true;
    }

    fn add_method(&mut self, method: MethodDef) -> String {
        let full_name = method.full_name(&self.type_ref);
        self.def.methods.push(method);
        self.emitted = true;
        full_name
    }

    fn add_property(&mut self, property: PropertyDef) {
        self.def.properties.push(property);
        self.emitted = true;
    }

    fn add_nested(&mut self, nested: TypeDef) {
        self.def.nested_types.push(nested);
        self.emitted = true;
    }
}

/// Which members a facade mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// Instance and static members, with a `Reflect` conversion
    Instance,
    /// Static members only, under the static partition
    Static,
}

/// Deferred base type assignment, wired once every facade type exists.
pub(crate) struct InheritanceEdge {
    /// Full name of the derived facade type
    pub derived: String,
    /// Full name the facade of the original base type would have
    pub base: String,
}

/// Everything a generation run produces besides the facade types themselves.
#[derive(Default)]
pub(crate) struct Output {
    /// `Reflect` conversions collected for the `Reflector` type
    pub reflect_methods: Vec<MethodDef>,
    /// Symbol maps of every generated facade type, keyed by facade full name
    pub maps: Vec<(String, SymbolMap)>,
    /// Base types to wire after generation
    pub inheritance: Vec<InheritanceEdge>,
    /// Number of instance facades generated
    pub instance_count: usize,
    /// Number of static facades generated
    pub static_count: usize,
}

/// Collects facade types for one target module.
pub(crate) struct Generator<'a> {
    config: &'a SynthesizerConfig,
    target: &'a CilModule,
    resolver: &'a AssemblyResolver,
    visibility: Visibility<'a>,
    output: Output,
}

impl<'a> Generator<'a> {
    pub(crate) fn new(
        config: &'a SynthesizerConfig,
        target: &'a CilModule,
        resolver: &'a AssemblyResolver,
    ) -> Self {
        Generator {
            config,
            target,
            resolver,
            visibility: Visibility::new(target, resolver),
            output: Output::default(),
        }
    }

    /// Finish the run, handing out the collected maps, conversions and edges.
    pub(crate) fn finish(self) -> Output {
        self.output
    }

    /// Scope under which target symbols are referenced from the facade module.
    fn scope(&self) -> &str {
        &self.target.name
    }

    /// Mirror the type `def`, named `original` inside the target module.
    ///
    /// `parent` is the facade type the result will be nested in, `None` for top-level types.
    pub(crate) fn generate(
        &mut self,
        def: &TypeDef,
        original: &TypeRef,
        parent: Option<&TypeRef>,
    ) -> Result<Option<TypeDef>> {
        if def.is_value_type() || def.is_interface() || !is_type_def_available(def) {
            return Ok(None);
        }

        if def.has_generic_params() {
            log::warn!("Skipping type {original} because generic types are not supported");
            return Ok(None);
        }

        if def.is_static_class() {
            self.generate_facade(def, original, parent, Flavor::Static)
        } else {
            if self.derives_from_attribute(def) {
                log::debug!("Skipping attribute type {original}");
                return Ok(None);
            }
            self.generate_facade(def, original, parent, Flavor::Instance)
        }
    }

    fn generate_facade(
        &mut self,
        def: &TypeDef,
        original: &TypeRef,
        parent: Option<&TypeRef>,
        flavor: Flavor,
    ) -> Result<Option<TypeDef>> {
        let mut facade = FacadeType::new(
            self.facade_ref(def, original, parent, flavor),
            facade_flags(def.flags, parent.is_some()),
        );
        let declaring = TypeSig::Class(original.with_scope(self.scope()));

        for field in &def.fields {
            if (flavor == Flavor::Static && !field.is_static())
                || is_compiler_generated(&field.custom_attributes)
                || !self.visibility.is_field_available(field)
            {
                continue;
            }

            let mut flags = FieldAttributes::PUBLIC;
            if field.is_static() {
                flags |= FieldAttributes::STATIC;
            }
            facade.add_field(FieldDef::new(
                field.name.clone(),
                flags,
                field.field_type.with_scope(self.scope()),
            ));
            facade
                .map
                .fields
                .push(field.name.clone(), field.reference(declaring.clone()).with_scope(self.scope()))?;
        }

        for property in &def.properties {
            if (flavor == Flavor::Static && property.has_this)
                || !self.visibility.is_property_available(property)
            {
                continue;
            }

            self.mirror_property(&mut facade, def, original, &declaring, property)?;
        }

        for method in &def.methods {
            if method.has_generic_params() {
                if !method.is_public() {
                    log::warn!(
                        "Skipping method {} because generic methods are not supported",
                        method.full_name(original)
                    );
                }
                continue;
            }

            if (flavor == Flavor::Static && !method.is_static())
                || method.is_special_name()
                || is_compiler_generated(&method.custom_attributes)
                || !self.visibility.is_method_available(method)
            {
                continue;
            }

            let mut mirrored = MethodDef::new(
                method.name.clone(),
                method.flags.with_access(MethodAttributes::PUBLIC),
                method.return_type.with_scope(self.scope()),
            );
            mirrored.params = method
                .params
                .iter()
                .map(|param| ParamDef {
                    name: param.name.clone(),
                    flags: param.flags,
                    param_type: param.param_type.with_scope(self.scope()),
                    custom_attributes: param
                        .custom_attributes
                        .iter()
                        .map(|attribute| attribute.with_scope(self.scope()))
                        .collect(),
                })
                .collect();

            let key = facade.add_method(mirrored);
            facade
                .map
                .methods
                .push(key, method.reference(declaring.clone()).with_scope(self.scope()))?;
        }

        for nested in &def.nested_types {
            let nested_original = TypeRef::nested(original.clone(), nested.name.clone());
            if let Some(generated) = self.generate(nested, &nested_original, Some(&facade.type_ref))? {
                facade.add_nested(generated);
            }
        }

        if !facade.emitted {
            return Ok(None);
        }

        log::debug!("Generated {} for {}", facade.full_name(), original);
        match flavor {
            Flavor::Instance => {
                self.output.instance_count += 1;
                self.output.reflect_methods.push(reflect_method(&facade.type_ref, &declaring));

                if let Some(base) = &def.base_type {
                    let base = base.full_name();
                    if base != SYSTEM_OBJECT {
                        self.output.inheritance.push(InheritanceEdge {
                            derived: facade.full_name(),
                            base: format!("{}.{}", self.config.base_namespace, base),
                        });
                    }
                }
            }
            Flavor::Static => self.output.static_count += 1,
        }

        self.output.maps.push((facade.full_name(), facade.map));
        Ok(Some(facade.def))
    }

    fn mirror_property(
        &self,
        facade: &mut FacadeType,
        def: &TypeDef,
        original: &TypeRef,
        declaring: &TypeSig,
        property: &PropertyDef,
    ) -> Result<()> {
        let property_type = property.property_type.with_scope(self.scope());
        let mut mirrored = PropertyDef::new(
            property.name.clone(),
            property.flags & PropertyAttributes::HAS_DEFAULT,
            property.has_this,
            property_type.clone(),
        );

        if let Some(getter) = &property.getter {
            let accessor = find_accessor(def, original, getter)?;
            let get = MethodDef::new(
                getter.clone(),
                accessor.flags.with_access(MethodAttributes::PUBLIC) | MethodAttributes::SPECIAL_NAME,
                property_type.clone(),
            );
            let key = facade.add_method(get);
            facade
                .map
                .methods
                .push(key, accessor.reference(declaring.clone()).with_scope(self.scope()))?;
            mirrored.getter = Some(getter.clone());
        }

        if let Some(setter) = &property.setter {
            let accessor = find_accessor(def, original, setter)?;
            let set = MethodDef::new(
                setter.clone(),
                accessor.flags.with_access(MethodAttributes::PUBLIC) | MethodAttributes::SPECIAL_NAME,
                TypeSig::Void,
            )
            .with_param("", property_type.clone());
            let key = facade.add_method(set);
            facade
                .map
                .methods
                .push(key, accessor.reference(declaring.clone()).with_scope(self.scope()))?;
            mirrored.setter = Some(setter.clone());
        }

        facade.add_property(mirrored);
        Ok(())
    }

    fn facade_ref(
        &self,
        def: &TypeDef,
        original: &TypeRef,
        parent: Option<&TypeRef>,
        flavor: Flavor,
    ) -> TypeRef {
        let base = &self.config.base_namespace;
        let name = match flavor {
            Flavor::Instance => def.name.clone(),
            Flavor::Static => format!("{}{}", def.name, STATIC_SUFFIX),
        };

        if let Some(parent) = parent {
            return TypeRef::nested(parent.clone(), name);
        }

        let namespace = match (flavor, original.namespace.is_empty()) {
            (Flavor::Instance, true) => base.clone(),
            (Flavor::Instance, false) => format!("{base}.{}", original.namespace),
            (Flavor::Static, true) => format!("{base}.{STATIC_PARTITION}"),
            (Flavor::Static, false) => format!("{base}.{STATIC_PARTITION}.{}", original.namespace),
        };
        TypeRef::new("", namespace, name)
    }

    /// Returns `true` if the root of the base type chain of `def` is `System.Attribute`.
    ///
    /// The chain is followed until it reaches a type deriving from `System.Object` directly or
    /// a base that can not be resolved.
    fn derives_from_attribute(&self, def: &TypeDef) -> bool {
        let Some(mut current) = def.base_type.as_ref().and_then(TypeSig::element_ref).cloned() else {
            return false;
        };

        for _ in 0..MAX_BASE_DEPTH {
            let next = self.resolver.with_type(self.target, &current, |resolved| {
                Ok(resolved.base_type.as_ref().and_then(TypeSig::element_ref).cloned())
            });

            match next {
                Ok(Some(Some(base))) if base.full_name() != SYSTEM_OBJECT => {
                    // An empty scope is relative to the module that declared `current`
                    current = base.with_scope(&current.scope);
                }
                _ => break,
            }
        }

        current.full_name() == SYSTEM_ATTRIBUTE
    }
}

/// Original flags with the visibility replaced by `Public` or `NestedPublic`.
fn facade_flags(flags: TypeAttributes, nested: bool) -> TypeAttributes {
    flags.with_visibility(if nested {
        TypeAttributes::NESTED_PUBLIC
    } else {
        TypeAttributes::PUBLIC
    })
}

fn find_accessor<'d>(def: &'d TypeDef, original: &TypeRef, name: &str) -> Result<&'d MethodDef> {
    def.method(name)
        .ok_or_else(|| malformed_error!("Accessor {} of {} does not exist", name, original))
}

/// `public static Facade Reflect(this Original self)`
fn reflect_method(facade: &TypeRef, original: &TypeSig) -> MethodDef {
    let mut method = MethodDef::new(
        "Reflect",
        MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        TypeSig::Class(facade.clone()),
    )
    .with_param("self", original.clone());
    method.custom_attributes.push(extension_attribute());
    method
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{compiler_generated, TargetBuilder};

    fn config() -> SynthesizerConfig {
        SynthesizerConfig::new("Base")
    }

    fn run(target: &CilModule, full_name: &str) -> (Option<TypeDef>, Output) {
        let config = config();
        let resolver = AssemblyResolver::new();
        let mut generator = Generator::new(&config, target, &resolver);

        let def = target.find_type(full_name).unwrap();
        let (namespace, name) = full_name.rsplit_once('.').unwrap_or(("", full_name));
        let original = TypeRef::new("", namespace, name);
        let generated = generator.generate(def, &original, None).unwrap();
        (generated, generator.finish())
    }

    #[test]
    fn instance_facade_mirrors_available_members() {
        let target = TargetBuilder::scenario();
        let (generated, generator) = run(&target, "Game.T");
        let facade = generated.unwrap();

        assert_eq!(facade.namespace, "Base.Game");
        assert_eq!(facade.name, "T");
        assert!(facade.flags.is_public());
        let names: Vec<_> = facade.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x"]);
        assert_eq!(facade.fields[0].flags, FieldAttributes::PUBLIC);

        let (name, map) = &generator.maps[0];
        assert_eq!(name, "Base.Game.T");
        let original = map.field("x").unwrap();
        assert_eq!(original.full_name(), "System.Int32 Game.T::x");
        assert_eq!(original.declaring_type.element_ref().unwrap().scope, "Assembly-CSharp");

        assert_eq!(generator.reflect_methods.len(), 1);
        assert_eq!(
            generator.reflect_methods[0].full_name(&TypeRef::new("", "Base", "Reflector")),
            "Base.Game.T Base.Reflector::Reflect(Game.T)"
        );
        assert_eq!(generator.instance_count, 1);
    }

    #[test]
    fn empty_types_are_not_generated() {
        let target = TargetBuilder::new()
            .class("Game", "Empty", TypeAttributes::PUBLIC)
            .build();
        let (generated, generator) = run(&target, "Game.Empty");
        assert!(generated.is_none());
        assert!(generator.maps.is_empty());
        assert!(generator.reflect_methods.is_empty());
    }

    #[test]
    fn skipped_shapes() {
        let mut target = TargetBuilder::scenario();
        let mut generic = target.find_type("Game.T").unwrap().clone();
        generic.name = "G`1".into();
        generic.generic_params.push(crate::metadata::members::GenericParam {
            name: "T".into(),
            constraints: Vec::new(),
        });
        target.types.push(generic);

        let mut interface = target.find_type("Game.T").unwrap().clone();
        interface.name = "I".into();
        interface.flags |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        target.types.push(interface);

        let mut internal = target.find_type("Game.T").unwrap().clone();
        internal.name = "Internal".into();
        internal.flags = TypeAttributes::empty();
        target.types.push(internal);

        for name in ["Game.G`1", "Game.I", "Game.Internal"] {
            assert!(run(&target, name).0.is_none(), "{name}");
        }
    }

    #[test]
    fn attributes_are_skipped() {
        let target = TargetBuilder::new()
            .class_with("Game", "MyAttribute", TypeAttributes::PUBLIC, |t| {
                t.with_base(TypeSig::Class(TypeRef::new(CORLIB, "System", "Attribute")))
                    .with_field(FieldDef::new("x", FieldAttributes::PRIVATE, TypeSig::I4))
            })
            .class_with("Game", "Derived", TypeAttributes::PUBLIC, |t| {
                t.with_base(TypeSig::Class(TypeRef::new("", "Game", "MyAttribute")))
                    .with_field(FieldDef::new("y", FieldAttributes::PRIVATE, TypeSig::I4))
            })
            .build();

        assert!(run(&target, "Game.MyAttribute").0.is_none());
        assert!(run(&target, "Game.Derived").0.is_none());
    }

    #[test]
    fn properties_get_public_accessors() {
        let target = TargetBuilder::scenario();
        let (generated, generator) = run(&target, "HeroController");
        let facade = generated.unwrap();

        let property = facade.properties.iter().find(|p| p.name == "Speed").unwrap();
        assert_eq!(property.getter.as_deref(), Some("get_Speed"));
        assert_eq!(property.setter.as_deref(), Some("set_Speed"));
        assert!(property.flags.contains(PropertyAttributes::HAS_DEFAULT));

        let getter = facade.method("get_Speed").unwrap();
        assert!(getter.is_public() && getter.is_special_name());
        assert_eq!(getter.return_type, TypeSig::R4);
        let setter = facade.method("set_Speed").unwrap();
        assert_eq!(setter.return_type, TypeSig::Void);
        assert_eq!(setter.params[0].param_type, TypeSig::R4);

        let map = &generator.maps.last().unwrap().1;
        let original = map.method("System.Void Base.HeroController::set_Speed(System.Single)").unwrap();
        assert_eq!(original.full_name(), "System.Void HeroController::set_Speed(System.Single)");
        assert!(map.method("System.Single Base.HeroController::get_Speed()").is_some());
    }

    #[test]
    fn methods_are_mirrored_with_parameters() {
        let target = TargetBuilder::scenario();
        let (generated, generator) = run(&target, "HeroController");
        let facade = generated.unwrap();

        let attack = facade.method("Attack").unwrap();
        assert!(attack.is_public());
        assert_eq!(attack.params[0].name, "damage");
        assert!(facade.method("Generic").is_none());
        assert!(facade.method("<Attack>b__0").is_none());
        assert!(facade.method(".ctor").is_none());

        let map = &generator.maps.last().unwrap().1;
        let original = map.method("System.Void Base.HeroController::Attack(System.Int32)").unwrap();
        assert_eq!(original.name, "Attack");
        assert!(original.has_this);
    }

    #[test]
    fn static_facades_keep_static_members() {
        let target = TargetBuilder::scenario();
        let (generated, generator) = run(&target, "Game.Util");
        let facade = generated.unwrap();

        assert_eq!(facade.namespace, "Base.Static.Game");
        assert_eq!(facade.name, "UtilR");
        assert!(facade.fields.iter().all(FieldDef::is_static));
        assert!(facade.methods.iter().all(MethodDef::is_static));
        assert!(generator.reflect_methods.is_empty());
        assert!(generator.inheritance.is_empty());
        assert_eq!(generator.static_count, 1);

        let map = &generator.maps[0].1;
        assert_eq!(map.field("counter").unwrap().full_name(), "System.Int32 Game.Util::counter");
        assert!(map
            .method("System.Int32 Base.Static.Game.UtilR::Compute(System.Int32)")
            .is_some());
    }

    #[test]
    fn nested_types_and_inheritance_edges() {
        let target = TargetBuilder::scenario();
        let (generated, generator) = run(&target, "Game.Outer");
        let facade = generated.unwrap();

        let inner = facade.nested("Inner").unwrap();
        assert!(inner.is_nested_public());
        assert!(inner.namespace.is_empty());

        let names: Vec<_> = generator.maps.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Base.Game.Outer/Inner", "Base.Game.Outer"]);

        let edge = &generator.inheritance[0];
        assert_eq!(edge.derived, "Base.Game.Outer");
        assert_eq!(edge.base, "Base.Game.T");
    }

    #[test]
    fn compiler_generated_members_are_excluded() {
        let target = TargetBuilder::new()
            .class_with("Game", "C", TypeAttributes::PUBLIC, |t| {
                let mut field = FieldDef::new("<X>k__BackingField", FieldAttributes::PRIVATE, TypeSig::I4);
                field.custom_attributes.push(compiler_generated());
                t.with_field(field)
            })
            .build();
        assert!(run(&target, "Game.C").0.is_none());
    }
}
