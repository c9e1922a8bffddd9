//! Shared fixtures for unit tests.
//!
//! [`TargetBuilder`] assembles small target programs, [`TargetBuilder::scenario`] is the game
//! module most tests run against. [`PluginBuilder`] assembles modules written against the
//! facade of that scenario.

use std::sync::Arc;

use crate::{
    assembly::MethodBody,
    facade::{FacadeSynthesizer, SynthesizerConfig},
    metadata::{
        members::{
            CustomAttribute, FieldDef, GenericParam, MethodDef, PropertyDef, TypeDef,
            COMPILER_GENERATED_ATTRIBUTE,
        },
        typesystem::{
            FieldAttributes, MethodAttributes, PropertyAttributes, TypeAttributes, TypeRef,
            TypeSig, CORLIB,
        },
        AssemblyRef, CilModule, Version,
    },
};

/// Assembly name of every fixture target
pub const TARGET: &str = "Assembly-CSharp";
/// Facade root namespace and assembly name used with the scenario
pub const FACADE: &str = "HKReflect";

// Helper function to create a CompilerGeneratedAttribute
pub fn compiler_generated() -> CustomAttribute {
    let (namespace, name) = COMPILER_GENERATED_ATTRIBUTE
        .rsplit_once('.')
        .unwrap_or(("", COMPILER_GENERATED_ATTRIBUTE));
    CustomAttribute::parameterless(TypeRef::new(CORLIB, namespace, name))
}

// Helper function to reference a type of the fixture target
pub fn target_type(namespace: &str, name: &str) -> TypeSig {
    TypeSig::Class(TypeRef::new(TARGET, namespace, name))
}

// Helper function to reference a type of the scenario facade
pub fn facade_type(namespace: &str, name: &str) -> TypeSig {
    TypeSig::Class(TypeRef::new(FACADE, namespace, name))
}

// Helper function to synthesize the facade of `target` under the `HKReflect` root, with
// `UnityEngine` resolvable
pub fn synthesize(target: &CilModule) -> CilModule {
    let synthesizer = FacadeSynthesizer::new(SynthesizerConfig::new(FACADE));
    synthesizer.resolver().register(Arc::new(unity_engine()));
    synthesizer.synthesize(target).unwrap()
}

/// The `UnityEngine` module the scenario references: `MonoBehaviour` and the value type
/// `Vector3`.
pub fn unity_engine() -> CilModule {
    let mut module = CilModule::new("UnityEngine", Version::new(0, 0, 0, 0));
    module.add_assembly_ref(AssemblyRef::new(CORLIB, Version::new(4, 0, 0, 0)));
    module.types.push(
        TypeDef::new("UnityEngine", "MonoBehaviour", TypeAttributes::PUBLIC)
            .with_base(TypeSig::Class(TypeRef::new(CORLIB, "System", "Object"))),
    );
    module.types.push(
        TypeDef::new(
            "UnityEngine",
            "Vector3",
            TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
        )
        .with_base(TypeSig::Class(TypeRef::new(CORLIB, "System", "ValueType")))
        .with_field(FieldDef::new("x", FieldAttributes::PUBLIC, TypeSig::R4))
        .with_field(FieldDef::new("y", FieldAttributes::PUBLIC, TypeSig::R4))
        .with_field(FieldDef::new("z", FieldAttributes::PUBLIC, TypeSig::R4)),
    );
    module
}

fn method(name: &str, flags: MethodAttributes, return_type: TypeSig) -> MethodDef {
    MethodDef::new(name, flags | MethodAttributes::HIDE_BY_SIG, return_type)
}

fn getter(name: &str, flags: MethodAttributes, property_type: TypeSig) -> MethodDef {
    method(name, flags | MethodAttributes::SPECIAL_NAME, property_type)
}

fn generic_method(name: &str, return_type: TypeSig) -> MethodDef {
    let mut method = method(name, MethodAttributes::PUBLIC, return_type);
    method.generic_params.push(GenericParam {
        name: "T".into(),
        constraints: Vec::new(),
    });
    method
}

/// Builder for target modules.
pub struct TargetBuilder {
    module: CilModule,
}

impl Default for TargetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetBuilder {
    /// An empty `Assembly-CSharp` referencing the core library.
    pub fn new() -> Self {
        let mut module = CilModule::new(TARGET, Version::new(1, 0, 0, 0));
        module.add_assembly_ref(AssemblyRef::new(CORLIB, Version::new(4, 0, 0, 0)));
        TargetBuilder { module }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.module.version = version;
        self
    }

    pub fn with_assembly_ref(mut self, name: &str, version: Version) -> Self {
        self.module.add_assembly_ref(AssemblyRef::new(name, version));
        self
    }

    /// Add a type without members.
    pub fn class(self, namespace: &str, name: &str, flags: TypeAttributes) -> Self {
        self.class_with(namespace, name, flags, |def| def)
    }

    /// Add a type shaped by `shape`.
    pub fn class_with(
        mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        shape: impl FnOnce(TypeDef) -> TypeDef,
    ) -> Self {
        let base = TypeSig::Class(TypeRef::new(CORLIB, "System", "Object"));
        self.module
            .types
            .push(shape(TypeDef::new(namespace, name, flags).with_base(base)));
        self
    }

    pub fn build(self) -> CilModule {
        self.module
    }

    /// The game module:
    ///
    /// - `Game.T` with a public `x`, a readonly `y` and a MonoBehaviour base
    /// - `HeroController` with a property, private, generic and compiler-generated methods
    /// - `PlayerData`, the gated type, with its accessor overloads
    /// - `InputHandler` exposing its instance through a static field
    /// - the static class `Game.Util`
    /// - `Game.Outer` deriving from `Game.T` with a public nested `Inner`
    /// - `System.Hidden` in an excluded namespace
    pub fn scenario() -> CilModule {
        let hero = TypeSig::Class(TypeRef::new("", "", "HeroController"));
        let player_data = TypeSig::Class(TypeRef::new("", "", "PlayerData"));
        let input_handler = TypeSig::Class(TypeRef::new("", "", "InputHandler"));
        let vector3 = TypeSig::ValueType(TypeRef::new("UnityEngine", "UnityEngine", "Vector3"));

        TargetBuilder::new()
            .with_version(Version::new(1, 5, 78, 11833))
            .with_assembly_ref("UnityEngine", Version::new(0, 0, 0, 0))
            .class_with("Game", "T", TypeAttributes::PUBLIC, |t| {
                t.with_base(TypeSig::Class(TypeRef::new(
                    "UnityEngine",
                    "UnityEngine",
                    "MonoBehaviour",
                )))
                .with_field(FieldDef::new("x", FieldAttributes::PUBLIC, TypeSig::I4))
                .with_field(FieldDef::new(
                    "y",
                    FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
                    TypeSig::I4,
                ))
            })
            .class_with("", "HeroController", TypeAttributes::PUBLIC, |t| {
                let mut speed = PropertyDef::new("Speed", PropertyAttributes::HAS_DEFAULT, true, TypeSig::R4);
                speed.getter = Some("get_Speed".into());
                speed.setter = Some("set_Speed".into());
                let mut instance = PropertyDef::new("instance", PropertyAttributes::empty(), false, hero.clone());
                instance.getter = Some("get_instance".into());

                let mut closure = method("<Attack>b__0", MethodAttributes::PRIVATE, TypeSig::Void);
                closure.custom_attributes.push(compiler_generated());
                let mut generic = generic_method("Generic", TypeSig::MVar("T".into()))
                    .with_param("value", TypeSig::MVar("T".into()));
                generic.flags = MethodAttributes::PRIVATE | MethodAttributes::HIDE_BY_SIG;

                let mut t = t
                    .with_method(getter("get_Speed", MethodAttributes::PRIVATE, TypeSig::R4))
                    .with_method(
                        method("set_Speed", MethodAttributes::PRIVATE | MethodAttributes::SPECIAL_NAME, TypeSig::Void)
                            .with_param("value", TypeSig::R4),
                    )
                    .with_method(
                        method("Attack", MethodAttributes::PRIVATE, TypeSig::Void).with_param("damage", TypeSig::I4),
                    )
                    .with_method(generic)
                    .with_method(closure)
                    .with_method(method(
                        ".ctor",
                        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
                        TypeSig::Void,
                    ))
                    .with_method(getter("get_instance", MethodAttributes::PUBLIC | MethodAttributes::STATIC, hero.clone()));
                t.properties.push(speed);
                t.properties.push(instance);
                t
            })
            .class_with("", "PlayerData", TypeAttributes::PUBLIC | TypeAttributes::SERIALIZABLE, |t| {
                let mut instance = PropertyDef::new("instance", PropertyAttributes::empty(), false, player_data.clone());
                instance.getter = Some("get_instance".into());

                let mut t = t
                    .with_field(FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::I4))
                    .with_field(FieldDef::new("hasDash", FieldAttributes::PRIVATE, TypeSig::Boolean))
                    .with_field(FieldDef::new("respawnPosition", FieldAttributes::PRIVATE, vector3.clone()))
                    .with_field(FieldDef::new("respawnScene", FieldAttributes::PRIVATE, TypeSig::String))
                    .with_field(FieldDef::new(
                        "saveSlot",
                        FieldAttributes::PRIVATE | FieldAttributes::STATIC,
                        TypeSig::I4,
                    ))
                    .with_method(method("GetBool", MethodAttributes::PUBLIC, TypeSig::Boolean).with_param("boolName", TypeSig::String))
                    .with_method(method("GetInt", MethodAttributes::PUBLIC, TypeSig::I4).with_param("intName", TypeSig::String))
                    .with_method(method("GetFloat", MethodAttributes::PUBLIC, TypeSig::R4).with_param("floatName", TypeSig::String))
                    .with_method(method("GetVector3", MethodAttributes::PUBLIC, vector3.clone()).with_param("vectorName", TypeSig::String))
                    .with_method(generic_method("GetVariable", TypeSig::MVar("T".into())).with_param("fieldName", TypeSig::String))
                    .with_method(
                        method("SetBoolSwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                            .with_param("value", TypeSig::Boolean)
                            .with_param("boolName", TypeSig::String),
                    )
                    .with_method(
                        method("SetIntSwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                            .with_param("value", TypeSig::I4)
                            .with_param("intName", TypeSig::String),
                    )
                    .with_method(
                        method("SetFloatSwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                            .with_param("value", TypeSig::R4)
                            .with_param("floatName", TypeSig::String),
                    )
                    .with_method(
                        method("SetVector3SwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                            .with_param("value", vector3)
                            .with_param("vectorName", TypeSig::String),
                    )
                    .with_method(
                        generic_method("SetVariableSwappedArgs", TypeSig::Void)
                            .with_param("value", TypeSig::MVar("T".into()))
                            .with_param("fieldName", TypeSig::String),
                    )
                    .with_method(getter("get_instance", MethodAttributes::PUBLIC | MethodAttributes::STATIC, player_data.clone()));
                t.properties.push(instance);
                t
            })
            .class_with("", "InputHandler", TypeAttributes::PUBLIC, |t| {
                t.with_field(FieldDef::new(
                    "Instance",
                    FieldAttributes::PUBLIC | FieldAttributes::STATIC,
                    input_handler,
                ))
                .with_field(FieldDef::new("acceptingInput", FieldAttributes::PRIVATE, TypeSig::Boolean))
            })
            .class_with(
                "Game",
                "Util",
                TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED | TypeAttributes::BEFORE_FIELD_INIT,
                |t| {
                    t.with_field(FieldDef::new(
                        "counter",
                        FieldAttributes::PRIVATE | FieldAttributes::STATIC,
                        TypeSig::I4,
                    ))
                    .with_field(FieldDef::new("stray", FieldAttributes::PRIVATE, TypeSig::I4))
                    .with_method(
                        method("Compute", MethodAttributes::PRIVATE | MethodAttributes::STATIC, TypeSig::I4)
                            .with_param("value", TypeSig::I4),
                    )
                    .with_method(method("Reset", MethodAttributes::PRIVATE, TypeSig::Void))
                },
            )
            .class_with("Game", "Outer", TypeAttributes::PUBLIC, |t| {
                let inner = TypeDef::new("", "Inner", TypeAttributes::NESTED_PUBLIC)
                    .with_field(FieldDef::new("depth", FieldAttributes::PRIVATE, TypeSig::I4));
                t.with_base(TypeSig::Class(TypeRef::new("", "Game", "T")))
                    .with_field(FieldDef::new("label", FieldAttributes::PRIVATE, TypeSig::String))
                    .with_nested(inner)
            })
            .class_with("System", "Hidden", TypeAttributes::PUBLIC, |t| {
                t.with_field(FieldDef::new("secret", FieldAttributes::PRIVATE, TypeSig::I4))
            })
            .build()
    }
}

/// Builder for modules written against the scenario facade.
pub struct PluginBuilder {
    module: CilModule,
}

impl Default for PluginBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginBuilder {
    /// `MyMod`, referencing the core library, the target and the facade.
    pub fn new() -> Self {
        let mut module = CilModule::new("MyMod", Version::new(1, 0, 0, 0));
        module.add_assembly_ref(AssemblyRef::new(CORLIB, Version::new(4, 0, 0, 0)));
        module.add_assembly_ref(AssemblyRef::new(TARGET, Version::new(1, 5, 78, 11833)));
        module.add_assembly_ref(AssemblyRef::new(FACADE, Version::new(1, 5, 78, 11833)));
        PluginBuilder { module }
    }

    pub fn without_reference(mut self, name: &str) -> Self {
        self.module.remove_assembly_ref(name);
        self
    }

    /// Add `Mod.<type_name>::<name>()` with `body`, creating the type on first use.
    pub fn method(mut self, type_name: &str, name: &str, body: MethodBody) -> Self {
        let method = MethodDef::new(name, MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG, TypeSig::Void)
            .with_body(body);
        match self.module.find_type_mut(&format!("Mod.{type_name}")) {
            Some(def) => def.methods.push(method),
            None => self
                .module
                .types
                .push(TypeDef::new("Mod", type_name, TypeAttributes::PUBLIC).with_method(method)),
        }
        self
    }

    /// Add a type shaped by `shape`.
    pub fn class_with(
        mut self,
        namespace: &str,
        name: &str,
        shape: impl FnOnce(TypeDef) -> TypeDef,
    ) -> Self {
        self.module
            .types
            .push(shape(TypeDef::new(namespace, name, TypeAttributes::PUBLIC)));
        self
    }

    pub fn build(self) -> CilModule {
        self.module
    }
}
