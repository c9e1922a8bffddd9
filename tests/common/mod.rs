//! Fixtures shared by the integration tests: a small game module and plugins written against
//! its `HKReflect` facade.

#![allow(dead_code)]

use cilfacade::prelude::*;
use cilfacade::metadata::typesystem::CORLIB;

pub const TARGET: &str = "Assembly-CSharp";
pub const FACADE: &str = "HKReflect";

pub fn version() -> Version {
    Version::new(1, 5, 78, 11833)
}

// Helper function to reference a type of the facade
pub fn facade_type(namespace: &str, name: &str) -> TypeSig {
    TypeSig::Class(TypeRef::new(FACADE, namespace, name))
}

// Helper function to reference a type of the game
pub fn game_type(namespace: &str, name: &str) -> TypeSig {
    TypeSig::Class(TypeRef::new(TARGET, namespace, name))
}

fn method(name: &str, flags: MethodAttributes, return_type: TypeSig) -> MethodDef {
    MethodDef::new(name, flags | MethodAttributes::HIDE_BY_SIG, return_type)
}

fn class(namespace: &str, name: &str, flags: TypeAttributes) -> TypeDef {
    TypeDef::new(namespace, name, flags)
        .with_base(TypeSig::Class(TypeRef::new(CORLIB, "System", "Object")))
}

/// The game: `Game.T`, the gated `PlayerData`, the singleton `HeroController` and the static
/// class `Game.Util`.
pub fn game() -> CilModule {
    let mut module = CilModule::new(TARGET, version());
    module.add_assembly_ref(AssemblyRef::new(CORLIB, Version::new(4, 0, 0, 0)));
    module.add_assembly_ref(AssemblyRef::new("UnityEngine", Version::new(0, 0, 0, 0)));

    module.types.push(
        class("Game", "T", TypeAttributes::PUBLIC)
            .with_field(FieldDef::new("x", FieldAttributes::PUBLIC, TypeSig::I4))
            .with_field(FieldDef::new(
                "y",
                FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY,
                TypeSig::I4,
            )),
    );

    let player_data = TypeSig::Class(TypeRef::new("", "", "PlayerData"));
    let mut data = class("", "PlayerData", TypeAttributes::PUBLIC | TypeAttributes::SERIALIZABLE)
        .with_field(FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::I4))
        .with_field(FieldDef::new("hasDash", FieldAttributes::PRIVATE, TypeSig::Boolean))
        .with_method(method("GetInt", MethodAttributes::PUBLIC, TypeSig::I4).with_param("intName", TypeSig::String))
        .with_method(
            method("GetBool", MethodAttributes::PUBLIC, TypeSig::Boolean).with_param("boolName", TypeSig::String),
        )
        .with_method(
            method("SetIntSwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                .with_param("value", TypeSig::I4)
                .with_param("intName", TypeSig::String),
        )
        .with_method(
            method("SetBoolSwappedArgs", MethodAttributes::PUBLIC, TypeSig::Void)
                .with_param("value", TypeSig::Boolean)
                .with_param("boolName", TypeSig::String),
        )
        .with_method(method(
            "get_instance",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
            player_data.clone(),
        ));
    let mut instance = PropertyDef::new("instance", PropertyAttributes::empty(), false, player_data);
    instance.getter = Some("get_instance".into());
    data.properties.push(instance);
    module.types.push(data);

    let hero = TypeSig::Class(TypeRef::new("", "", "HeroController"));
    module.types.push(
        class("", "HeroController", TypeAttributes::PUBLIC)
            .with_method(method("Attack", MethodAttributes::PRIVATE, TypeSig::Void).with_param("damage", TypeSig::I4))
            .with_method(method(
                "get_instance",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
                hero,
            )),
    );

    module.types.push(
        class(
            "Game",
            "Util",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        )
        .with_field(FieldDef::new(
            "counter",
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
            TypeSig::I4,
        ))
        .with_method(
            method("Compute", MethodAttributes::PRIVATE | MethodAttributes::STATIC, TypeSig::I4)
                .with_param("value", TypeSig::I4),
        ),
    );

    module
}

/// The facade of [`game`].
pub fn facade(game: &CilModule) -> Result<CilModule> {
    FacadeSynthesizer::new(SynthesizerConfig::new(FACADE)).synthesize(game)
}

/// `MyMod` with one type `Mod.Plugin` holding `(name, body)` methods.
pub fn plugin(methods: Vec<(&str, MethodBody)>) -> CilModule {
    let mut module = CilModule::new("MyMod", Version::new(1, 0, 0, 0));
    module.add_assembly_ref(AssemblyRef::new(CORLIB, Version::new(4, 0, 0, 0)));
    module.add_assembly_ref(AssemblyRef::new(TARGET, version()));
    module.add_assembly_ref(AssemblyRef::new(FACADE, version()));

    let mut plugin = TypeDef::new("Mod", "Plugin", TypeAttributes::PUBLIC);
    for (name, body) in methods {
        plugin.methods.push(
            MethodDef::new(name, MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG, TypeSig::Void)
                .with_body(body),
        );
    }
    module.types.push(plugin);
    module
}

/// Rendered instructions of `Mod.Plugin::<name>`.
pub fn listing(module: &CilModule, name: &str) -> Vec<String> {
    module
        .find_type("Mod.Plugin")
        .and_then(|def| def.method(name))
        .and_then(|method| method.body.as_ref())
        .map(|body| body.instructions().iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}
