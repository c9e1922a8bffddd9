//! Facade synthesis.
//!
//! The [`FacadeSynthesizer`] derives a facade module from a target program. For every eligible
//! target type it emits a mirrored type in which the inaccessible fields, properties and methods
//! are public, and stores a [`symbolmap::SymbolMap`] linking each mirrored member back to the
//! real one. Two helper types complete the facade:
//!
//! - `<base>.Reflector` - `Reflect(this T)` conversions from target types to their facades
//! - `<base>.Singletons` - `<Name>R` properties for the types of the singleton registry
//!
//! # Naming
//!
//! | Target type | Facade type |
//! |-------------|-------------|
//! | `Game.Hero` | `<base>.Game.Hero` |
//! | `PlayerData` | `<base>.PlayerData` |
//! | `static class Game.Util` | `<base>.Static.Game.UtilR` |
//! | `Game.Hero/State` | `<base>.Game.Hero/State` |
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfacade::facade::{FacadeSynthesizer, SynthesizerConfig};
//! use cilfacade::metadata::CilModule;
//! use std::path::Path;
//!
//! let target = CilModule::from_file(Path::new("Managed/Assembly-CSharp.cmi"))?;
//! let config = SynthesizerConfig::new("HKReflect").with_search_directory("Managed");
//! let facade = FacadeSynthesizer::new(config).synthesize(&target)?;
//! facade.to_file(Path::new("HKReflect.cmi"))?;
//! # Ok::<(), cilfacade::Error>(())
//! ```

mod generator;
pub mod singletons;
pub mod symbolmap;
pub mod visibility;

use std::path::PathBuf;

use crate::{
    metadata::{
        members::{MethodDef, PropertyDef, TypeDef},
        typesystem::{MethodAttributes, PropertyAttributes, TypeAttributes, TypeRef, TypeSig},
        AssemblyRef, AssemblyResolver, CilModule,
    },
    Result,
};

pub use generator::{STATIC_PARTITION, STATIC_SUFFIX};

use generator::{extension_attribute, Generator};

/// Name of the type holding the `Reflect` conversions
pub const REFLECTOR: &str = "Reflector";
/// Name of the type holding the singleton accessors
pub const SINGLETONS: &str = "Singletons";

/// Target namespaces that never get facades
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &[
    "System",
    "UnityEngine",
    "UnityStandardAssets",
    "Modding",
    "MonoMod",
];

/// Settings of a synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Root namespace of the facade; also the facade assembly name
    pub base_namespace: String,
    /// Target namespaces (and their children) to skip
    pub excluded_namespaces: Vec<String>,
    /// Full names of target types that get a `Singletons` accessor
    pub singletons: Vec<String>,
    /// Directories searched for modules referenced by the target
    pub search_directories: Vec<PathBuf>,
}

impl SynthesizerConfig {
    /// Default settings for the facade root `base_namespace`.
    pub fn new(base_namespace: impl Into<String>) -> Self {
        SynthesizerConfig {
            base_namespace: base_namespace.into(),
            excluded_namespaces: DEFAULT_EXCLUDED_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
            singletons: singletons::SINGLETONS
                .iter()
                .map(|singleton| singleton.type_name.to_string())
                .collect(),
            search_directories: Vec::new(),
        }
    }

    /// Add a directory to search for referenced modules.
    #[must_use]
    pub fn with_search_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.search_directories.push(directory.into());
        self
    }

    fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded_namespaces.iter().any(|excluded| {
            namespace == excluded
                || namespace
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// Generates facade modules.
pub struct FacadeSynthesizer {
    config: SynthesizerConfig,
    resolver: AssemblyResolver,
}

impl FacadeSynthesizer {
    /// Create a synthesizer; the configured search directories are registered right away.
    #[must_use]
    pub fn new(config: SynthesizerConfig) -> Self {
        let resolver = AssemblyResolver::new();
        for directory in &config.search_directories {
            resolver.add_search_directory(directory);
        }
        FacadeSynthesizer { config, resolver }
    }

    /// The settings of this synthesizer.
    #[must_use]
    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    /// The resolver used for types of modules referenced by the target.
    #[must_use]
    pub fn resolver(&self) -> &AssemblyResolver {
        &self.resolver
    }

    /// Build the facade module for `target`.
    ///
    /// The result is a pure function of `target`, the configuration and the resolvable
    /// modules, so its image is deterministic.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the target is inconsistent (properties naming
    /// missing accessors, duplicate member names).
    pub fn synthesize(&self, target: &CilModule) -> Result<CilModule> {
        let base = self.config.base_namespace.as_str();
        let mut facade = CilModule::new(base, target.version);
        facade.add_assembly_ref(AssemblyRef::new(target.name.clone(), target.version));
        for assembly_ref in &target.assembly_refs {
            facade.add_assembly_ref(assembly_ref.clone());
        }

        let helper_flags = TypeAttributes::PUBLIC
            | TypeAttributes::ABSTRACT
            | TypeAttributes::SEALED
            | TypeAttributes::BEFORE_FIELD_INIT;
        let mut reflector = TypeDef::new(base, REFLECTOR, helper_flags);
        reflector.custom_attributes.push(extension_attribute());
        let mut singletons = TypeDef::new(base, SINGLETONS, helper_flags);

        let mut generator = Generator::new(&self.config, target, &self.resolver);
        let mut generated = Vec::new();
        for def in &target.types {
            if self.config.is_excluded(&def.namespace) {
                continue;
            }

            let original = TypeRef::new("", def.namespace.clone(), def.name.clone());
            let Some(mapped) = generator.generate(def, &original, None)? else {
                continue;
            };

            if self.config.singletons.contains(&original.full_name()) {
                add_singleton_accessor(&mut singletons, &mapped);
            }
            generated.push(mapped);
        }

        let output = generator.finish();
        reflector.methods = output.reflect_methods;
        facade.types.push(reflector);
        facade.types.push(singletons);
        facade.types.extend(generated);

        let mut wired = 0;
        for edge in &output.inheritance {
            let Some(base_ref) = facade.find_type(&edge.base).map(|_| type_ref_of(&edge.base)) else {
                continue;
            };
            if let Some(derived) = facade.find_type_mut(&edge.derived) {
                derived.base_type = Some(TypeSig::Class(base_ref));
                wired += 1;
            }
        }

        for (name, map) in &output.maps {
            map.attach(name, &mut facade)?;
        }

        log::info!(
            "Generated {} instance and {} static facade types for {} ({} base types wired)",
            output.instance_count,
            output.static_count,
            target.name,
            wired
        );
        Ok(facade)
    }
}

/// `public static Facade <Name>R { get; }` on the `Singletons` type.
fn add_singleton_accessor(singletons: &mut TypeDef, mapped: &TypeDef) {
    let name = singletons::property_name(&mapped.name);
    let facade = TypeSig::Class(TypeRef::new("", mapped.namespace.clone(), mapped.name.clone()));
    let getter = format!("get_{name}");

    singletons.methods.push(MethodDef::new(
        getter.clone(),
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::SPECIAL_NAME,
        facade.clone(),
    ));

    let mut property = PropertyDef::new(name, PropertyAttributes::empty(), false, facade);
    property.getter = Some(getter);
    singletons.properties.push(property);
}

/// Reference to the type of the facade module called `full_name` (`Ns.Outer/Inner`).
fn type_ref_of(full_name: &str) -> TypeRef {
    let mut segments = full_name.split('/');
    let outer = segments.next().unwrap_or_default();
    let (namespace, name) = outer.rsplit_once('.').unwrap_or(("", outer));
    segments.fold(TypeRef::new("", namespace, name), TypeRef::nested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{facade::symbolmap::SymbolMap, test::TargetBuilder};

    fn synthesize() -> CilModule {
        FacadeSynthesizer::new(SynthesizerConfig::new("Base"))
            .synthesize(&TargetBuilder::scenario())
            .unwrap()
    }

    #[test]
    fn excluded_namespaces() {
        let config = SynthesizerConfig::new("Base");
        assert!(config.is_excluded("System"));
        assert!(config.is_excluded("UnityEngine.UI"));
        assert!(!config.is_excluded("Systems"));
        assert!(!config.is_excluded(""));
    }

    #[test]
    fn helper_types_and_references() {
        let facade = synthesize();
        assert_eq!(facade.name, "Base");
        assert_eq!(facade.version, TargetBuilder::scenario().version);
        assert!(facade.references_assembly("Assembly-CSharp"));
        assert!(facade.references_assembly("UnityEngine"));

        let reflector = facade.find_type("Base.Reflector").unwrap();
        assert!(reflector.is_static_class());
        assert_eq!(reflector.custom_attributes.len(), 1);
        assert!(reflector.methods.iter().all(|m| m.name == "Reflect" && m.is_static()));
        assert!(facade.find_type("Base.Singletons").is_some());
        assert!(facade.find_type("Base.System.Hidden").is_none());
    }

    #[test]
    fn singleton_accessors() {
        let facade = synthesize();
        let singletons = facade.find_type("Base.Singletons").unwrap();

        let getter = singletons.method("get_PlayerDataR").unwrap();
        assert!(getter.is_static() && getter.is_special_name());
        assert_eq!(getter.return_type.full_name(), "Base.PlayerData");
        assert_eq!(singletons.properties[0].name, "HeroControllerR");
        assert!(singletons.method("get_TR").is_none());
    }

    #[test]
    fn inheritance_is_wired_to_generated_facades() {
        let facade = synthesize();
        let outer = facade.find_type("Base.Game.Outer").unwrap();
        assert_eq!(outer.base_type.as_ref().map(TypeSig::full_name).as_deref(), Some("Base.Game.T"));

        // The base of Game.T is UnityEngine.MonoBehaviour which has no facade
        assert!(facade.find_type("Base.Game.T").unwrap().base_type.is_none());
    }

    #[test]
    fn every_facade_type_has_a_symbol_map() {
        let facade = synthesize();
        let mut names = Vec::new();
        facade.walk_types(|type_ref, _| names.push(type_ref.full_name()));

        for name in names.iter().filter(|n| *n != "Base.Reflector" && *n != "Base.Singletons") {
            assert!(SymbolMap::load(&facade, name).unwrap().is_some(), "{name}");
        }
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(synthesize().to_bytes().unwrap(), synthesize().to_bytes().unwrap());
    }

    #[test]
    fn full_name_to_reference() {
        assert_eq!(type_ref_of("Base.Game.Outer/Inner").full_name(), "Base.Game.Outer/Inner");
        assert_eq!(type_ref_of("Global").full_name(), "Global");
    }
}
