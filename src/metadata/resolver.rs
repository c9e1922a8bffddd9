//! Cross-module type resolution.
//!
//! The visibility rules need to look behind type references: a field of type
//! `UnityEngine.Transform` is only mirrored if `Transform` itself is public, which is only known
//! to the module that defines it. [`AssemblyResolver`] maps assembly names to loaded modules,
//! loading them on demand from registered search directories.
//!
//! Lookups are thread-safe; loaded modules (and failed lookups) are cached, so every module is
//! read from disk at most once per resolver.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use dashmap::DashMap;

use crate::{
    metadata::{members::TypeDef, module::CilModule, typesystem::TypeRef},
    Result,
};

/// File extension of module images looked up in search directories
pub const IMAGE_EXTENSION: &str = "cmi";

/// Resolves assembly names to modules.
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::metadata::{AssemblyResolver, typesystem::TypeRef};
///
/// let resolver = AssemblyResolver::new();
/// resolver.add_search_directory("Managed");
///
/// if let Some(module) = resolver.resolve("UnityEngine") {
///     let transform = TypeRef::new("UnityEngine", "UnityEngine", "Transform");
///     println!("public: {:?}", module.find_type_by_ref(&transform).map(|t| t.is_public()));
/// }
/// # Ok::<(), cilfacade::Error>(())
/// ```
#[derive(Default)]
pub struct AssemblyResolver {
    modules: DashMap<String, Option<Arc<CilModule>>>,
    search_directories: RwLock<Vec<PathBuf>>,
}

impl AssemblyResolver {
    /// Create a resolver without modules or search directories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `module` resolvable by its assembly name, replacing a previous entry.
    pub fn register(&self, module: Arc<CilModule>) {
        self.modules.insert(module.name.clone(), Some(module));
    }

    /// Search `directory` for `<name>.cmi` when resolving unknown assemblies.
    pub fn add_search_directory(&self, directory: impl AsRef<Path>) {
        if let Ok(mut directories) = self.search_directories.write() {
            directories.push(directory.as_ref().to_path_buf());
        }
    }

    /// The module for the assembly called `name`, loading it if needed.
    ///
    /// Assemblies that can not be found (or fail to load) resolve to `None`, and keep doing so
    /// for the lifetime of the resolver.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<CilModule>> {
        if let Some(entry) = self.modules.get(name) {
            return entry.clone();
        }

        // Loading happens outside of the map lock, a concurrent load of the same module is
        // harmless and the first insert wins.
        let loaded = self.load(name).map(Arc::new);
        self.modules
            .entry(name.to_string())
            .or_insert(loaded)
            .clone()
    }

    fn load(&self, name: &str) -> Option<CilModule> {
        let directories = self.search_directories.read().ok()?.clone();
        for directory in directories {
            let path = directory.join(format!("{name}.{IMAGE_EXTENSION}"));
            if !path.is_file() {
                continue;
            }

            match CilModule::from_file(&path) {
                Ok(module) => {
                    log::debug!("Loaded {} from {}", name, path.display());
                    return Some(module);
                }
                Err(error) => {
                    log::warn!("Failed to load {}: {}", path.display(), error);
                }
            }
        }

        log::debug!("Assembly {name} could not be resolved");
        None
    }

    /// Run `f` on the definition behind `type_ref`.
    ///
    /// References with an empty scope, or with the name of `context` as scope, are looked up
    /// in `context` itself; every other scope is resolved through this resolver.
    ///
    /// # Errors
    /// Propagates the error returned by `f`.
    pub fn with_type<R>(
        &self,
        context: &CilModule,
        type_ref: &TypeRef,
        f: impl FnOnce(&TypeDef) -> Result<R>,
    ) -> Result<Option<R>> {
        if type_ref.scope.is_empty() || type_ref.scope == context.name {
            return context.find_type_by_ref(type_ref).map(f).transpose();
        }

        match self.resolve(&type_ref.scope) {
            Some(module) => module.find_type_by_ref(type_ref).map(f).transpose(),
            None => Ok(None),
        }
    }

    /// Number of cached entries, failed lookups included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing has been registered or resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{module::Version, typesystem::TypeAttributes};

    fn engine() -> CilModule {
        let mut module = CilModule::new("UnityEngine", Version::new(0, 0, 0, 0));
        module
            .types
            .push(TypeDef::new("UnityEngine", "Transform", TypeAttributes::PUBLIC));
        module
    }

    #[test]
    fn registered_modules_resolve() {
        let resolver = AssemblyResolver::new();
        resolver.register(Arc::new(engine()));

        let context = CilModule::new("Assembly-CSharp", Version::default());
        let transform = TypeRef::new("UnityEngine", "UnityEngine", "Transform");
        let public = resolver
            .with_type(&context, &transform, |def| Ok(def.is_public()))
            .unwrap();
        assert_eq!(public, Some(true));

        let missing = TypeRef::new("UnityEngine", "UnityEngine", "Camera");
        assert_eq!(resolver.with_type(&context, &missing, |_| Ok(())).unwrap(), None);
    }

    #[test]
    fn local_scope_uses_context() {
        let resolver = AssemblyResolver::new();
        let context = engine();

        let local = TypeRef::new("", "UnityEngine", "Transform");
        let named = TypeRef::new("UnityEngine", "UnityEngine", "Transform");
        assert!(resolver.with_type(&context, &local, |_| Ok(())).unwrap().is_some());
        assert!(resolver.with_type(&context, &named, |_| Ok(())).unwrap().is_some());
        assert!(resolver.is_empty());
    }

    #[test]
    fn unknown_assemblies_are_cached_as_missing() {
        let resolver = AssemblyResolver::new();
        assert!(resolver.resolve("Nowhere").is_none());
        assert_eq!(resolver.len(), 1);
        assert!(resolver.resolve("Nowhere").is_none());
    }

    #[test]
    fn search_directories_are_searched() {
        let dir = tempfile::tempdir().unwrap();
        engine()
            .to_file(&dir.path().join("UnityEngine.cmi"))
            .unwrap();

        let resolver = AssemblyResolver::new();
        resolver.add_search_directory(dir.path());
        let module = resolver.resolve("UnityEngine").unwrap();
        assert_eq!(module.types.len(), 1);
        assert!(Arc::ptr_eq(&module, &resolver.resolve("UnityEngine").unwrap()));
    }
}
