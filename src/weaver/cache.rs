//! Memoized symbol map lookups.
//!
//! Symbol maps are decoded from the facade module the first time a facade type is seen and
//! shared afterwards. Lookup and population happen in one critical section, so every map is
//! decoded at most once per weaver even when methods are rewritten in parallel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    facade::{symbolmap::SymbolMap, STATIC_PARTITION, STATIC_SUFFIX},
    metadata::{
        references::{FieldRef, MethodRef},
        typesystem::TypeRef,
        CilModule,
    },
    Error, Result,
};

/// Resolves facade symbols to target symbols.
pub struct SymbolMapCache<'a> {
    facade: &'a CilModule,
    target: &'a CilModule,
    root: String,
    maps: Mutex<HashMap<String, Arc<SymbolMap>>>,
    #[cfg(test)]
    decodes: AtomicUsize,
}

impl<'a> SymbolMapCache<'a> {
    /// Create an empty cache over the facade module `facade` rooted at namespace `root`.
    #[must_use]
    pub fn new(facade: &'a CilModule, target: &'a CilModule, root: impl Into<String>) -> Self {
        SymbolMapCache {
            facade,
            target,
            root: root.into(),
            maps: Mutex::new(HashMap::new()),
            #[cfg(test)]
            decodes: AtomicUsize::new(0),
        }
    }

    /// The symbol map of the facade type called `full_name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the facade module has no map for the type,
    /// [`crate::Error::Malformed`] if the map can not be decoded and
    /// [`crate::Error::LockError`] if the cache lock is poisoned.
    pub fn resolve(&self, full_name: &str) -> Result<Arc<SymbolMap>> {
        let mut maps = lock!(self.maps)?;
        if let Some(map) = maps.get(full_name) {
            return Ok(Arc::clone(map));
        }

        let map = SymbolMap::load(self.facade, full_name)?
            .ok_or_else(|| invariant_error!(full_name, "facade type has no symbol map"))?;
        let map = Arc::new(map);
        #[cfg(test)]
        self.decodes.fetch_add(1, Ordering::SeqCst);
        maps.insert(full_name.to_string(), Arc::clone(&map));
        log::debug!(
            "Loaded symbol map of {} ({} fields, {} methods)",
            full_name,
            map.fields.len(),
            map.methods.len()
        );
        Ok(map)
    }

    /// Number of decoded maps
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the cache lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(lock!(self.maps)?.len())
    }

    /// Returns `true` if no map has been decoded yet
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the cache lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The target field behind `field`, a field of a facade type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the field is not in the symbol map.
    pub fn find_original_field(&self, facade_type: &TypeRef, field: &FieldRef) -> Result<FieldRef> {
        let full_name = facade_type.full_name();
        let map = self.resolve(&full_name)?;
        map.field(&field.name)
            .cloned()
            .ok_or_else(|| invariant_error!(field.full_name(), "field is missing from the symbol map of {}", full_name))
    }

    /// The target method behind `method`, a method of a facade type.
    ///
    /// The lookup key is the full name without generic arguments; generic instances are
    /// instantiated again on the target method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the method is not in the symbol map.
    pub fn find_original_method(&self, facade_type: &TypeRef, method: &MethodRef) -> Result<MethodRef> {
        let full_name = facade_type.full_name();
        let map = self.resolve(&full_name)?;
        let key = method.element_full_name();
        let original = map.method(&key).ok_or_else(|| {
            invariant_error!(key, "method is missing from the symbol map of {}", full_name)
        })?;

        if method.is_generic_instance() {
            original.make_generic(method.generic_args.clone())
        } else {
            Ok(original.clone())
        }
    }

    /// The target type mirrored by the facade type `facade_type`.
    ///
    /// Strips the facade root namespace; for static facades also the static partition and
    /// the name suffix of every static level. The result is scoped to the target assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the facade type is not part of the facade module
    /// or the target has no matching type.
    pub fn find_original_type(&self, facade_type: &TypeRef) -> Result<TypeRef> {
        let facade_name = facade_type.full_name();
        let outermost = facade_type.outermost();

        let namespace = match outermost.namespace.strip_prefix(self.root.as_str()) {
            Some("") => "",
            Some(rest) if rest.starts_with('.') => &rest[1..],
            _ => return Err(invariant_error!(facade_name, "not a facade type")),
        };

        let in_static_area = namespace == STATIC_PARTITION
            || namespace.starts_with(&format!("{STATIC_PARTITION}."));
        let namespace = if in_static_area {
            namespace
                .strip_prefix(STATIC_PARTITION)
                .map(|rest| rest.trim_start_matches('.'))
                .unwrap_or_default()
        } else {
            namespace
        };

        let facade_root = TypeRef::new("", outermost.namespace.clone(), outermost.name.clone());
        let mut facade_def = self
            .facade
            .find_type_by_ref(&facade_root)
            .ok_or_else(|| invariant_error!(facade_name, "type is not part of the facade module"))?;

        let path = facade_type.name_path();
        let mut original = TypeRef::new(
            self.target.name.clone(),
            namespace,
            strip_static_suffix(path[0], facade_def.is_static_class()),
        );
        for segment in path.iter().skip(1) {
            facade_def = facade_def
                .nested(segment)
                .ok_or_else(|| invariant_error!(facade_name, "type is not part of the facade module"))?;
            original = TypeRef::nested(
                original,
                strip_static_suffix(segment, facade_def.is_static_class()),
            );
        }

        if self.target.find_type_by_ref(&original).is_none() {
            return Err(Error::Invariant {
                symbol: facade_name,
                message: format!("mirrored type {original} does not exist in {}", self.target.name),
            });
        }
        Ok(original)
    }
}

fn strip_static_suffix(name: &str, is_static: bool) -> &str {
    if is_static {
        name.strip_suffix(STATIC_SUFFIX).unwrap_or(name)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::typesystem::TypeSig,
        test::{synthesize, TargetBuilder},
    };
    use rayon::prelude::*;

    fn modules() -> (CilModule, CilModule) {
        let target = TargetBuilder::scenario();
        let facade = synthesize(&target);
        (target, facade)
    }

    fn facade_ref(namespace: &str, name: &str) -> TypeRef {
        TypeRef::new("HKReflect", namespace, name)
    }

    #[test]
    fn maps_are_loaded_once() {
        let (target, facade) = modules();
        let cache = SymbolMapCache::new(&facade, &target, "HKReflect");
        assert!(cache.is_empty().unwrap());

        let first = cache.resolve("HKReflect.Game.T").unwrap();
        let second = cache.resolve("HKReflect.Game.T").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().unwrap(), 1);

        assert!(matches!(
            cache.resolve("HKReflect.Game.Missing"),
            Err(Error::Invariant { .. })
        ));
    }

    #[test]
    fn concurrent_lookups_decode_once() {
        let (target, facade) = modules();
        let cache = SymbolMapCache::new(&facade, &target, "HKReflect");

        let maps = (0..64)
            .into_par_iter()
            .map(|_| cache.resolve("HKReflect.Game.T"))
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(maps.len(), 64);
        assert!(maps.iter().all(|map| Arc::ptr_eq(map, &maps[0])));
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.decodes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let (target, facade) = modules();
        let cache = SymbolMapCache::new(&facade, &target, "HKReflect");

        std::thread::scope(|scope| {
            let poisoner = scope.spawn(|| {
                let _guard = cache.maps.lock().unwrap();
                panic!("poison the symbol map cache");
            });
            assert!(poisoner.join().is_err());
        });

        assert!(matches!(cache.len(), Err(Error::LockError(_))));
        assert!(matches!(cache.is_empty(), Err(Error::LockError(_))));
        assert!(matches!(cache.resolve("HKReflect.Game.T"), Err(Error::LockError(_))));
    }

    #[test]
    fn field_and_method_lookup() {
        let (target, facade) = modules();
        let cache = SymbolMapCache::new(&facade, &target, "HKReflect");
        let t = facade_ref("HKReflect.Game", "T");

        let field = FieldRef::new(TypeSig::Class(t.clone()), "x", TypeSig::I4);
        let original = cache.find_original_field(&t, &field).unwrap();
        assert_eq!(original.full_name(), "System.Int32 Game.T::x");

        let hidden = FieldRef::new(TypeSig::Class(t.clone()), "y", TypeSig::I4);
        assert!(matches!(
            cache.find_original_field(&t, &hidden),
            Err(Error::Invariant { .. })
        ));

        let hero = facade_ref("HKReflect", "HeroController");
        let attack = MethodRef::new(TypeSig::Class(hero.clone()), "Attack", true, TypeSig::Void, vec![TypeSig::I4]);
        let original = cache.find_original_method(&hero, &attack).unwrap();
        assert_eq!(original.full_name(), "System.Void HeroController::Attack(System.Int32)");
    }

    #[test]
    fn original_types() {
        let (target, facade) = modules();
        let cache = SymbolMapCache::new(&facade, &target, "HKReflect");

        let t = cache.find_original_type(&facade_ref("HKReflect.Game", "T")).unwrap();
        assert_eq!(t.full_name(), "Game.T");
        assert_eq!(t.scope, "Assembly-CSharp");

        let util = cache
            .find_original_type(&facade_ref("HKReflect.Static.Game", "UtilR"))
            .unwrap();
        assert_eq!(util.full_name(), "Game.Util");

        let inner = TypeRef::nested(facade_ref("HKReflect.Game", "Outer"), "Inner");
        assert_eq!(
            cache.find_original_type(&inner).unwrap().full_name(),
            "Game.Outer/Inner"
        );

        let global = cache.find_original_type(&facade_ref("HKReflect", "PlayerData")).unwrap();
        assert_eq!(global.full_name(), "PlayerData");

        assert!(cache.find_original_type(&facade_ref("Other", "T")).is_err());
        assert!(cache.find_original_type(&facade_ref("HKReflect.Game", "Nope")).is_err());
    }
}
