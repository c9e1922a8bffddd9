//! Rewriting of modules written against a facade.
//!
//! A plugin compiled against the facade module references facade types that do not exist at
//! runtime. The [`Weaver`] patches such a module in place so that it references the target
//! program directly:
//!
//! - facade field and method operands are replaced by the original members
//! - `Reflect` conversions are removed
//! - singleton accessors are replaced by the real instance accessors
//! - fields of the visibility-gated type are reached through its named accessors
//! - facade-typed locals are retyped
//!
//! The rewritten module drops its reference to the facade assembly and requests
//! `SkipVerification`, since it now touches non-public members of the target.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfacade::metadata::CilModule;
//! use cilfacade::weaver::{Weaver, WeaverConfig};
//! use std::path::Path;
//!
//! let target = CilModule::from_file(Path::new("Managed/Assembly-CSharp.cmi"))?;
//! let facade = CilModule::from_file(Path::new("HKReflect.cmi"))?;
//! let mut plugin = CilModule::from_file(Path::new("MyMod.cmi"))?;
//!
//! let weaver = Weaver::new(WeaverConfig::default(), &target, &facade);
//! let outcome = weaver.weave(&mut plugin)?;
//! println!("{outcome}");
//! plugin.to_file(Path::new("MyMod.cmi"))?;
//! # Ok::<(), cilfacade::Error>(())
//! ```

mod cache;
mod gated;
mod instruction;
mod method;
mod registry;
mod reroute;

use std::{collections::BTreeSet, fmt, ops::AddAssign};

use rayon::prelude::*;

use crate::{
    assembly::Operand,
    facade::singletons::{Singleton, SINGLETONS},
    metadata::{
        members::TypeDef,
        typesystem::{TypeRef, TypeSig},
        AssemblyRef, CilModule,
    },
    Result,
};

pub use cache::SymbolMapCache;
pub use gated::{accessor_name, Access};
pub use instruction::Step;
pub use reroute::{is_referenced, BranchSites};

use instruction::InstructionRewriter;

/// Settings of a rewrite run.
#[derive(Debug, Clone)]
pub struct WeaverConfig {
    /// Assembly name of the target program
    pub target_assembly: String,
    /// Assembly name of the facade module
    pub facade_assembly: String,
    /// Root namespace of the facade types
    pub facade_namespace: String,
    /// Namespaces (and their children) of the rewritten module that are left alone
    pub excluded_namespaces: Vec<String>,
    /// Full name of the target type whose fields are reached through accessors
    pub gated_type: String,
    /// Singleton types and their instance accessors
    pub singletons: Vec<Singleton>,
    /// Rewrite types and methods on the rayon thread pool
    pub parallel: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        WeaverConfig {
            target_assembly: "Assembly-CSharp".to_string(),
            facade_assembly: "HKReflect".to_string(),
            facade_namespace: "HKReflect".to_string(),
            excluded_namespaces: vec!["System".to_string()],
            gated_type: "PlayerData".to_string(),
            singletons: SINGLETONS.to_vec(),
            parallel: true,
        }
    }
}

impl WeaverConfig {
    fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded_namespaces.iter().any(|excluded| {
            namespace == excluded
                || namespace
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// Counters of a rewrite run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaveStats {
    /// Types visited, nested types included
    pub types: usize,
    /// Method bodies that were rewritten
    pub bodies: usize,
    /// Field operands redirected to the target
    pub fields: usize,
    /// Method operands redirected to the target
    pub methods: usize,
    /// Field accesses turned into accessor calls on the gated type
    pub gated: usize,
    /// Singleton accessors regenerated
    pub singletons: usize,
    /// `Reflect` conversions removed
    pub conversions: usize,
    /// Locals retyped from facade to target types
    pub locals: usize,
}

impl AddAssign for WeaveStats {
    fn add_assign(&mut self, other: WeaveStats) {
        self.types += other.types;
        self.bodies += other.bodies;
        self.fields += other.fields;
        self.methods += other.methods;
        self.gated += other.gated;
        self.singletons += other.singletons;
        self.conversions += other.conversions;
        self.locals += other.locals;
    }
}

impl fmt::Display for WeaveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bodies in {} types rewritten ({} fields, {} methods, {} gated accesses, {} singletons, {} conversions, {} locals)",
            self.bodies,
            self.types,
            self.fields,
            self.methods,
            self.gated,
            self.singletons,
            self.conversions,
            self.locals
        )
    }
}

/// Why a module was left unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The module does not reference the target program
    MissingTarget(String),
    /// The module does not reference the facade module
    MissingFacade(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTarget(name) => write!(f, "no reference to the target assembly {name}"),
            SkipReason::MissingFacade(name) => write!(f, "no reference to the facade assembly {name}"),
        }
    }
}

/// Result of [`Weaver::weave`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeaveOutcome {
    /// Preconditions were not met, the module is unchanged
    Skipped(SkipReason),
    /// The module was rewritten
    Woven(WeaveStats),
}

impl fmt::Display for WeaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeaveOutcome::Skipped(reason) => write!(f, "skipped, {reason}"),
            WeaveOutcome::Woven(stats) => write!(f, "woven, {stats}"),
        }
    }
}

/// Rewrites modules against one target program and its facade.
pub struct Weaver<'a> {
    config: WeaverConfig,
    target: &'a CilModule,
    cache: SymbolMapCache<'a>,
}

impl<'a> Weaver<'a> {
    /// Create a weaver. Symbol maps are decoded lazily and shared by every [`Weaver::weave`] call.
    #[must_use]
    pub fn new(config: WeaverConfig, target: &'a CilModule, facade: &'a CilModule) -> Self {
        Weaver {
            cache: SymbolMapCache::new(facade, target, config.facade_namespace.clone()),
            config,
            target,
        }
    }

    /// The settings of this weaver.
    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Rewrite `module` in place.
    ///
    /// The run is all-or-nothing: on error `module` is left exactly as it was.
    ///
    /// # Errors
    /// Returns [`crate::Error::FacadeUsage`] if the module uses facade types where they can
    /// not be replaced, and [`crate::Error::Invariant`] if the facade module does not match
    /// the target.
    pub fn weave(&self, module: &mut CilModule) -> Result<WeaveOutcome> {
        if !module.references_assembly(&self.config.target_assembly) {
            log::error!(
                "{} does not reference {}, nothing to rewrite",
                module.name,
                self.config.target_assembly
            );
            return Ok(WeaveOutcome::Skipped(SkipReason::MissingTarget(
                self.config.target_assembly.clone(),
            )));
        }

        if !module.references_assembly(&self.config.facade_assembly) {
            log::warn!(
                "{} does not reference {}, nothing to rewrite",
                module.name,
                self.config.facade_assembly
            );
            return Ok(WeaveOutcome::Skipped(SkipReason::MissingFacade(
                self.config.facade_assembly.clone(),
            )));
        }

        let rewriter = InstructionRewriter::new(&self.config, self.target, &self.cache);

        let mut woven = module.clone();
        woven.ensure_skip_verification();

        let weave_type = |def: &mut TypeDef| {
            let type_ref = TypeRef::new("", def.namespace.clone(), def.name.clone());
            self.weave_type(&rewriter, def, &type_ref)
        };
        let per_type = if self.config.parallel {
            woven
                .types
                .par_iter_mut()
                .filter(|def| !self.config.is_excluded(&def.namespace))
                .map(weave_type)
                .collect::<Result<Vec<_>>>()?
        } else {
            woven
                .types
                .iter_mut()
                .filter(|def| !self.config.is_excluded(&def.namespace))
                .map(weave_type)
                .collect::<Result<Vec<_>>>()?
        };

        let mut stats = WeaveStats::default();
        for type_stats in per_type {
            stats += type_stats;
        }

        self.add_assembly_refs(&mut woven);
        woven.remove_assembly_ref(&self.config.facade_assembly);
        *module = woven;

        log::info!("Rewrote {}: {}", module.name, stats);
        Ok(WeaveOutcome::Woven(stats))
    }

    fn weave_type(
        &self,
        rewriter: &InstructionRewriter<'_>,
        def: &mut TypeDef,
        type_ref: &TypeRef,
    ) -> Result<WeaveStats> {
        let is_facade = |r: &TypeRef| rewriter.is_facade(r);

        if let Some(base) = def.base_type.iter().chain(&def.interfaces).find(|sig| sig.mentions(&is_facade)) {
            return Err(usage_error!(type_ref, "derives from the facade type {}", base));
        }

        let declaring = TypeSig::Class(type_ref.clone());
        if let Some(field) = def.fields.iter().find(|field| field.field_type.mentions(&is_facade)) {
            return Err(usage_error!(
                field.reference(declaring).full_name(),
                "field type is a facade type"
            ));
        }

        let per_method = if self.config.parallel {
            def.methods
                .par_iter_mut()
                .map(|method| method::rewrite_method(rewriter, type_ref, method))
                .collect::<Result<Vec<_>>>()?
        } else {
            def.methods
                .iter_mut()
                .map(|method| method::rewrite_method(rewriter, type_ref, method))
                .collect::<Result<Vec<_>>>()?
        };

        let mut stats = WeaveStats {
            types: 1,
            ..WeaveStats::default()
        };
        for method_stats in per_method {
            stats += method_stats;
        }

        for nested in &mut def.nested_types {
            let nested_ref = TypeRef::nested(type_ref.clone(), nested.name.clone());
            stats += self.weave_type(rewriter, nested, &nested_ref)?;
        }

        Ok(stats)
    }

    /// Reference every assembly that rewritten operands and locals now point into.
    fn add_assembly_refs(&self, module: &mut CilModule) {
        let mut scopes = BTreeSet::new();
        for def in &module.types {
            collect_scopes(def, &mut scopes);
        }

        for scope in scopes {
            if scope == module.name || module.references_assembly(&scope) {
                continue;
            }

            let version = if scope == self.target.name {
                Some(self.target.version)
            } else {
                self.target.assembly_ref(&scope).map(|aref| aref.version)
            };
            match version {
                Some(version) => {
                    log::debug!("Adding reference to {scope} {version}");
                    module.add_assembly_ref(AssemblyRef::new(scope, version));
                }
                None => log::warn!("No version known for {scope}, reference not added"),
            }
        }
    }
}

fn collect_scopes(def: &TypeDef, scopes: &mut BTreeSet<String>) {
    let mut found = Vec::new();
    for body in def.methods.iter().filter_map(|method| method.body.as_ref()) {
        for local in &body.locals {
            local.collect_scopes(&mut found);
        }
        for instruction in body.instructions() {
            match &instruction.operand {
                Operand::Field(field) => field.collect_scopes(&mut found),
                Operand::Method(method) => method.collect_scopes(&mut found),
                Operand::Type(sig) => sig.collect_scopes(&mut found),
                _ => {}
            }
        }
    }
    scopes.extend(found.into_iter().filter(|scope| !scope.is_empty()).map(str::to_string));

    for nested in &def.nested_types {
        collect_scopes(nested, scopes);
    }
}
