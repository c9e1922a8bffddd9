//! # cilfacade Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! cilfacade library. Import it to get the module model, the synthesizer and the weaver in one
//! line.
//!
//! ```rust,no_run
//! use cilfacade::prelude::*;
//! use std::path::Path;
//!
//! let target = CilModule::from_file(Path::new("Assembly-CSharp.cmi"))?;
//! let facade = FacadeSynthesizer::new(SynthesizerConfig::new("HKReflect")).synthesize(&target)?;
//! println!("{} facade types", facade.type_count());
//! # Ok::<(), Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilfacade operations
pub use crate::Error;

/// The result type used throughout cilfacade
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{ByteWriter, File, Parser};

// ================================================================================================
// Module Model
// ================================================================================================

/// Modules and their references
pub use crate::metadata::{AssemblyRef, AssemblyResolver, CilModule, Resource, Version};

/// Type and member definitions
pub use crate::metadata::members::{
    CustomAttribute, FieldDef, GenericParam, MethodDef, ParamDef, PropertyDef, TypeDef,
};

/// Member references
pub use crate::metadata::references::{CallSite, FieldRef, MethodRef};

/// Type references, signatures and attribute flags
pub use crate::metadata::typesystem::{
    FieldAttributes, MethodAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
    TypeRef, TypeSig,
};

// ================================================================================================
// Method Bodies
// ================================================================================================

/// Instructions and editable bodies
pub use crate::assembly::{
    ExceptionHandler, HandlerKind, Immediate, InstrId, Instruction, MethodBody, OpCode, Operand,
};

// ================================================================================================
// Facade Synthesis
// ================================================================================================

/// The synthesizer and its settings
pub use crate::facade::{FacadeSynthesizer, SynthesizerConfig};

/// Symbol maps embedded in facade modules
pub use crate::facade::symbolmap::SymbolMap;

/// The singleton registry
pub use crate::facade::singletons::{Singleton, SingletonAccess, SINGLETONS};

// ================================================================================================
// Weaving
// ================================================================================================

/// The weaver, its settings and its results
pub use crate::weaver::{SkipReason, WeaveOutcome, WeaveStats, Weaver, WeaverConfig};
