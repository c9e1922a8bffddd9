// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/mod.rs' uses mmap to map a module image into memory

//! # cilfacade
//!
//! Compile-time access to the non-public surface of a compiled CIL program.
//!
//! `cilfacade` lets plugin code call the private and internal members of a third-party program
//! without that program granting access and without paying for runtime reflection. It works in
//! two cooperating steps:
//!
//! - **Facade synthesis** ([`facade::FacadeSynthesizer`]) derives, from the target program's
//!   module, a second module in which every originally inaccessible field, property and method
//!   is mirrored as public. Every facade type carries a binary symbol map that links each mirrored
//!   member back to the real one.
//! - **Weaving** ([`weaver::Weaver`]) takes a module compiled against the facade and patches
//!   every instruction that references a facade symbol so that it references the real symbol
//!   directly. After weaving, the facade module is no longer needed at load time.
//!
//! ## Features
//!
//! - **🧬 ECMA-335 object model** - Types, members, signatures and the complete CIL opcode table
//! - **🔀 Control-flow safe rewriting** - Instructions carry stable identities; branch, switch and
//!   exception-handler targets are rerouted whenever instructions are spliced in or removed
//! - **⚡ Parallel weaving** - Types and methods are processed with `rayon`, symbol maps are
//!   memoized behind a single lock
//! - **💾 Deterministic images** - Modules round-trip through a compact binary image (`.cmi`) whose
//!   bytes only depend on the module contents
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilfacade::prelude::*;
//! use std::path::Path;
//!
//! // Generate the facade from the target program
//! let target = CilModule::from_file(Path::new("Assembly-CSharp.cmi"))?;
//! let synthesizer = FacadeSynthesizer::new(SynthesizerConfig::new("HKReflect"));
//! let facade = synthesizer.synthesize(&target)?;
//! facade.to_file(Path::new("HKReflect.cmi"))?;
//!
//! // Weave a plugin that was compiled against the facade
//! let mut plugin = CilModule::from_file(Path::new("MyMod.cmi"))?;
//! let weaver = Weaver::new(WeaverConfig::default(), &target, &facade);
//! let outcome = weaver.weave(&mut plugin)?;
//! println!("{outcome}");
//! plugin.to_file(Path::new("MyMod.cmi"))?;
//! # Ok::<(), cilfacade::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The module object model, attribute flags, the `.cmi` image codec and the
//!   assembly resolver
//! - [`assembly`] - Opcodes, instructions and method bodies with stable instruction identities
//! - [`facade`] - Visibility classification, facade generation and the symbol map format
//! - [`weaver`] - The instruction rewriter and its type / method drivers
//!
//! ## Logging
//!
//! The library logs through the [`log`] facade; install any logger (the command line tool
//! uses `env_logger`) to see per-type decisions at `debug` level and run summaries at `info`.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use cilfacade::prelude::*;
///
/// let module = CilModule::from_file("Assembly-CSharp.cmi".as_ref())?;
/// println!("{} top-level types", module.types.len());
/// # Ok::<(), cilfacade::Error>(())
/// ```
pub mod prelude;

/// Opcodes, instructions and method bodies based on ECMA-335
///
/// This module holds the instruction-level representation that the weaver mutates:
///
/// - [`assembly::OpCode`] - The complete CIL opcode table with operand kinds and flow control
/// - [`assembly::Instruction`] - One opcode and its operand, identified by a stable [`assembly::InstrId`]
/// - [`assembly::MethodBody`] - Instruction stream, locals and exception handlers, with macro
///   simplification / optimization and offset computation
///
/// # Examples
///
/// ```rust
/// use cilfacade::assembly::{MethodBody, OpCode, Operand};
///
/// let mut body = MethodBody::new();
/// let ret = body.push(OpCode::Ret, Operand::None);
/// body.insert_before(ret, OpCode::Nop, Operand::None)?;
/// assert_eq!(body.code_size(), 2);
/// # Ok::<(), cilfacade::Error>(())
/// ```
pub mod assembly;

/// Module object model, resolution and persistence
///
/// # Key Components
///
/// - [`metadata::CilModule`] - A module: its types, assembly references, resources and
///   assembly-level security declarations
/// - [`metadata::typesystem`] - Type references, signatures and Cecil-compatible full names
/// - [`metadata::AssemblyResolver`] - Resolves references across modules by assembly name
/// - [`metadata::image`] - The deterministic `.cmi` binary image
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::metadata::CilModule;
/// use std::path::Path;
///
/// let module = CilModule::from_file(Path::new("Assembly-CSharp.cmi"))?;
/// module.walk_types(|type_ref, type_def| {
///     println!("{} ({} methods)", type_ref.full_name(), type_def.methods.len());
/// });
/// # Ok::<(), cilfacade::Error>(())
/// ```
pub mod metadata;

/// Facade generation
///
/// Produces the facade module for a target program. See [`facade::FacadeSynthesizer`].
pub mod facade;

/// Facade reference rewriting
///
/// Rewrites modules compiled against a facade so that they reference the target program
/// directly. See [`weaver::Weaver`].
pub mod weaver;

/// `cilfacade` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::{Result, metadata::CilModule};
///
/// fn load(path: &str) -> Result<CilModule> {
///     CilModule::from_file(std::path::Path::new(path))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `cilfacade` Error type
///
/// The main error type for all operations in this crate. Provides detailed error information
/// for image parsing, facade misuse and broken facade / target pairs.
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::{Error, metadata::CilModule};
///
/// match CilModule::from_file(std::path::Path::new("broken.cmi")) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::NotSupported) => println!("Not a module image"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Provides access to low-level parsing and writing utilities.
///
/// The [`Parser`] type is used for decoding module images and symbol maps, [`ByteWriter`]
/// produces them.
///
/// # Example
///
/// ```rust
/// use cilfacade::{ByteWriter, Parser};
///
/// let mut writer = ByteWriter::new();
/// writer.write_prefixed_string_utf8("Reflector")?;
///
/// let bytes = writer.into_inner();
/// let mut parser = Parser::new(&bytes);
/// assert_eq!(parser.read_prefixed_string_utf8()?, "Reflector");
/// # Ok::<(), cilfacade::Error>(())
/// ```
pub use file::{parser::Parser, writer::ByteWriter, File};

/// The in-memory module model, the entry point for loading and saving module images.
pub use metadata::CilModule;

/// Facade synthesis entry points.
pub use facade::{FacadeSynthesizer, SynthesizerConfig};

/// Rewriting entry points.
pub use weaver::{WeaveOutcome, Weaver, WeaverConfig};
