//! The module object model: types, members, references and their persisted form.
//!
//! # Key Components
//!
//! - [`CilModule`] - One compiled module with its types, references and resources
//! - [`typesystem`] - Type references, signatures and attribute flags
//! - [`members`] - Type and member definitions
//! - [`references`] - Field and method references used by instructions
//! - [`security`] - Declarative security (`SkipVerification`)
//! - [`image`] - The binary module image format
//! - [`AssemblyResolver`] - Resolution of types across modules
//!
//! # Examples
//!
//! ```rust
//! use cilfacade::metadata::{
//!     members::{FieldDef, TypeDef},
//!     typesystem::{FieldAttributes, TypeAttributes, TypeSig},
//!     CilModule, Version,
//! };
//!
//! let mut module = CilModule::new("Assembly-CSharp", Version::new(1, 0, 0, 0));
//! module.types.push(
//!     TypeDef::new("Game", "Hero", TypeAttributes::PUBLIC)
//!         .with_field(FieldDef::new("health", FieldAttributes::PRIVATE, TypeSig::I4)),
//! );
//!
//! let decoded = CilModule::from_bytes(&module.to_bytes()?)?;
//! assert!(decoded.find_type("Game.Hero").is_some());
//! # Ok::<(), cilfacade::Error>(())
//! ```

pub mod image;
pub mod members;
mod module;
pub mod references;
mod resolver;
pub mod security;
pub mod typesystem;

pub use module::{AssemblyRef, CilModule, Resource, Version};
pub use resolver::{AssemblyResolver, IMAGE_EXTENSION};
