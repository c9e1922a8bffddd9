//! The in-memory representation of a compiled module.
//!
//! [`CilModule`] is the unit both halves of the pipeline operate on: the synthesizer reads a
//! target module and produces a facade module, the weaver patches a plugin module in place.
//! Modules are persisted in the image format of [`crate::metadata::image`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilfacade::metadata::CilModule;
//! use std::path::Path;
//!
//! let module = CilModule::from_file(Path::new("Assembly-CSharp.cmi"))?;
//! println!("{} v{} ({})", module.name, module.version, module.mvid);
//!
//! module.walk_types(|type_ref, type_def| {
//!     println!("{} - {} methods", type_ref, type_def.methods.len());
//! });
//! # Ok::<(), cilfacade::Error>(())
//! ```

use std::{fmt, path::Path};

use crate::{
    file::File,
    metadata::{
        image,
        members::{CustomAttribute, TypeDef},
        security::SecurityDeclaration,
        typesystem::TypeRef,
    },
    Result,
};

/// Four-part assembly version, `major.minor.build.revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Version {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build version component
    pub build: u16,
    /// Revision version component
    pub revision: u16,
}

impl Version {
    /// Create a version from its four components.
    #[must_use]
    pub fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Version {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

/// A reference to another assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRef {
    /// Simple assembly name
    pub name: String,
    /// Referenced version
    pub version: Version,
}

impl AssemblyRef {
    /// Create an assembly reference.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        AssemblyRef {
            name: name.into(),
            version,
        }
    }
}

/// A named blob embedded in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource name, unique within the module
    pub name: String,
    /// Resource content
    pub data: Vec<u8>,
}

/// A compiled module: one assembly with its types, references and resources.
#[derive(Debug, Clone, PartialEq)]
pub struct CilModule {
    /// Assembly name, used as the resolution scope by other modules
    pub name: String,
    /// Assembly version
    pub version: Version,
    /// Module version id, derived from the module content when the image is written
    pub mvid: uguid::Guid,
    /// Referenced assemblies
    pub assembly_refs: Vec<AssemblyRef>,
    /// Assembly-level custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Assembly-level declarative security
    pub security_declarations: Vec<SecurityDeclaration>,
    /// Top-level types
    pub types: Vec<TypeDef>,
    /// Embedded resources
    pub resources: Vec<Resource>,
}

impl CilModule {
    /// Create an empty module.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        CilModule {
            name: name.into(),
            version,
            mvid: uguid::Guid::ZERO,
            assembly_refs: Vec::new(),
            custom_attributes: Vec::new(),
            security_declarations: Vec::new(),
            types: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Load a module image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be read, or the errors of
    /// [`CilModule::from_bytes`].
    pub fn from_file(path: &Path) -> Result<CilModule> {
        let file = File::from_file(path)?;
        Self::from_bytes(file.data())
    }

    /// Decode a module image.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for data that is not a module image and
    /// [`crate::Error::Malformed`] / [`crate::Error::OutOfBounds`] for damaged images.
    pub fn from_bytes(data: &[u8]) -> Result<CilModule> {
        image::decode(data)
    }

    /// Encode this module as an image. The encoding is deterministic.
    ///
    /// # Errors
    /// Returns an error if a length or count exceeds what the image format can represent.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        image::encode(self)
    }

    /// Write this module as an image to `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on I/O failure.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_bytes()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// The reference to the assembly called `name`.
    #[must_use]
    pub fn assembly_ref(&self, name: &str) -> Option<&AssemblyRef> {
        self.assembly_refs.iter().find(|aref| aref.name == name)
    }

    /// Returns `true` if this module references the assembly called `name`.
    #[must_use]
    pub fn references_assembly(&self, name: &str) -> bool {
        self.assembly_ref(name).is_some()
    }

    /// Add an assembly reference unless one with the same name exists.
    pub fn add_assembly_ref(&mut self, assembly_ref: AssemblyRef) {
        if !self.references_assembly(&assembly_ref.name) {
            self.assembly_refs.push(assembly_ref);
        }
    }

    /// Drop the reference to the assembly called `name`, returning `true` if it existed.
    pub fn remove_assembly_ref(&mut self, name: &str) -> bool {
        let before = self.assembly_refs.len();
        self.assembly_refs.retain(|aref| aref.name != name);
        before != self.assembly_refs.len()
    }

    /// Content of the resource called `name`.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources
            .iter()
            .find(|resource| resource.name == name)
            .map(|resource| resource.data.as_slice())
    }

    /// Add a resource, replacing an existing one with the same name.
    pub fn add_resource(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.resources.iter_mut().find(|resource| resource.name == name) {
            Some(existing) => existing.data = data,
            None => self.resources.push(Resource { name, data }),
        }
    }

    /// Find a type by full name (`Ns.Outer/Inner`).
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        let mut segments = full_name.split('/');
        let (namespace, name) = split_full_name(segments.next()?);
        let mut current = self
            .types
            .iter()
            .find(|def| def.namespace == namespace && def.name == name)?;
        for nested in segments {
            current = current.nested(nested)?;
        }
        Some(current)
    }

    /// Like [`CilModule::find_type`], for types that have to exist.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] naming the type and this module.
    pub fn require_type(&self, full_name: &str) -> Result<&TypeDef> {
        self.find_type(full_name)
            .ok_or_else(|| crate::Error::TypeNotFound(format!("{full_name} in {}", self.name)))
    }

    /// Mutable access to the type with the given full name.
    pub fn find_type_mut(&mut self, full_name: &str) -> Option<&mut TypeDef> {
        let mut segments = full_name.split('/');
        let (namespace, name) = split_full_name(segments.next()?);
        let mut current = self
            .types
            .iter_mut()
            .find(|def| def.namespace == namespace && def.name == name)?;
        for nested in segments {
            current = current.nested_mut(nested)?;
        }
        Some(current)
    }

    /// Find the definition behind a type reference, ignoring its scope.
    #[must_use]
    pub fn find_type_by_ref(&self, type_ref: &TypeRef) -> Option<&TypeDef> {
        let outermost = type_ref.outermost();
        let path = type_ref.name_path();
        let mut current = self
            .types
            .iter()
            .find(|def| def.namespace == outermost.namespace && def.name == outermost.name)?;
        for nested in path.iter().skip(1) {
            current = current.nested(nested)?;
        }
        Some(current)
    }

    /// Visit every type, nested types included, depth first in declaration order.
    ///
    /// The visitor receives the reference naming each type from inside this module (empty
    /// scope) together with its definition.
    pub fn walk_types(&self, mut visitor: impl FnMut(&TypeRef, &TypeDef)) {
        fn walk(type_ref: &TypeRef, def: &TypeDef, visitor: &mut impl FnMut(&TypeRef, &TypeDef)) {
            visitor(type_ref, def);
            for nested in &def.nested_types {
                let nested_ref = TypeRef::nested(type_ref.clone(), nested.name.clone());
                walk(&nested_ref, nested, visitor);
            }
        }

        for def in &self.types {
            let type_ref = TypeRef::new("", def.namespace.clone(), def.name.clone());
            walk(&type_ref, def, &mut visitor);
        }
    }

    /// Number of types, nested types included.
    #[must_use]
    pub fn type_count(&self) -> usize {
        let mut count = 0;
        self.walk_types(|_, _| count += 1);
        count
    }
}

/// Split a top-level full name at its last `.` into namespace and name.
fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rfind('.') {
        Some(pos) => (&full_name[..pos], &full_name[pos + 1..]),
        None => ("", full_name),
    }
}
