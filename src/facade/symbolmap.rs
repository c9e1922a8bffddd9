//! Symbol maps linking facade members back to the target program.
//!
//! Every facade type owns two module resources:
//!
//! - `<facade full name>::<OrigFields>` - facade field name to original field
//! - `<facade full name>::<OrigMethods>` - facade method full name to original method
//!
//! # Format
//!
//! ```text
//! magic       "OMAP"
//! version     u8
//! entry*      0x01, name (prefixed UTF-8), symbol (image reference encoding)
//! terminator  0x2A
//! ```
//!
//! The table is self-terminating: bytes after the terminator are ignored. Names are unique
//! within a table, a repeated name makes the table malformed.

use std::collections::HashMap;

use crate::{
    file::{parser::Parser, writer::ByteWriter},
    metadata::{
        image,
        references::{FieldRef, MethodRef},
        CilModule,
    },
    Result,
};

/// Symbol table magic
pub const MAGIC: &[u8; 4] = b"OMAP";
/// Current symbol table version
pub const VERSION: u8 = 1;
/// Resource name suffix of field tables
pub const FIELDS_SUFFIX: &str = "::<OrigFields>";
/// Resource name suffix of method tables
pub const METHODS_SUFFIX: &str = "::<OrigMethods>";

const ENTRY: u8 = 0x01;
const TERMINATOR: u8 = 0x2A;

/// Name of the field table resource of the facade type `facade_full_name`.
#[must_use]
pub fn fields_resource_name(facade_full_name: &str) -> String {
    format!("{facade_full_name}{FIELDS_SUFFIX}")
}

/// Name of the method table resource of the facade type `facade_full_name`.
#[must_use]
pub fn methods_resource_name(facade_full_name: &str) -> String {
    format!("{facade_full_name}{METHODS_SUFFIX}")
}

/// A member reference that can be stored in a symbol table.
pub trait Symbol: Clone {
    /// Append the encoded symbol.
    ///
    /// # Errors
    /// Propagates encoding overflows.
    fn encode(&self, writer: &mut ByteWriter) -> Result<()>;

    /// Read one symbol at the parser position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged data.
    fn decode(parser: &mut Parser<'_>) -> Result<Self>;
}

impl Symbol for FieldRef {
    fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        image::write_field_ref(writer, self)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        image::read_field_ref(parser)
    }
}

impl Symbol for MethodRef {
    fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        image::write_method_ref(writer, self)
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        image::read_method_ref(parser)
    }
}

/// An ordered table of `(name, symbol)` pairs with unique names.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable<S> {
    entries: Vec<(String, S)>,
    index: HashMap<String, usize>,
}

impl<S> Default for SymbolTable<S> {
    fn default() -> Self {
        SymbolTable {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S: Symbol> SymbolTable<S> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `name` is already present.
    pub fn push(&mut self, name: impl Into<String>, symbol: S) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(malformed_error!("Duplicate symbol map entry '{}'", name));
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, symbol));
        Ok(())
    }

    /// The symbol stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&S> {
        self.index.get(name).map(|&slot| &self.entries[slot].1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &S)> {
        self.entries.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the table, terminator included.
    ///
    /// # Errors
    /// Propagates encoding overflows of names or symbols.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        writer.write_bytes(MAGIC);
        writer.write_le::<u8>(VERSION);
        for (name, symbol) in &self.entries {
            writer.write_le::<u8>(ENTRY);
            writer.write_prefixed_string_utf8(name)?;
            symbol.encode(&mut writer)?;
        }
        writer.write_le::<u8>(TERMINATOR);
        Ok(writer.into_inner())
    }

    /// Decode a table, stopping at the terminator.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong magic or version, unknown entry tags and
    /// duplicate names, and [`crate::Error::OutOfBounds`] if the terminator is missing.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        if parser.read_bytes(MAGIC.len())? != MAGIC {
            return Err(malformed_error!("Symbol map has an invalid magic"));
        }

        let version = parser.read_le::<u8>()?;
        if version != VERSION {
            return Err(malformed_error!("Unsupported symbol map version {}", version));
        }

        let mut table = SymbolTable::new();
        loop {
            match parser.read_le::<u8>()? {
                ENTRY => {
                    let name = parser.read_prefixed_string_utf8()?;
                    let symbol = S::decode(&mut parser)?;
                    table.push(name, symbol)?;
                }
                TERMINATOR => return Ok(table),
                tag => return Err(malformed_error!("Invalid symbol map entry tag 0x{:02x}", tag)),
            }
        }
    }
}

/// Field and method tables of one facade type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolMap {
    /// Facade field name to original field
    pub fields: SymbolTable<FieldRef>,
    /// Facade method full name to original method
    pub methods: SymbolTable<MethodRef>,
}

impl SymbolMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if neither table has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.methods.is_empty()
    }

    /// The original field behind the facade field `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.fields.get(name)
    }

    /// The original method behind the facade method with the generic-erased `full_name`.
    #[must_use]
    pub fn method(&self, full_name: &str) -> Option<&MethodRef> {
        self.methods.get(full_name)
    }

    /// Store both tables as resources of `module`.
    ///
    /// # Errors
    /// Propagates encoding failures.
    pub fn attach(&self, facade_full_name: &str, module: &mut CilModule) -> Result<()> {
        module.add_resource(fields_resource_name(facade_full_name), self.fields.encode()?);
        module.add_resource(methods_resource_name(facade_full_name), self.methods.encode()?);
        Ok(())
    }

    /// Read the tables of the facade type `facade_full_name` from `module`.
    ///
    /// Returns `None` if the module carries no tables for that type. A single missing table
    /// reads as empty.
    ///
    /// # Errors
    /// Returns the decoding errors of [`SymbolTable::decode`].
    pub fn load(module: &CilModule, facade_full_name: &str) -> Result<Option<SymbolMap>> {
        let fields = module.resource(&fields_resource_name(facade_full_name));
        let methods = module.resource(&methods_resource_name(facade_full_name));
        if fields.is_none() && methods.is_none() {
            return Ok(None);
        }

        Ok(Some(SymbolMap {
            fields: fields.map(SymbolTable::decode).transpose()?.unwrap_or_default(),
            methods: methods.map(SymbolTable::decode).transpose()?.unwrap_or_default(),
        }))
    }
}
