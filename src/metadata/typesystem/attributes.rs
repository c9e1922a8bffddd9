//! Attribute flags of types, fields, methods, parameters and properties (ECMA-335 II.23.1).
//!
//! The access / visibility values are not independent bits but a 3-bit enumeration, so they
//! are compared through the `access()` / `visibility()` helpers instead of `contains`.

use bitflags::bitflags;

/// Bitmask for `VISIBILITY` extraction from [`TypeAttributes`]
pub const TYPE_VISIBILITY_MASK: u32 = 0x0007;
/// Bitmask for `ACCESS` extraction from [`FieldAttributes`] and [`MethodAttributes`]
pub const MEMBER_ACCESS_MASK: u16 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Type definition flags
    pub struct TypeAttributes: u32 {
        /// Top-level type visible outside its assembly
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested type with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested type visible to its family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested type visible inside its assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested type visible to family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested type visible to family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Fields laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields laid out explicitly
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Type name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Type is imported
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Strings are marshalled as UTF-16
        const UNICODE_CLASS = 0x0001_0000;
        /// String marshalling is platform dependent
        const AUTO_CLASS = 0x0002_0000;
        /// Type has security declarations
        const HAS_SECURITY = 0x0004_0000;
        /// Type initializer may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// The 3-bit visibility value
    #[must_use]
    pub fn visibility(self) -> u32 {
        self.bits() & TYPE_VISIBILITY_MASK
    }

    /// Returns the flags with the visibility replaced by `visibility`
    #[must_use]
    pub fn with_visibility(self, visibility: TypeAttributes) -> Self {
        Self::from_bits_retain(
            (self.bits() & !TYPE_VISIBILITY_MASK) | (visibility.bits() & TYPE_VISIBILITY_MASK),
        )
    }

    /// Top-level public type
    #[must_use]
    pub fn is_public(self) -> bool {
        self.visibility() == Self::PUBLIC.bits()
    }

    /// Publicly visible nested type
    #[must_use]
    pub fn is_nested_public(self) -> bool {
        self.visibility() == Self::NESTED_PUBLIC.bits()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field definition flags
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
        /// Field is not serialized
        const NOT_SERIALIZED = 0x0080;
        /// Field has an RVA
        const HAS_FIELD_RVA = 0x0100;
        /// Field is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0400;
        /// Field has marshalling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Field has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

impl FieldAttributes {
    /// The 3-bit member access value
    #[must_use]
    pub fn access(self) -> u16 {
        self.bits() & MEMBER_ACCESS_MASK
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method definition flags
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Reserved: shall be zero for conforming implementations
        const UNMANAGED_EXPORT = 0x0008;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has security associate with it
        const HAS_SECURITY = 0x4000;
        /// Method calls another method containing security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodAttributes {
    /// The 3-bit member access value
    #[must_use]
    pub fn access(self) -> u16 {
        self.bits() & MEMBER_ACCESS_MASK
    }

    /// Returns the flags with the member access replaced by `access`
    #[must_use]
    pub fn with_access(self, access: MethodAttributes) -> Self {
        Self::from_bits_retain((self.bits() & !MEMBER_ACCESS_MASK) | (access.bits() & MEMBER_ACCESS_MASK))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Parameter flags
    pub struct ParamAttributes: u16 {
        /// Parameter is input
        const IN = 0x0001;
        /// Parameter is output
        const OUT = 0x0002;
        /// Parameter is optional
        const OPTIONAL = 0x0010;
        /// Parameter has a default value
        const HAS_DEFAULT = 0x1000;
        /// Parameter has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Property flags
    pub struct PropertyAttributes: u16 {
        /// Property is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0400;
        /// Property has a default value
        const HAS_DEFAULT = 0x1000;
    }
}
