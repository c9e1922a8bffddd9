//! The singleton registry.
//!
//! A fixed set of target types expose their single global instance through a conventional
//! static accessor. The synthesizer gives each of them a `<Name>R` property on the `Singletons`
//! facade type; the weaver replaces calls to that property with the real accessor.

use std::fmt;

/// How the global instance of a singleton type is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingletonAccess {
    /// `call` of a static getter method
    Getter(&'static str),
    /// `ldsfld` of a static field
    Field(&'static str),
}

impl fmt::Display for SingletonAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingletonAccess::Getter(name) => write!(f, "call {name}()"),
            SingletonAccess::Field(name) => write!(f, "ldsfld {name}"),
        }
    }
}

/// One singleton type and its accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Singleton {
    /// Full name of the target type
    pub type_name: &'static str,
    /// Instance accessor of that type
    pub access: SingletonAccess,
}

impl Singleton {
    const fn getter(type_name: &'static str) -> Self {
        Singleton {
            type_name,
            access: SingletonAccess::Getter("get_instance"),
        }
    }

    const fn field(type_name: &'static str, field: &'static str) -> Self {
        Singleton {
            type_name,
            access: SingletonAccess::Field(field),
        }
    }
}

/// Every singleton type known to the synthesizer and the weaver.
pub const SINGLETONS: &[Singleton] = &[
    Singleton::getter("GameCameras"),
    Singleton::getter("GameManager"),
    Singleton::getter("HeroController"),
    Singleton::field("InputHandler", "Instance"),
    Singleton::getter("ObjectPool"),
    Singleton::getter("PlayerData"),
    Singleton::getter("SceneData"),
    Singleton::getter("UIManager"),
];

/// Registry entry for the target type `type_name`.
#[must_use]
pub fn find(type_name: &str) -> Option<&'static Singleton> {
    SINGLETONS.iter().find(|singleton| singleton.type_name == type_name)
}

/// Name of the `Singletons` property generated for the facade type `facade_name`.
#[must_use]
pub fn property_name(facade_name: &str) -> String {
    format!("{facade_name}R")
}
