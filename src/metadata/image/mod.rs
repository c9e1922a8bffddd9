//! Binary module images (`.cmi`).
//!
//! A module image is a compact, deterministic serialization of a [`CilModule`]. It is the
//! artifact exchanged between the synthesizer (which writes the facade module) and the weaver
//! (which reads target, facade and plugin modules).
//!
//! # Layout
//!
//! ```text
//! magic    "CILMIMG\0"
//! version  u16
//! mvid     16 bytes, the first 16 bytes of the SHA-1 of the body
//! body     the module
//! ```
//!
//! All integers are little-endian. Counts and lengths use the ECMA-335 compressed unsigned
//! integer encoding, strings are length-prefixed UTF-8. Type signatures reuse the
//! `ELEMENT_TYPE` tags, branch targets and handler boundaries are stored as instruction
//! indices.
//!
//! Encoding is a pure function of the module content, so `encode(decode(encode(m)))` is
//! byte-identical to `encode(m)`.

mod decoder;
mod encoder;

use sha1::{Digest, Sha1};

use crate::metadata::module::CilModule;

pub use decoder::decode;
pub use encoder::encode;

pub(crate) use decoder::{read_field_ref, read_method_ref};
pub(crate) use encoder::{write_field_ref, write_method_ref};

/// Image magic
pub const MAGIC: &[u8; 8] = b"CILMIMG\0";
/// Current image format version
pub const VERSION: u16 = 1;
/// Offset of the body, after magic, version and mvid
pub const HEADER_SIZE: usize = 8 + 2 + 16;

/// Derive the module version id from an encoded body.
#[must_use]
pub fn compute_mvid(body: &[u8]) -> uguid::Guid {
    let digest = Sha1::digest(body);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uguid::Guid::from_bytes(bytes)
}

/// Returns `true` if `data` starts with the image magic.
#[must_use]
pub fn is_image(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Convenience for tests and tools: the image of `module` decoded again.
///
/// # Errors
/// Returns the errors of [`encode`] and [`decode`].
pub fn round_trip(module: &CilModule) -> crate::Result<CilModule> {
    decode(&encode(module)?)
}
