//! Module image file access.
//!
//! [`crate::file::File`] memory-maps a `.cmi` module image from disk so that the decoder in
//! [`crate::metadata::image`] can parse it without copying the file into memory first. The
//! low-level primitives used by the decoder and encoder live in the submodules:
//!
//! - [`crate::file::parser::Parser`] - bounds-checked cursor used for decoding
//! - [`crate::file::writer::ByteWriter`] - append-only sink used for encoding
//! - [`crate::file::io`] - little-endian primitive conversions shared by both

pub mod io;
pub mod parser;
pub mod writer;

use memmap2::Mmap;
use std::{fs, path::Path};

use crate::{
    Error::{Empty, Error, FileError},
    Result,
};

/// A read-only, memory-mapped module image.
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::File;
/// use std::path::Path;
///
/// let file = File::from_file(Path::new("Assembly-CSharp.cmi"))?;
/// println!("Image has {} bytes", file.len());
/// # Ok::<(), cilfacade::Error>(())
/// ```
#[derive(Debug)]
pub struct File {
    /// Memory-mapped file data
    data: Mmap,
}

impl File {
    /// Memory-map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] for zero-length files and [`crate::Error::Error`]
    /// if memory mapping fails.
    pub fn from_file(path: &Path) -> Result<File> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        if file.metadata()?.len() == 0 {
            return Err(Empty);
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(File { data: mmap })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Length of the mapped file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
