use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// Builds an [`crate::Error::FacadeUsage`] naming the offending member.
macro_rules! usage_error {
    ($symbol:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::FacadeUsage {
            symbol: $symbol.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// Builds an [`crate::Error::Invariant`] naming the symbol whose lookup broke.
macro_rules! invariant_error {
    ($symbol:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Invariant {
            symbol: $symbol.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Image Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid module image / symbol map
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the data
/// - [`Error::NotSupported`] - Unknown image magic or version
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Weaving Errors
/// - [`Error::FacadeUsage`] - The module under rewrite used a facade type where it cannot be patched
/// - [`Error::Invariant`] - The facade module and the target program disagree
/// - [`Error::TypeNotFound`] - A type could not be found in the module it was expected in
///
/// # Examples
///
/// ```rust,no_run
/// use cilfacade::{Error, metadata::CilModule};
/// use std::path::Path;
///
/// match CilModule::from_file(Path::new("Assembly-CSharp.cmi")) {
///     Ok(module) => println!("{} types", module.types.len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed image: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input is not a module image this library understands.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// The module under rewrite uses a facade type in a place that cannot be patched.
    ///
    /// Raised for facade types in field types, method signatures, generic constraints and
    /// type operands (`typeof`, `castclass`, ...). These are mistakes of the module's author;
    /// the original program type has to be used instead.
    #[error("{symbol}: {message}")]
    FacadeUsage {
        /// Fully qualified name of the offending member
        symbol: String,
        /// Which rule was violated
        message: String,
    },

    /// The facade module and the target program do not agree.
    ///
    /// Missing symbol map entries, unknown singleton types and impossible opcodes on the
    /// visibility-gated type end up here. These indicate a stale or foreign facade module.
    #[error("{symbol}: {message}")]
    Invariant {
        /// The symbol whose resolution failed
        symbol: String,
        /// What was expected
        message: String,
    },

    /// A type could not be found by its full name.
    #[error("Failed to find type - {0}")]
    TypeNotFound(String),

    /// Failed to lock target.
    #[error("Failed to lock target - {0}")]
    LockError(String),
}
