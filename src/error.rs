use std::sync::Arc;

use thiserror::Error;

use crate::resolution::LinkageError;

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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Two families of failure exist. Errors raised while preparing a class (rewriting its bytecode
/// and assembling its resolution cache) are fatal for that class: the bytecode is restored to
/// its original form and no cache is installed. Errors raised while resolving a cache entry are
/// scoped to the single call site that triggered them.
///
/// # Error Categories
///
/// ## Preparation Errors
/// - [`Error::RewriteOverflow`] - A cache index does not fit the operand width
/// - [`Error::InvariantViolation`] - A structural rule of the instruction set was broken
/// - [`Error::AllocationFailure`] - The resolution cache could not be allocated
/// - [`Error::Malformed`] - Bytecode or constant pool shape is invalid
/// - [`Error::OutOfBounds`] - A read or write ran past the end of a buffer
///
/// ## Resolution Errors
/// - [`Error::Linkage`] - Symbolic resolution or a bootstrap method failed
/// - [`Error::LockError`] - The per-class critical section was poisoned
///
/// # Examples
///
/// ```rust
/// use classlink::{Error, prelude::*};
///
/// let mut pool = ConstantPoolBuilder::new();
/// let _ = pool.add_string("hello")?;
/// let mut class = LoadedClass::new("Demo", pool.build(), vec![]);
///
/// match rewrite(&mut class, &RewriterConfig::default()) {
///     Ok(()) => println!("prepared {}", class.name()),
///     Err(Error::RewriteOverflow(message)) => eprintln!("too many entries: {}", message),
///     Err(e) => eprintln!("preparation failed: {}", e),
/// }
/// # Ok::<(), classlink::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode or constant pool is damaged and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading or patching a code buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A resolution-cache index does not fit into the operand that must carry it.
    ///
    /// Table rows are addressed with two-byte operands and `ldc` carries a single byte.
    /// A class whose constant pool or call sites need more rows than the operand width allows
    /// cannot be prepared. Its bytecode is restored before this error is returned.
    #[error("Rewrite overflow - {0}")]
    RewriteOverflow(String),

    /// The class violates a structural rule of the instruction set.
    ///
    /// Raised for stores into the receiver slot of the root class constructor and for
    /// resolver results that contradict the instruction they were requested for.
    #[error("Invariant violation - {0}")]
    InvariantViolation(String),

    /// The final resolution-cache arrays could not be allocated.
    ///
    /// The half-built cache is dropped and the bytecode is restored.
    #[error("Allocation failure - {0}")]
    AllocationFailure(String),

    /// Symbolic resolution of a cache entry failed.
    ///
    /// The error is shared through an [`Arc`], so every thread that observes a cached failure
    /// of the same call site receives the identical error instance.
    #[error("{0}")]
    Linkage(Arc<LinkageError>),

    /// Failed to lock the per-class critical section.
    ///
    /// Only happens when a thread panicked while holding it.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns the linkage error carried by this error, if any.
    #[must_use]
    pub fn as_linkage(&self) -> Option<&Arc<LinkageError>> {
        match self {
            Error::Linkage(error) => Some(error),
            _ => None,
        }
    }
}

impl From<LinkageError> for Error {
    fn from(error: LinkageError) -> Self {
        Error::Linkage(Arc::new(error))
    }
}
