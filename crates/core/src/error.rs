//! Error types shared by every dlbind crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::TypeDesc;

/// Boxed source error carried by resolution failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using the dlbind [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while generating, activating or invoking a binding.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors, surfaced while generating an implementation.
    /// A type reached a terminating generator without a native representation
    #[error("`{member}` uses `{ty}`, which has no transformer and no native representation")]
    UnsupportedType { member: String, ty: TypeDesc },

    /// No pipeline stage claimed a work unit
    #[error("no implementation generator is applicable to `{member}`")]
    NoApplicableGenerator { member: String },

    /// A property with one managed and one abstract accessor
    #[error("property `{name}` has a managed override for only one of its accessors; properties may not be partially managed")]
    PartiallyManagedProperty { name: String },

    /// The permutation dispatcher computed an index outside its jump table
    #[error("no method permutation known for index {index} of `{member}` ({count} permutations)")]
    PermutationIndex { member: String, index: usize, count: usize },

    /// Too many optional by-reference parameters to enumerate
    #[error("`{member}` has {count} optional by-reference parameters; at most {max} are supported")]
    TooManyOptionalReferences { member: String, count: usize, max: usize },

    /// More than one symbol mangler applies to the same member
    #[error("more than one name mangler is applicable to `{member}`")]
    AmbiguousMangler { member: String },

    /// No transformer registered for a complex type
    #[error("the type `{ty}` doesn't have a compatible type transformer")]
    TransformerNotFound { ty: TypeDesc },

    /// A span was used without a declared length
    #[error("`{member}` returns a span but does not declare its length")]
    MissingSpanLength { member: String },

    /// The descriptor itself is malformed
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    // Resolution errors.
    /// The library name could not be resolved to a file
    #[error("the specified library ({library}) was not found in any of the loader search paths")]
    LibraryNotFound { library: String, searched: Vec<PathBuf> },

    /// The platform loader refused to open the library
    #[error("failed to load library `{}`", path.display())]
    LibraryLoading {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// A symbol could not be found in an opened library
    #[error("failed to load symbol `{symbol}`")]
    SymbolLoading {
        symbol: String,
        #[source]
        source: BoxError,
    },

    // Runtime contract errors.
    /// The instance has been disposed
    #[error("the library `{type_name}` has been disposed")]
    Disposed { type_name: String },

    /// An invocation supplied arguments that don't match the descriptor
    #[error("argument mismatch calling `{member}`: {message}")]
    ArgumentMismatch { member: String, message: String },

    /// The named member doesn't exist on the activated implementation
    #[error("`{type_name}` has no member named `{member}`")]
    UnknownMember { type_name: String, member: String },

    /// A string couldn't cross the native boundary
    #[error("string cannot be marshalled: {0}")]
    InvalidString(String),

    // Type system errors.
    /// A type requested as an interface isn't one
    #[error("`{name}` is not an interface")]
    NotAnInterface { name: String },

    /// The base type of an activated class must be abstract
    #[error("the class to activate (`{name}`) must be abstract")]
    BaseNotAbstract { name: String },

    /// Activation without interface types
    #[error("at least one interface type must be provided")]
    NoInterfaces,

    /// Error raised by user supplied conversion or managed code
    #[error(transparent)]
    Transform(#[from] anyhow::Error),
}

impl Error {
    pub fn argument_mismatch(member: &str, message: impl Into<String>) -> Self {
        Error::ArgumentMismatch {
            member: member.to_string(),
            message: message.into(),
        }
    }

    /// True for library and symbol resolution failures.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::LibraryNotFound { .. } | Error::LibraryLoading { .. } | Error::SymbolLoading { .. }
        )
    }
}
