//! Binds described interfaces to native shared library entry points at run
//! time.
//!
//! An [`InterfaceDescriptor`] lists methods and global properties with their
//! types and marshalling hints. [`NativeLibraryBuilder`] resolves the library,
//! runs every method through the implementation pipeline and returns a
//! [`NativeLibrary`] whose members can be invoked with dynamic [`Value`]s.
//!
//! Each method becomes a chain of invokers:
//!
//! ```text
//!   invoke("Name", args)
//!     |
//!     v
//!   RefPermutation ---> one branch per presence combination
//!     |
//!   DelegateMarshalling, CustomTypeMarshalling, BooleanMarshalling,
//!   StringMarshalling, ValueNullableMarshalling, SpanMarshalling,
//!   ByRefMarshalling   (lower arguments, raise the return value)
//!     |
//!   DisposalCall
//!     |
//!     v
//!   DeferredGeneric | StaticBound | IndirectCall ---> libffi ---> native
//! ```
//!
//! Generated implementations are cached by base type, interfaces, library
//! path and options, so activating the same combination twice yields
//! instances of the same [`ImplementationTypeId`].

mod base;
mod builder;
mod cache;
mod call;
mod closure;
mod generators;
mod implementation;
mod library;
mod lifetime;
mod opts;
mod pipeline;
mod wrappers;

pub use base::{BaseType, BaseTypeBuilder, ManagedGetter, ManagedMethod, ManagedSetter};
pub use builder::{LibraryNameRemapper, NativeLibraryBuilder};
pub use cache::ImplementationCache;
pub use closure::ClosureCallback;
pub use implementation::{GeneratedImplementation, ImplementationKey, ImplementationTypeId};
pub use library::NativeLibrary;
pub use opts::Opts;

pub use dlbind_core::{
    permutation::MAX_OPTIONAL_REFERENCES, BoolMarshal, Callback, CallbackSignature,
    CallingConvention, CustomValue, DefaultSymbolTransformer, DelegateLifetime, Error, FreePolicy,
    GeneratorComplexity, ImplementationOptions, InterfaceBuilder, InterfaceDescriptor,
    MarshalHints, MethodDescriptor, NativeSymbols, ParameterDescriptor, PropertyDescriptor,
    Result, StringEncoding, StructLayout, StructValue, SymbolNameTransformer,
    SymbolTransformation, TypeDesc, TypeTransformer, TypeTransformerRepository, Value, ValueRef,
};
pub use dlbind_loader::{
    DefaultPlatformLoader, DynamicLibraryPathResolver, LibraryHandle, LibraryLoader,
    LibraryPathResolver, PlatformLoader, SymbolAddress, SymbolLoader,
};
