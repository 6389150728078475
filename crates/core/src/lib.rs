//! Data model shared by the dlbind binding generator.
//!
//! This crate holds everything that doesn't cross the native boundary by
//! itself: interface and method descriptors, dynamic [`Value`]s, marshalling
//! hints, the [`TypeTransformerRepository`], the permutation generator for
//! optional by-reference parameters, and symbol naming.

mod descriptor;
mod error;
mod hints;
pub mod layout;
mod options;
pub mod permutation;
mod scratch;
pub mod symbols;
pub mod transform;
mod types;
mod value;

pub use descriptor::{
    InterfaceBuilder, InterfaceDescriptor, MethodDescriptor, NativeSymbols, ParameterDescriptor,
    PropertyDescriptor, ReturnDescriptor, SymbolTransformation, TypeIdentity, TypeKind,
};
pub use error::{BoxError, Error, Result};
pub use hints::{BoolMarshal, DelegateLifetime, FreePolicy, MarshalHints, StringEncoding};
pub use options::{GeneratorComplexity, ImplementationOptions};
pub use scratch::Scratch;
pub use symbols::{DefaultSymbolTransformer, SymbolNameTransformer};
pub use transform::{TypeTransformer, TypeTransformerRepository};
pub use types::{CallbackSignature, CallingConvention, StructField, StructLayout, TypeDesc};
pub use value::{Callback, CustomValue, RawInvoker, StructValue, Value, ValueRef};
