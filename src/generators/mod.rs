//! Terminating strategies, the permutation dispatcher and native property
//! accessors.

mod deferred;
mod indirect;
pub(crate) mod permutation;
pub(crate) mod property;
mod static_bound;

pub(crate) use deferred::DeferredGenericGenerator;
pub(crate) use indirect::IndirectCallGenerator;
pub(crate) use static_bound::{BoundFunction, StaticBindingGenerator};
