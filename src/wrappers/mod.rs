//! Non-terminating pipeline stages. Each rewrites the descriptor for the
//! stages after it and wraps their invoker with a prologue and an epilogue.

mod by_ref;
mod delegate;
mod disposal;
mod lowering;

pub(crate) use by_ref::ByRefMarshallingWrapper;
pub(crate) use delegate::DelegateMarshallingWrapper;
pub(crate) use disposal::DisposalCallWrapper;
pub(crate) use lowering::{LoweringKind, LoweringWrapper};

use dlbind_core::{Error, Result, Value};

/// Moves argument `index` out of `args`, leaving `Void` behind.
pub(crate) fn take_arg(args: &mut [Value], index: usize, member: &str) -> Result<Value> {
    args.get_mut(index)
        .map(std::mem::take)
        .ok_or_else(|| Error::argument_mismatch(member, format!("missing argument {index}")))
}
