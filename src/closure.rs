//! Native entry points that call back into Rust closures.

use std::ffi::c_void;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use dlbind_core::{layout, Callback, CallbackSignature, Error, Result, TypeDesc, Value};
use libffi::low::ffi_cif;
use libffi::middle::Closure;

use crate::call::CallInterface;

type ClosureFn = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

/// Builds [`Callback`]s whose code pointer runs a Rust closure.
pub trait ClosureCallback: Sized {
    /// A callback native code can call with `signature`. The trampoline and
    /// `f` live as long as the callback, so the lifetime hint of the
    /// parameter it is passed to decides how long native code may keep it.
    fn from_closure<F>(signature: &CallbackSignature, f: F) -> Result<Self>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static;
}

impl ClosureCallback for Callback {
    fn from_closure<F>(signature: &CallbackSignature, f: F) -> Result<Callback>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let native = NativeClosure::new(signature, Box::new(f))?;
        Ok(Callback::with_state(native.code(), native))
    }
}

struct Target {
    signature: CallInterface,
    function: Box<ClosureFn>,
}

impl Target {
    /// # Safety
    ///
    /// `args` holds one pointer per parameter and `result` is large enough
    /// for the return type widened to a register.
    unsafe fn dispatch(&self, result: *mut u8, args: *const *const c_void) {
        // SAFETY: forwarded from the caller.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { self.call(result, args) }));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "closure panicked".to_string(),
        };
        log::error!("callback for `{}` failed: {failure}", self.signature.member());
        std::ptr::write_bytes(result, 0, return_size(self.signature.ret()));
    }

    unsafe fn call(&self, result: *mut u8, args: *const *const c_void) -> anyhow::Result<()> {
        let values = self
            .signature
            .params()
            .iter()
            .enumerate()
            .map(|(i, ty)| layout::read(ty, (*args.add(i)).cast::<u8>()))
            .collect::<Result<Vec<_>>>()?;
        let value = (self.function)(&values)?;
        let ret = self.signature.ret();
        if !value.matches(ret) && !(*ret == TypeDesc::Void && value == Value::Void) {
            return Err(Error::argument_mismatch(
                self.signature.member(),
                format!("closure returned {} for `{ret}`", value.kind()),
            )
            .into());
        }
        match ret {
            TypeDesc::Void => {}
            ty if ty.is_integer() && ty.size() < Some(mem::size_of::<usize>()) => {
                // libffi expects small integral returns widened to a register.
                let widened = value.as_i64().unwrap_or_default() as usize;
                result.cast::<usize>().write_unaligned(widened);
            }
            ty => layout::write(ty, &value, result)?,
        }
        Ok(())
    }
}

unsafe extern "C" fn trampoline(_cif: &ffi_cif, result: &mut u64, args: *const *const c_void, target: &Target) {
    target.dispatch((result as *mut u64).cast::<u8>(), args);
}

fn return_size(ret: &TypeDesc) -> usize {
    match ret {
        TypeDesc::Void => 0,
        ty if ty.is_integer() => ty.size().unwrap_or(0).max(mem::size_of::<usize>()),
        ty => ty.size().unwrap_or(0),
    }
}

/// A libffi closure together with the closure it calls.
struct NativeClosure {
    // Declared before `target` so it is freed first.
    closure: Closure<'static>,
    _target: Box<Target>,
}

// SAFETY: the closure is immutable once prepared, and the target only holds
// `Send + Sync` data.
unsafe impl Send for NativeClosure {}
unsafe impl Sync for NativeClosure {}

impl NativeClosure {
    fn new(signature: &CallbackSignature, function: Box<ClosureFn>) -> Result<NativeClosure> {
        let interface = CallInterface::new("closure", &signature.params, &signature.ret)?;
        let cif = interface.cif().clone();
        let target = Box::new(Target {
            signature: interface,
            function,
        });
        // SAFETY: the box is never moved out of and outlives `closure`.
        let userdata: &'static Target = unsafe { &*(target.as_ref() as *const Target) };
        let closure = Closure::new(cif, trampoline, userdata);
        Ok(NativeClosure {
            closure,
            _target: target,
        })
    }

    fn code(&self) -> usize {
        *self.closure.code_ptr() as usize
    }
}
