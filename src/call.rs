//! The libffi trampoline every terminating strategy calls through.

use std::ffi::c_void;
use std::mem;

use dlbind_core::{layout, Error, MethodDescriptor, RawInvoker, Result, TypeDesc, Value};
use libffi::middle::{Cif, Type};
use libffi::raw;

fn ffi_type(ty: &TypeDesc) -> Option<Type> {
    Some(match ty {
        TypeDesc::Bool | TypeDesc::U8 => Type::u8(),
        TypeDesc::I8 => Type::i8(),
        TypeDesc::I16 => Type::i16(),
        TypeDesc::U16 => Type::u16(),
        TypeDesc::I32 => Type::i32(),
        TypeDesc::U32 => Type::u32(),
        TypeDesc::I64 => Type::i64(),
        TypeDesc::U64 => Type::u64(),
        TypeDesc::F32 => Type::f32(),
        TypeDesc::F64 => Type::f64(),
        TypeDesc::ISize => Type::isize(),
        TypeDesc::USize => Type::usize(),
        TypeDesc::Pointer => Type::pointer(),
        TypeDesc::Struct(layout) => Type::structure(
            layout
                .fields()
                .iter()
                .map(|f| ffi_type(&f.ty))
                .collect::<Option<Vec<_>>>()?,
        ),
        _ => return None,
    })
}

fn words(size: usize) -> Box<[u64]> {
    vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice()
}

fn bytes_mut(words: &mut [u64]) -> &mut [u8] {
    // SAFETY: any byte pattern is a valid u64 and vice versa.
    unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), mem::size_of_val(words)) }
}

fn bytes(words: &[u64]) -> &[u8] {
    // SAFETY: see `bytes_mut`.
    unsafe { std::slice::from_raw_parts(words.as_ptr().cast::<u8>(), mem::size_of_val(words)) }
}

/// A prepared call signature over raw types.
pub(crate) struct CallInterface {
    cif: Cif,
    member: String,
    params: Vec<TypeDesc>,
    ret: TypeDesc,
}

// SAFETY: the cif is never modified after `Cif::new`, and `ffi_call` only
// reads it.
unsafe impl Send for CallInterface {}
unsafe impl Sync for CallInterface {}

impl CallInterface {
    pub fn new(member: &str, params: &[TypeDesc], ret: &TypeDesc) -> Result<CallInterface> {
        let unsupported = |ty: &TypeDesc| Error::UnsupportedType {
            member: member.to_string(),
            ty: ty.clone(),
        };
        let mut arg_types = Vec::with_capacity(params.len());
        for ty in params {
            if !ty.is_raw() || *ty == TypeDesc::Void {
                return Err(unsupported(ty));
            }
            arg_types.push(ffi_type(ty).ok_or_else(|| unsupported(ty))?);
        }
        let ret_type = match ret {
            TypeDesc::Void => Type::void(),
            ty if ty.is_raw() => ffi_type(ty).ok_or_else(|| unsupported(ty))?,
            ty => return Err(unsupported(ty)),
        };
        Ok(CallInterface {
            cif: Cif::new(arg_types.into_iter(), ret_type),
            member: member.to_string(),
            params: params.to_vec(),
            ret: ret.clone(),
        })
    }

    /// Signature of a fully lowered method. By-reference parameters must
    /// already have been turned into pointers.
    pub fn for_method(method: &MethodDescriptor) -> Result<CallInterface> {
        if let Some(p) = method.params.iter().find(|p| p.by_ref) {
            return Err(Error::UnsupportedType {
                member: method.name.clone(),
                ty: p.ty.clone(),
            });
        }
        let params: Vec<TypeDesc> = method.params.iter().map(|p| p.ty.clone()).collect();
        CallInterface::new(&method.name, &params, &method.ret.ty)
    }

    pub fn cif(&self) -> &Cif {
        &self.cif
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn ret(&self) -> &TypeDesc {
        &self.ret
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// Calls `code` with `args`.
    ///
    /// # Safety
    ///
    /// `code` must be a function with exactly this signature.
    pub unsafe fn invoke_raw(&self, code: usize, args: &[Value]) -> Result<Value> {
        if args.len() != self.params.len() {
            return Err(Error::argument_mismatch(
                &self.member,
                format!("expected {} native arguments, found {}", self.params.len(), args.len()),
            ));
        }
        if code == 0 {
            return Err(Error::argument_mismatch(&self.member, "null function pointer"));
        }
        let mut storage = Vec::with_capacity(args.len());
        for (ty, value) in self.params.iter().zip(args) {
            let mut slot = words(ty.size().unwrap_or(0));
            layout::encode(ty, value, bytes_mut(&mut slot))?;
            storage.push(slot);
        }
        let mut arg_ptrs: Vec<*mut c_void> = storage
            .iter_mut()
            .map(|slot| slot.as_mut_ptr().cast::<c_void>())
            .collect();
        // libffi widens small integral returns to a full register.
        let mut ret = words(self.ret.size().unwrap_or(0).max(mem::size_of::<u64>()));
        let function = mem::transmute::<usize, unsafe extern "C" fn()>(code);
        raw::ffi_call(
            self.cif.as_raw_ptr(),
            Some(function),
            ret.as_mut_ptr().cast::<c_void>(),
            arg_ptrs.as_mut_ptr(),
        );
        self.read_return(&ret)
    }

    fn read_return(&self, ret: &[u64]) -> Result<Value> {
        match &self.ret {
            TypeDesc::Void => Ok(Value::Void),
            ty if ty.is_integer() && ty.size() < Some(mem::size_of::<usize>()) => {
                let mut register = [0u8; mem::size_of::<usize>()];
                register.copy_from_slice(&bytes(ret)[..mem::size_of::<usize>()]);
                let widened = usize::from_ne_bytes(register) as i64;
                Value::from_i64(ty, widened).ok_or_else(|| Error::UnsupportedType {
                    member: self.member.clone(),
                    ty: ty.clone(),
                })
            }
            ty => layout::decode(ty, bytes(ret)),
        }
    }
}

impl RawInvoker for CallInterface {
    fn call(&self, code: usize, args: &[Value]) -> Result<Value> {
        // SAFETY: callbacks are bound to the signature native code declared
        // for them.
        unsafe { self.invoke_raw(code, args) }
    }
}
