use std::ffi::{c_char, CStr};

use crate::error::{Error, Result};
use crate::hints::{FreePolicy, MarshalHints};
use crate::scratch::Scratch;
use crate::types::TypeDesc;
use crate::value::Value;

use super::TypeTransformer;

/// Passes strings as NUL terminated pointers in the hinted encoding.
pub struct StringTransformer;

impl TypeTransformer for StringTransformer {
    fn complex_type(&self) -> TypeDesc {
        TypeDesc::String
    }

    fn lowered_type(&self, _hints: &MarshalHints) -> TypeDesc {
        TypeDesc::Pointer
    }

    fn lower(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        let s = match value {
            Value::String(None) => return Ok(Value::null()),
            Value::String(Some(s)) => s,
            other => {
                return Err(Error::argument_mismatch(
                    "string",
                    format!("expected string, found {}", other.kind()),
                ))
            }
        };
        if hints.string_encoding().is_wide() {
            let wide: Vec<u8> = s
                .encode_utf16()
                .chain(Some(0))
                .flat_map(u16::to_ne_bytes)
                .collect();
            return Ok(Value::Pointer(scratch.copy_bytes(&wide)));
        }
        if s.contains('\0') {
            return Err(Error::InvalidString(format!("{s:?} contains an interior NUL")));
        }
        let mut bytes = s.into_bytes();
        bytes.push(0);
        Ok(Value::Pointer(scratch.copy_bytes(&bytes)))
    }

    fn raise(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        let Value::Pointer(ptr) = value else {
            return Err(Error::argument_mismatch(
                "string",
                format!("expected pointer, found {}", value.kind()),
            ));
        };
        if ptr == 0 {
            return Ok(Value::String(None));
        }
        // SAFETY: native code returned a NUL terminated string in the
        // declared encoding.
        let s = unsafe {
            if hints.string_encoding().is_wide() {
                read_wide(ptr as *const u16)
            } else {
                CStr::from_ptr(ptr as *const c_char).to_string_lossy().into_owned()
            }
        };
        if hints.free == FreePolicy::CallerFree {
            scratch.free_native(ptr);
        }
        Ok(Value::String(Some(s)))
    }
}

unsafe fn read_wide(mut ptr: *const u16) -> String {
    let mut units = Vec::new();
    while *ptr != 0 {
        units.push(*ptr);
        ptr = ptr.add(1);
    }
    String::from_utf16_lossy(&units)
}
