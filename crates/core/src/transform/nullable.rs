use crate::error::{Error, Result};
use crate::hints::{FreePolicy, MarshalHints};
use crate::layout;
use crate::scratch::Scratch;
use crate::types::TypeDesc;
use crate::value::Value;

use super::TypeTransformer;

/// Passes an optional value as a pointer that is null when absent.
pub struct NullableTransformer {
    inner: TypeDesc,
}

impl NullableTransformer {
    pub fn new(inner: TypeDesc) -> Self {
        NullableTransformer { inner }
    }
}

impl TypeTransformer for NullableTransformer {
    fn complex_type(&self) -> TypeDesc {
        TypeDesc::optional(self.inner.clone())
    }

    fn lowered_type(&self, _hints: &MarshalHints) -> TypeDesc {
        TypeDesc::Pointer
    }

    fn lower(&self, value: Value, _hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        match value {
            Value::Optional(None) => Ok(Value::null()),
            Value::Optional(Some(v)) => Ok(Value::Pointer(scratch.store(&self.inner, &v)?)),
            other => Err(Error::argument_mismatch(
                &self.complex_type().to_string(),
                format!("expected optional, found {}", other.kind()),
            )),
        }
    }

    fn raise(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        let Value::Pointer(ptr) = value else {
            return Err(Error::argument_mismatch(
                &self.complex_type().to_string(),
                format!("expected pointer, found {}", value.kind()),
            ));
        };
        if ptr == 0 {
            return Ok(Value::none());
        }
        if hints.free == FreePolicy::CallerFree {
            scratch.free_native(ptr);
        }
        // SAFETY: a non-null pointer refers to a value of the inner type.
        let inner = unsafe { layout::read(&self.inner, ptr as *const u8)? };
        Ok(Value::Optional(Some(Box::new(inner))))
    }
}
