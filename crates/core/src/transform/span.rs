use crate::error::{Error, Result};
use crate::hints::{FreePolicy, MarshalHints};
use crate::layout;
use crate::scratch::Scratch;
use crate::types::TypeDesc;
use crate::value::Value;

use super::TypeTransformer;

/// Passes a sequence as a pointer to its first element.
///
/// A returned span is copied out of native memory; its length comes from the
/// `span_length` hint.
pub struct SpanTransformer {
    element: TypeDesc,
    stride: usize,
}

impl SpanTransformer {
    pub fn new(element: TypeDesc) -> Self {
        let stride = element.size().unwrap_or(0);
        SpanTransformer { element, stride }
    }
}

impl TypeTransformer for SpanTransformer {
    fn complex_type(&self) -> TypeDesc {
        TypeDesc::span(self.element.clone())
    }

    fn lowered_type(&self, _hints: &MarshalHints) -> TypeDesc {
        TypeDesc::Pointer
    }

    fn lower(&self, value: Value, _hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        let Value::Sequence(items) = value else {
            return Err(Error::argument_mismatch(
                &self.complex_type().to_string(),
                format!("expected sequence, found {}", value.kind()),
            ));
        };
        let base = scratch.alloc(self.stride * items.len());
        for (i, item) in items.iter().enumerate() {
            // SAFETY: the block holds `items.len()` elements.
            unsafe { layout::write(&self.element, item, base.add(i * self.stride))? };
        }
        Ok(Value::Pointer(base as usize))
    }

    fn raise(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value> {
        let Value::Pointer(ptr) = value else {
            return Err(Error::argument_mismatch(
                &self.complex_type().to_string(),
                format!("expected pointer, found {}", value.kind()),
            ));
        };
        let length = hints.span_length.ok_or_else(|| Error::MissingSpanLength {
            member: self.complex_type().to_string(),
        })?;
        if ptr == 0 {
            return Ok(Value::Sequence(Vec::new()));
        }
        if hints.free == FreePolicy::CallerFree {
            scratch.free_native(ptr);
        }
        let items = (0..length)
            .map(|i| {
                // SAFETY: native code returned `length` contiguous elements.
                unsafe { layout::read(&self.element, (ptr + i * self.stride) as *const u8) }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Sequence(items))
    }
}
