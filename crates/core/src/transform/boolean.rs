use crate::error::{Error, Result};
use crate::hints::MarshalHints;
use crate::scratch::Scratch;
use crate::types::TypeDesc;
use crate::value::Value;

use super::TypeTransformer;

/// Carries a `bool` in an integer of the width selected by the hints.
///
/// Lowering writes the `(true, false)` literal pair of the declared encoding.
/// Raising treats any value other than the false literal as `true`.
pub struct BooleanTransformer;

impl TypeTransformer for BooleanTransformer {
    fn complex_type(&self) -> TypeDesc {
        TypeDesc::Bool
    }

    fn lowered_type(&self, hints: &MarshalHints) -> TypeDesc {
        hints.bool_marshal().carrier()
    }

    fn lower(&self, value: Value, hints: &MarshalHints, _scratch: &mut Scratch) -> Result<Value> {
        let Value::Bool(b) = value else {
            return Err(Error::argument_mismatch(
                "bool",
                format!("expected bool, found {}", value.kind()),
            ));
        };
        let marshal = hints.bool_marshal();
        let (t, f) = marshal.literals();
        let carrier = marshal.carrier();
        Value::from_i64(&carrier, if b { t } else { f })
            .ok_or_else(|| Error::InvalidDescriptor(format!("`{carrier}` cannot carry a bool")))
    }

    fn raise(&self, value: Value, hints: &MarshalHints, _scratch: &mut Scratch) -> Result<Value> {
        let (_, f) = hints.bool_marshal().literals();
        match value.as_i64() {
            Some(v) => Ok(Value::Bool(v != f)),
            None => Err(Error::argument_mismatch(
                "bool",
                format!("expected an integer, found {}", value.kind()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::BoolMarshal;

    #[test]
    fn literal_pairs() {
        let mut scratch = Scratch::new();
        let variant = MarshalHints::boolean(BoolMarshal::VariantBool);
        let lowered = BooleanTransformer.lower(Value::Bool(true), &variant, &mut scratch).unwrap();
        assert_eq!(lowered, Value::I16(-1));
        let lowered = BooleanTransformer
            .lower(Value::Bool(true), &MarshalHints::default(), &mut scratch)
            .unwrap();
        assert_eq!(lowered, Value::U8(1));
        let lowered = BooleanTransformer
            .lower(Value::Bool(false), &MarshalHints::boolean(BoolMarshal::I8), &mut scratch)
            .unwrap();
        assert_eq!(lowered, Value::I64(0));
    }

    #[test]
    fn raising_accepts_any_nonzero() {
        let mut scratch = Scratch::new();
        let hints = MarshalHints::boolean(BoolMarshal::Bool);
        let raised = BooleanTransformer.raise(Value::I32(2), &hints, &mut scratch).unwrap();
        assert_eq!(raised, Value::Bool(true));
        let raised = BooleanTransformer.raise(Value::I32(0), &hints, &mut scratch).unwrap();
        assert_eq!(raised, Value::Bool(false));
        assert!(BooleanTransformer.raise(Value::F32(1.0), &hints, &mut scratch).is_err());
    }
}
