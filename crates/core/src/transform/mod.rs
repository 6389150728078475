//! Conversions between host-only types and their native representation.
//!
//! A transformer *lowers* a complex value (a string, an optional struct, a
//! span) to a raw value the native side understands, and *raises* a raw value
//! returned by native code back to the complex type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::hints::MarshalHints;
use crate::scratch::Scratch;
use crate::types::TypeDesc;
use crate::value::Value;

mod boolean;
mod nullable;
mod span;
mod string;

pub use boolean::BooleanTransformer;
pub use nullable::NullableTransformer;
pub use span::SpanTransformer;
pub use string::StringTransformer;

pub trait TypeTransformer: Send + Sync {
    /// The host type this transformer accepts.
    fn complex_type(&self) -> TypeDesc;

    /// The native type a lowered value has under `hints`.
    fn lowered_type(&self, hints: &MarshalHints) -> TypeDesc;

    fn lower(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value>;

    fn raise(&self, value: Value, hints: &MarshalHints, scratch: &mut Scratch) -> Result<Value>;
}

type ConvertFn = dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync;

/// A transformer built from a pair of conversion closures.
pub struct FnTransformer {
    complex: TypeDesc,
    primitive: TypeDesc,
    lower: Box<ConvertFn>,
    raise: Box<ConvertFn>,
}

impl FnTransformer {
    pub fn new(
        complex: TypeDesc,
        primitive: TypeDesc,
        lower: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
        raise: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        FnTransformer {
            complex,
            primitive,
            lower: Box::new(lower),
            raise: Box::new(raise),
        }
    }
}

impl TypeTransformer for FnTransformer {
    fn complex_type(&self) -> TypeDesc {
        self.complex.clone()
    }

    fn lowered_type(&self, _hints: &MarshalHints) -> TypeDesc {
        self.primitive.clone()
    }

    fn lower(&self, value: Value, _hints: &MarshalHints, _scratch: &mut Scratch) -> Result<Value> {
        Ok((self.lower)(value)?)
    }

    fn raise(&self, value: Value, _hints: &MarshalHints, _scratch: &mut Scratch) -> Result<Value> {
        Ok((self.raise)(value)?)
    }
}

/// Registry of type transformers, keyed by complex type.
///
/// Transformers for optional values and spans are created on first request
/// for each element type.
pub struct TypeTransformerRepository {
    transformers: RwLock<HashMap<TypeDesc, Arc<dyn TypeTransformer>>>,
}

impl Default for TypeTransformerRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTransformerRepository {
    pub fn new() -> Self {
        let mut map: HashMap<TypeDesc, Arc<dyn TypeTransformer>> = HashMap::new();
        map.insert(TypeDesc::Bool, Arc::new(BooleanTransformer));
        map.insert(TypeDesc::String, Arc::new(StringTransformer));
        TypeTransformerRepository {
            transformers: RwLock::new(map),
        }
    }

    /// The process-wide repository used by default configured builders.
    pub fn shared() -> Arc<TypeTransformerRepository> {
        static SHARED: Lazy<Arc<TypeTransformerRepository>> =
            Lazy::new(|| Arc::new(TypeTransformerRepository::new()));
        SHARED.clone()
    }

    /// Registers `transformer` for its complex type. The first registration
    /// for a type wins; returns whether this one was added.
    pub fn register(&self, transformer: Arc<dyn TypeTransformer>) -> Result<bool> {
        let ty = transformer.complex_type();
        if ty.is_raw() || ty.is_open() {
            return Err(Error::InvalidDescriptor(format!(
                "cannot register a transformer for `{ty}`"
            )));
        }
        let mut map = self.transformers.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&ty) {
            log::debug!("transformer for `{ty}` already registered");
            return Ok(false);
        }
        map.insert(ty, transformer);
        Ok(true)
    }

    /// Registers a transformer from a pair of conversion closures.
    pub fn register_fn(
        &self,
        complex: TypeDesc,
        primitive: TypeDesc,
        lower: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
        raise: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Result<bool> {
        self.register(Arc::new(FnTransformer::new(complex, primitive, lower, raise)))
    }

    pub fn get(&self, ty: &TypeDesc) -> Result<Arc<dyn TypeTransformer>> {
        if let Some(t) = self
            .transformers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ty)
        {
            return Ok(t.clone());
        }
        let created: Arc<dyn TypeTransformer> = match ty {
            TypeDesc::Optional(inner) if inner.is_blittable() => {
                Arc::new(NullableTransformer::new((**inner).clone()))
            }
            TypeDesc::Span(element) if element.is_blittable() => {
                Arc::new(SpanTransformer::new((**element).clone()))
            }
            _ => return Err(Error::TransformerNotFound { ty: ty.clone() }),
        };
        let mut map = self.transformers.write().unwrap_or_else(PoisonError::into_inner);
        Ok(map.entry(ty.clone()).or_insert(created).clone())
    }

    /// Whether values of `ty` must be lowered before reaching native code.
    pub fn requires_lowering(&self, ty: &TypeDesc) -> bool {
        !ty.is_raw() && self.get(ty).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructLayout;
    use crate::value::{CustomValue, StructValue};

    fn round_trip(repo: &TypeTransformerRepository, ty: &TypeDesc, hints: &MarshalHints, value: Value) {
        let t = repo.get(ty).unwrap();
        let mut scratch = Scratch::new();
        let lowered = t.lower(value.clone(), hints, &mut scratch).unwrap();
        assert!(lowered.matches(&t.lowered_type(hints)), "{lowered:?}");
        let raised = t.raise(lowered, hints, &mut scratch).unwrap();
        assert_eq!(raised, value);
    }

    #[test]
    fn strings_round_trip() {
        let repo = TypeTransformerRepository::new();
        for hints in [
            MarshalHints::default(),
            MarshalHints::string(crate::hints::StringEncoding::Utf16),
            MarshalHints::string(crate::hints::StringEncoding::Ansi),
        ] {
            round_trip(&repo, &TypeDesc::String, &hints, Value::String(None));
            round_trip(&repo, &TypeDesc::String, &hints, Value::from(""));
            round_trip(&repo, &TypeDesc::String, &hints, Value::from("héllo wörld"));
        }
    }

    #[test]
    fn optionals_round_trip() {
        let repo = TypeTransformerRepository::new();
        let layout = StructLayout::new("Pair", [("a", TypeDesc::I32), ("b", TypeDesc::F64)]).unwrap();
        let ty = TypeDesc::optional(TypeDesc::Struct(layout.clone()));
        let hints = MarshalHints::default();
        round_trip(&repo, &ty, &hints, Value::none());
        let pair = StructValue::new(&layout, [Value::I32(4), Value::F64(0.5)]).unwrap();
        round_trip(&repo, &ty, &hints, Value::some(pair));
        round_trip(&repo, &TypeDesc::optional(TypeDesc::I64), &hints, Value::some(9i64));
    }

    #[test]
    fn booleans_round_trip_through_every_width() {
        use crate::hints::BoolMarshal::*;
        let repo = TypeTransformerRepository::new();
        for marshal in [I1, I2, I4, I8, U1, U2, U4, U8, Bool, VariantBool] {
            let hints = MarshalHints::boolean(marshal);
            for b in [true, false] {
                round_trip(&repo, &TypeDesc::Bool, &hints, Value::Bool(b));
            }
        }
    }

    #[test]
    fn lookups() {
        let repo = TypeTransformerRepository::new();
        assert!(repo.requires_lowering(&TypeDesc::String));
        assert!(repo.requires_lowering(&TypeDesc::optional(TypeDesc::I32)));
        assert!(!repo.requires_lowering(&TypeDesc::I32));
        assert!(matches!(
            repo.get(&TypeDesc::custom("Handle")),
            Err(Error::TransformerNotFound { .. })
        ));
        assert!(repo.get(&TypeDesc::optional(TypeDesc::String)).is_err());
    }

    #[test]
    fn custom_registration_is_first_wins() {
        let repo = TypeTransformerRepository::new();
        let handle = TypeDesc::custom("Handle");
        let added = repo
            .register_fn(
                handle.clone(),
                TypeDesc::I64,
                |v| match v {
                    Value::Custom(c) => Ok(Value::I64(*c.downcast_ref::<i64>().unwrap_or(&0))),
                    other => anyhow::bail!("not a handle: {other:?}"),
                },
                |v| Ok(Value::Custom(CustomValue::new("Handle", i64::try_from(v)?))),
            )
            .unwrap();
        assert!(added);
        let again = repo
            .register_fn(handle.clone(), TypeDesc::I32, |v| Ok(v), |v| Ok(v))
            .unwrap();
        assert!(!again);

        let t = repo.get(&handle).unwrap();
        let hints = MarshalHints::default();
        assert_eq!(t.lowered_type(&hints), TypeDesc::I64);
        let mut scratch = Scratch::new();
        let lowered = t
            .lower(CustomValue::new("Handle", 77i64).into(), &hints, &mut scratch)
            .unwrap();
        assert_eq!(lowered, Value::I64(77));
        let raised = t.raise(lowered, &hints, &mut scratch).unwrap();
        match raised {
            Value::Custom(c) => assert_eq!(c.downcast_ref::<i64>(), Some(&77)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(t.lower(Value::I32(1), &hints, &mut scratch).is_err());
        assert!(repo.register_fn(TypeDesc::I32, TypeDesc::I64, |v| Ok(v), |v| Ok(v)).is_err());
    }
}
