use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::types::{StructLayout, TypeDesc};

/// A dynamically typed value flowing through an invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    ISize(isize),
    USize(usize),
    /// Address of native memory or code. Zero is null.
    Pointer(usize),
    /// `None` is the null string.
    String(Option<String>),
    Struct(StructValue),
    Optional(Option<Box<Value>>),
    Sequence(Vec<Value>),
    /// A by-reference argument. Native writes are stored back into the cell.
    Ref(ValueRef),
    Callback(Option<Callback>),
    Custom(CustomValue),
}

impl Value {
    pub fn null() -> Self {
        Value::Pointer(0)
    }

    pub fn some(value: impl Into<Value>) -> Self {
        Value::Optional(Some(Box::new(value.into())))
    }

    pub fn none() -> Self {
        Value::Optional(None)
    }

    pub fn by_ref(value: impl Into<Value>) -> Self {
        Value::Ref(ValueRef::new(value.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::ISize(_) => "isize",
            Value::USize(_) => "usize",
            Value::Pointer(_) => "pointer",
            Value::String(_) => "string",
            Value::Struct(_) => "struct",
            Value::Optional(_) => "optional",
            Value::Sequence(_) => "sequence",
            Value::Ref(_) => "reference",
            Value::Callback(_) => "callback",
            Value::Custom(_) => "custom",
        }
    }

    /// Whether this value can be passed where `ty` is expected by value.
    pub fn matches(&self, ty: &TypeDesc) -> bool {
        match (self, ty) {
            (Value::Void, TypeDesc::Void)
            | (Value::Bool(_), TypeDesc::Bool)
            | (Value::I8(_), TypeDesc::I8)
            | (Value::U8(_), TypeDesc::U8)
            | (Value::I16(_), TypeDesc::I16)
            | (Value::U16(_), TypeDesc::U16)
            | (Value::I32(_), TypeDesc::I32)
            | (Value::U32(_), TypeDesc::U32)
            | (Value::I64(_), TypeDesc::I64)
            | (Value::U64(_), TypeDesc::U64)
            | (Value::F32(_), TypeDesc::F32)
            | (Value::F64(_), TypeDesc::F64)
            | (Value::ISize(_), TypeDesc::ISize)
            | (Value::USize(_), TypeDesc::USize)
            | (Value::Pointer(_), TypeDesc::Pointer)
            | (Value::String(_), TypeDesc::String)
            | (Value::Callback(_), TypeDesc::Callback(_)) => true,
            (Value::Struct(s), TypeDesc::Struct(layout)) => *s.layout == **layout,
            (Value::Optional(None), TypeDesc::Optional(_)) => true,
            (Value::Optional(Some(v)), TypeDesc::Optional(inner)) => v.matches(inner),
            (Value::Sequence(items), TypeDesc::Span(element)) => items.iter().all(|v| v.matches(element)),
            (Value::Custom(c), TypeDesc::Custom(name)) => c.type_name() == name,
            _ => false,
        }
    }

    /// Widens any integer value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::I8(v) => v.into(),
            Value::U8(v) => v.into(),
            Value::I16(v) => v.into(),
            Value::U16(v) => v.into(),
            Value::I32(v) => v.into(),
            Value::U32(v) => v.into(),
            Value::I64(v) => v,
            Value::U64(v) => v as i64,
            Value::ISize(v) => v as i64,
            Value::USize(v) => v as i64,
            _ => return None,
        })
    }

    /// Builds an integer value of type `ty`, truncating `v`.
    pub fn from_i64(ty: &TypeDesc, v: i64) -> Option<Value> {
        Some(match ty {
            TypeDesc::I8 => Value::I8(v as i8),
            TypeDesc::U8 => Value::U8(v as u8),
            TypeDesc::I16 => Value::I16(v as i16),
            TypeDesc::U16 => Value::U16(v as u16),
            TypeDesc::I32 => Value::I32(v as i32),
            TypeDesc::U32 => Value::U32(v as u32),
            TypeDesc::I64 => Value::I64(v),
            TypeDesc::U64 => Value::U64(v as u64),
            TypeDesc::ISize => Value::ISize(v as isize),
            TypeDesc::USize => Value::USize(v as usize),
            _ => return None,
        })
    }

    pub fn as_pointer(&self) -> Option<usize> {
        match *self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident,)*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$variant(v)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(v: Value) -> Result<$ty> {
                match v {
                    Value::$variant(v) => Ok(v),
                    other => Err(Error::argument_mismatch(
                        stringify!($ty),
                        format!("expected {}, found {}", stringify!($ty), other.kind()),
                    )),
                }
            }
        }
    )*};
}

value_conversions! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    isize => ISize,
    usize => USize,
    StructValue => Struct,
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(Some(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(Some(s))
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Value {
        Value::String(s)
    }
}

impl From<Callback> for Value {
    fn from(c: Callback) -> Value {
        Value::Callback(Some(c))
    }
}

impl TryFrom<Value> for Option<String> {
    type Error = Error;

    fn try_from(v: Value) -> Result<Option<String>> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(Error::argument_mismatch(
                "string",
                format!("expected string, found {}", other.kind()),
            )),
        }
    }
}

/// An instance of a [`StructLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    layout: Arc<StructLayout>,
    fields: Vec<Value>,
}

impl StructValue {
    pub fn new(layout: &Arc<StructLayout>, fields: impl IntoIterator<Item = Value>) -> Result<Self> {
        let fields: Vec<Value> = fields.into_iter().collect();
        if fields.len() != layout.fields().len() {
            return Err(Error::argument_mismatch(
                &layout.name,
                format!("expected {} fields, found {}", layout.fields().len(), fields.len()),
            ));
        }
        for (field, value) in layout.fields().iter().zip(&fields) {
            if !value.matches(&field.ty) {
                return Err(Error::argument_mismatch(
                    &layout.name,
                    format!("field `{}` expects {}, found {}", field.name, field.ty, value.kind()),
                ));
            }
        }
        Ok(StructValue {
            layout: layout.clone(),
            fields,
        })
    }

    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        let idx = self.layout.fields().iter().position(|f| f.name == name)?;
        self.fields.get(idx)
    }
}

/// Shared cell behind a by-reference argument.
#[derive(Debug, Clone, Default)]
pub struct ValueRef(Arc<Mutex<Value>>);

impl ValueRef {
    pub fn new(value: Value) -> Self {
        ValueRef(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl PartialEq for ValueRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.get() == other.get()
    }
}

/// Calls native code through a prepared signature.
pub trait RawInvoker: Send + Sync {
    fn call(&self, code: usize, args: &[Value]) -> Result<Value>;
}

struct CallbackInner {
    code: usize,
    state: Option<Box<dyn Any + Send + Sync>>,
    invoker: Option<Arc<dyn RawInvoker>>,
}

/// A native-callable function pointer together with the state it needs.
#[derive(Clone)]
pub struct Callback(Arc<CallbackInner>);

impl Callback {
    /// Wraps the address of an `extern "C"` function.
    pub fn from_address(code: usize) -> Self {
        Callback(Arc::new(CallbackInner {
            code,
            state: None,
            invoker: None,
        }))
    }

    /// Like `from_address`, but also owns `state`, which lives as long as
    /// the callback is retained.
    pub fn with_state(code: usize, state: impl Any + Send + Sync) -> Self {
        Callback(Arc::new(CallbackInner {
            code,
            state: Some(Box::new(state)),
            invoker: None,
        }))
    }

    /// A function pointer returned by native code, callable through `invoker`.
    pub fn bound(code: usize, invoker: Arc<dyn RawInvoker>) -> Self {
        Callback(Arc::new(CallbackInner {
            code,
            state: None,
            invoker: Some(invoker),
        }))
    }

    pub fn code(&self) -> usize {
        self.0.code
    }

    pub fn state<T: Any>(&self) -> Option<&T> {
        self.0.state.as_ref()?.downcast_ref()
    }

    /// Calls a callback that came back from native code.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match &self.0.invoker {
            Some(invoker) => invoker.call(self.0.code, args),
            None => Err(Error::InvalidDescriptor(
                "callback has no bound signature".to_string(),
            )),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.0.code == other.0.code
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("code", &format_args!("{:#x}", self.0.code))
            .field("stateful", &self.0.state.is_some())
            .finish()
    }
}

/// A value of a user type handled by a registered transformer.
#[derive(Clone)]
pub struct CustomValue {
    type_name: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new(type_name: impl Into<String>, payload: impl Any + Send + Sync) -> Self {
        CustomValue {
            type_name: type_name.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomValue").field(&self.type_name).finish()
    }
}

impl From<CustomValue> for Value {
    fn from(c: CustomValue) -> Value {
        Value::Custom(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(7i32), Value::I32(7));
        assert_eq!(i32::try_from(Value::I32(7)).unwrap(), 7);
        assert!(i32::try_from(Value::U32(7)).is_err());
        let s: Option<String> = Value::from("hi").try_into().unwrap();
        assert_eq!(s.as_deref(), Some("hi"));
    }

    #[test]
    fn matching() {
        let point = StructLayout::new("Point", [("x", TypeDesc::I32), ("y", TypeDesc::I32)]).unwrap();
        let v = StructValue::new(&point, [Value::I32(1), Value::I32(2)]).unwrap();
        assert!(Value::Struct(v.clone()).matches(&TypeDesc::Struct(point.clone())));
        assert!(Value::none().matches(&TypeDesc::optional(TypeDesc::Struct(point.clone()))));
        assert!(Value::some(v).matches(&TypeDesc::optional(TypeDesc::Struct(point))));
        assert!(!Value::I32(1).matches(&TypeDesc::I64));
        assert!(StructValue::new(
            &StructLayout::new("One", [("a", TypeDesc::U8)]).unwrap(),
            [Value::I32(1)]
        )
        .is_err());
    }

    #[test]
    fn integer_widening() {
        assert_eq!(Value::I16(-1).as_i64(), Some(-1));
        assert_eq!(Value::from_i64(&TypeDesc::U8, 257), Some(Value::U8(1)));
        assert_eq!(Value::F32(1.0).as_i64(), None);
    }

    #[test]
    fn references_share_state() {
        let cell = ValueRef::new(Value::I32(1));
        let alias = cell.clone();
        alias.set(Value::I32(5));
        assert_eq!(cell.get(), Value::I32(5));
    }
}
