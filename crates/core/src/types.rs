use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::error::{Error, Result};

/// The calling convention of a native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    #[default]
    Cdecl,
    StdCall,
    ThisCall,
    FastCall,
    /// The platform default: stdcall on 32-bit Windows, cdecl elsewhere.
    Winapi,
}

/// Description of a host or native type crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    ISize,
    USize,
    /// An untyped native pointer or handle.
    Pointer,
    /// A host string.
    String,
    /// A value struct with C layout.
    Struct(Arc<StructLayout>),
    /// An optional value. By value it travels as a nullable pointer.
    Optional(Box<TypeDesc>),
    /// A contiguous sequence of elements, passed as a pointer.
    Span(Box<TypeDesc>),
    /// A native function pointer with a known signature.
    Callback(Arc<CallbackSignature>),
    /// An open type parameter, by position.
    Generic(usize),
    /// A user type handled by a registered transformer.
    Custom(String),
}

impl TypeDesc {
    pub fn optional(inner: TypeDesc) -> Self {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn span(element: TypeDesc) -> Self {
        TypeDesc::Span(Box::new(element))
    }

    pub fn custom(name: impl Into<String>) -> Self {
        TypeDesc::Custom(name.into())
    }

    /// Types a terminating generator can hand to the native side as is.
    pub fn is_raw(&self) -> bool {
        match self {
            TypeDesc::Bool
            | TypeDesc::String
            | TypeDesc::Optional(_)
            | TypeDesc::Span(_)
            | TypeDesc::Callback(_)
            | TypeDesc::Generic(_)
            | TypeDesc::Custom(_) => false,
            _ => true,
        }
    }

    /// Types with a fixed in-memory representation (raw types plus `bool`).
    pub fn is_blittable(&self) -> bool {
        self.size().is_some()
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeDesc::I8
                | TypeDesc::U8
                | TypeDesc::I16
                | TypeDesc::U16
                | TypeDesc::I32
                | TypeDesc::U32
                | TypeDesc::I64
                | TypeDesc::U64
                | TypeDesc::ISize
                | TypeDesc::USize
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            TypeDesc::U8 | TypeDesc::U16 | TypeDesc::U32 | TypeDesc::U64 | TypeDesc::USize
        )
    }

    /// Whether the type mentions an open type parameter anywhere.
    pub fn is_open(&self) -> bool {
        match self {
            TypeDesc::Generic(_) => true,
            TypeDesc::Optional(inner) | TypeDesc::Span(inner) => inner.is_open(),
            TypeDesc::Callback(sig) => sig.ret.is_open() || sig.params.iter().any(|p| p.is_open()),
            _ => false,
        }
    }

    /// Substitutes open type parameters with concrete arguments.
    pub fn close(&self, args: &[TypeDesc]) -> Result<TypeDesc> {
        Ok(match self {
            TypeDesc::Generic(i) => args.get(*i).cloned().ok_or_else(|| {
                Error::InvalidDescriptor(format!(
                    "type parameter {i} is unbound ({} type arguments given)",
                    args.len()
                ))
            })?,
            TypeDesc::Optional(inner) => TypeDesc::Optional(Box::new(inner.close(args)?)),
            TypeDesc::Span(inner) => TypeDesc::Span(Box::new(inner.close(args)?)),
            TypeDesc::Callback(sig) if self.is_open() => TypeDesc::Callback(Arc::new(CallbackSignature {
                params: sig.params.iter().map(|p| p.close(args)).collect::<Result<_>>()?,
                ret: sig.ret.close(args)?,
                convention: sig.convention,
            })),
            other => other.clone(),
        })
    }

    /// Size in bytes of the in-memory representation, if there is one.
    pub fn size(&self) -> Option<usize> {
        Some(match self {
            TypeDesc::Bool | TypeDesc::I8 | TypeDesc::U8 => 1,
            TypeDesc::I16 | TypeDesc::U16 => 2,
            TypeDesc::I32 | TypeDesc::U32 | TypeDesc::F32 => 4,
            TypeDesc::I64 | TypeDesc::U64 | TypeDesc::F64 => 8,
            TypeDesc::ISize | TypeDesc::USize | TypeDesc::Pointer => mem::size_of::<usize>(),
            TypeDesc::Struct(layout) => layout.size(),
            _ => return None,
        })
    }

    pub fn align(&self) -> Option<usize> {
        match self {
            TypeDesc::Struct(layout) => Some(layout.align()),
            other => other.size(),
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Void => f.write_str("void"),
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::I8 => f.write_str("i8"),
            TypeDesc::U8 => f.write_str("u8"),
            TypeDesc::I16 => f.write_str("i16"),
            TypeDesc::U16 => f.write_str("u16"),
            TypeDesc::I32 => f.write_str("i32"),
            TypeDesc::U32 => f.write_str("u32"),
            TypeDesc::I64 => f.write_str("i64"),
            TypeDesc::U64 => f.write_str("u64"),
            TypeDesc::F32 => f.write_str("f32"),
            TypeDesc::F64 => f.write_str("f64"),
            TypeDesc::ISize => f.write_str("isize"),
            TypeDesc::USize => f.write_str("usize"),
            TypeDesc::Pointer => f.write_str("*mut c_void"),
            TypeDesc::String => f.write_str("string"),
            TypeDesc::Struct(layout) => f.write_str(&layout.name),
            TypeDesc::Optional(inner) => write!(f, "Option<{inner}>"),
            TypeDesc::Span(inner) => write!(f, "Span<{inner}>"),
            TypeDesc::Callback(sig) => write!(f, "{sig}"),
            TypeDesc::Generic(i) => write!(f, "T{i}"),
            TypeDesc::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: TypeDesc,
    pub offset: usize,
}

/// A value struct laid out with C rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructLayout {
    pub name: String,
    fields: Vec<StructField>,
    size: usize,
    align: usize,
}

impl StructLayout {
    /// Lays out `fields` in declaration order. Every field must have a fixed
    /// in-memory representation.
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (N, TypeDesc)>,
    ) -> Result<Arc<StructLayout>> {
        let name = name.into();
        let mut offset = 0;
        let mut align = 1;
        let mut laid_out = Vec::new();
        for (field, ty) in fields {
            let field = field.into();
            let (Some(size), Some(field_align)) = (ty.size(), ty.align()) else {
                return Err(Error::InvalidDescriptor(format!(
                    "field `{name}.{field}` of type `{ty}` has no fixed layout"
                )));
            };
            offset = align_to(offset, field_align);
            align = align.max(field_align);
            laid_out.push(StructField {
                name: field,
                ty,
                offset,
            });
            offset += size;
        }
        if laid_out.is_empty() {
            return Err(Error::InvalidDescriptor(format!("struct `{name}` has no fields")));
        }
        Ok(Arc::new(StructLayout {
            name,
            fields: laid_out,
            size: align_to(offset, align),
            align,
        }))
    }

    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }
}

pub(crate) fn align_to(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Signature of a native function pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackSignature {
    pub params: Vec<TypeDesc>,
    pub ret: TypeDesc,
    pub convention: CallingConvention,
}

impl CallbackSignature {
    pub fn new(params: impl IntoIterator<Item = TypeDesc>, ret: TypeDesc) -> Arc<Self> {
        Arc::new(CallbackSignature {
            params: params.into_iter().collect(),
            ret,
            convention: CallingConvention::Cdecl,
        })
    }
}

impl fmt::Display for CallbackSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("extern fn(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_follows_c_rules() {
        let layout = StructLayout::new(
            "Mixed",
            [("a", TypeDesc::U8), ("b", TypeDesc::I32), ("c", TypeDesc::I16)],
        )
        .unwrap();
        let offsets: Vec<_> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [0, 4, 8]);
        assert_eq!(layout.size(), 12);
        assert_eq!(layout.align(), 4);

        let nested = StructLayout::new(
            "Outer",
            [("flag", TypeDesc::Bool), ("inner", TypeDesc::Struct(layout))],
        )
        .unwrap();
        assert_eq!(nested.fields()[1].offset, 4);
        assert_eq!(nested.size(), 16);
    }

    #[test]
    fn struct_fields_need_layout() {
        assert!(StructLayout::new("Bad", [("s", TypeDesc::String)]).is_err());
        assert!(StructLayout::new::<&str>("Empty", []).is_err());
    }

    #[test]
    fn closing_generics() {
        let open = TypeDesc::optional(TypeDesc::Generic(1));
        assert!(open.is_open());
        let closed = open.close(&[TypeDesc::I8, TypeDesc::F64]).unwrap();
        assert_eq!(closed, TypeDesc::optional(TypeDesc::F64));
        assert!(!closed.is_open());
        assert!(TypeDesc::Generic(2).close(&[TypeDesc::I8]).is_err());
    }

    #[test]
    fn raw_types() {
        assert!(TypeDesc::I32.is_raw());
        assert!(TypeDesc::Pointer.is_raw());
        assert!(!TypeDesc::Bool.is_raw());
        assert!(TypeDesc::Bool.is_blittable());
        assert!(!TypeDesc::String.is_raw());
        assert_eq!(TypeDesc::span(TypeDesc::I32).to_string(), "Span<i32>");
    }
}
