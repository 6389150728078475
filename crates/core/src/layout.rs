//! Reading and writing values in their native in-memory representation.

use std::slice;

use crate::error::{Error, Result};
use crate::types::TypeDesc;
use crate::value::{StructValue, Value};

macro_rules! put {
    ($out:ident, $v:expr) => {{
        let bytes = $v.to_ne_bytes();
        $out[..bytes.len()].copy_from_slice(&bytes);
    }};
}

macro_rules! get {
    ($bytes:ident, $t:ty) => {{
        let mut buf = [0u8; std::mem::size_of::<$t>()];
        let n = buf.len();
        buf.copy_from_slice(&$bytes[..n]);
        <$t>::from_ne_bytes(buf)
    }};
}

fn size_of(ty: &TypeDesc) -> Result<usize> {
    ty.size().ok_or_else(|| Error::InvalidDescriptor(format!("`{ty}` has no in-memory representation")))
}

/// Writes `value` as `ty` into the front of `out`.
pub fn encode(ty: &TypeDesc, value: &Value, out: &mut [u8]) -> Result<()> {
    let size = size_of(ty)?;
    if out.len() < size {
        return Err(Error::InvalidDescriptor(format!(
            "buffer of {} bytes is too small for `{ty}`",
            out.len()
        )));
    }
    match (ty, value) {
        (TypeDesc::Bool, Value::Bool(b)) => out[0] = u8::from(*b),
        (TypeDesc::I8, Value::I8(v)) => put!(out, v),
        (TypeDesc::U8, Value::U8(v)) => put!(out, v),
        (TypeDesc::I16, Value::I16(v)) => put!(out, v),
        (TypeDesc::U16, Value::U16(v)) => put!(out, v),
        (TypeDesc::I32, Value::I32(v)) => put!(out, v),
        (TypeDesc::U32, Value::U32(v)) => put!(out, v),
        (TypeDesc::I64, Value::I64(v)) => put!(out, v),
        (TypeDesc::U64, Value::U64(v)) => put!(out, v),
        (TypeDesc::F32, Value::F32(v)) => put!(out, v),
        (TypeDesc::F64, Value::F64(v)) => put!(out, v),
        (TypeDesc::ISize, Value::ISize(v)) => put!(out, v),
        (TypeDesc::USize, Value::USize(v)) => put!(out, v),
        (TypeDesc::Pointer, Value::Pointer(v)) => put!(out, v),
        (TypeDesc::Struct(layout), Value::Struct(s)) if **s.layout() == **layout => {
            for (field, v) in layout.fields().iter().zip(s.fields()) {
                encode(&field.ty, v, &mut out[field.offset..])?;
            }
        }
        (ty, value) => {
            return Err(Error::argument_mismatch(
                &ty.to_string(),
                format!("cannot store a {} value as `{ty}`", value.kind()),
            ))
        }
    }
    Ok(())
}

/// Reads a `ty` from the front of `bytes`.
pub fn decode(ty: &TypeDesc, bytes: &[u8]) -> Result<Value> {
    let size = size_of(ty)?;
    if bytes.len() < size {
        return Err(Error::InvalidDescriptor(format!(
            "buffer of {} bytes is too small for `{ty}`",
            bytes.len()
        )));
    }
    Ok(match ty {
        TypeDesc::Bool => Value::Bool(bytes[0] != 0),
        TypeDesc::I8 => Value::I8(get!(bytes, i8)),
        TypeDesc::U8 => Value::U8(bytes[0]),
        TypeDesc::I16 => Value::I16(get!(bytes, i16)),
        TypeDesc::U16 => Value::U16(get!(bytes, u16)),
        TypeDesc::I32 => Value::I32(get!(bytes, i32)),
        TypeDesc::U32 => Value::U32(get!(bytes, u32)),
        TypeDesc::I64 => Value::I64(get!(bytes, i64)),
        TypeDesc::U64 => Value::U64(get!(bytes, u64)),
        TypeDesc::F32 => Value::F32(get!(bytes, f32)),
        TypeDesc::F64 => Value::F64(get!(bytes, f64)),
        TypeDesc::ISize => Value::ISize(get!(bytes, isize)),
        TypeDesc::USize => Value::USize(get!(bytes, usize)),
        TypeDesc::Pointer => Value::Pointer(get!(bytes, usize)),
        TypeDesc::Struct(layout) => {
            let fields = layout
                .fields()
                .iter()
                .map(|f| decode(&f.ty, &bytes[f.offset..]))
                .collect::<Result<Vec<_>>>()?;
            Value::Struct(StructValue::new(layout, fields)?)
        }
        other => {
            return Err(Error::InvalidDescriptor(format!(
                "`{other}` has no in-memory representation"
            )))
        }
    })
}

/// Reads a `ty` stored at `ptr`.
///
/// # Safety
///
/// `ptr` must be valid for reads of `ty.size()` bytes.
pub unsafe fn read(ty: &TypeDesc, ptr: *const u8) -> Result<Value> {
    let size = size_of(ty)?;
    decode(ty, slice::from_raw_parts(ptr, size))
}

/// Writes `value` as a `ty` to `ptr`.
///
/// # Safety
///
/// `ptr` must be valid for writes of `ty.size()` bytes.
pub unsafe fn write(ty: &TypeDesc, value: &Value, ptr: *mut u8) -> Result<()> {
    let size = size_of(ty)?;
    encode(ty, value, slice::from_raw_parts_mut(ptr, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructLayout;

    #[test]
    fn primitives() {
        let mut buf = [0u8; 8];
        encode(&TypeDesc::I32, &Value::I32(-7), &mut buf).unwrap();
        assert_eq!(decode(&TypeDesc::I32, &buf).unwrap(), Value::I32(-7));
        encode(&TypeDesc::F64, &Value::F64(2.5), &mut buf).unwrap();
        assert_eq!(decode(&TypeDesc::F64, &buf).unwrap(), Value::F64(2.5));
        assert!(encode(&TypeDesc::I64, &Value::I32(1), &mut buf).is_err());
        assert!(encode(&TypeDesc::I64, &Value::I64(1), &mut buf[..4]).is_err());
    }

    #[test]
    fn decode_reads_the_front_of_longer_buffers() {
        let mut buf = [0xffu8; 16];
        buf[..2].copy_from_slice(&0x1234u16.to_ne_bytes());
        assert_eq!(decode(&TypeDesc::U16, &buf).unwrap(), Value::U16(0x1234));
        buf[..8].copy_from_slice(&(-3i64).to_ne_bytes());
        assert_eq!(decode(&TypeDesc::I64, &buf).unwrap(), Value::I64(-3));
        assert!(decode(&TypeDesc::U32, &buf[..3]).is_err());
    }

    #[test]
    fn structs_use_field_offsets() {
        let layout = StructLayout::new("S", [("a", TypeDesc::U8), ("b", TypeDesc::I32)]).unwrap();
        let value = StructValue::new(&layout, [Value::U8(3), Value::I32(0x01020304)]).unwrap();
        let mut buf = vec![0u8; layout.size()];
        encode(&TypeDesc::Struct(layout.clone()), &Value::Struct(value.clone()), &mut buf).unwrap();
        assert_eq!(buf[0], 3);
        assert_eq!(&buf[4..8], &0x01020304i32.to_ne_bytes());
        let back = unsafe { read(&TypeDesc::Struct(layout), buf.as_ptr()) }.unwrap();
        assert_eq!(back, Value::Struct(value));
    }
}
