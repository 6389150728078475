//! Per-parameter marshalling configuration.

use crate::types::TypeDesc;

/// Unmanaged representation of a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoolMarshal {
    I1,
    I2,
    I4,
    I8,
    #[default]
    U1,
    U2,
    U4,
    U8,
    /// The Win32 `BOOL`: four bytes, `0/1`.
    Bool,
    /// The COM `VARIANT_BOOL`: two bytes, `0/-1`.
    VariantBool,
}

impl BoolMarshal {
    /// The integer type carrying the boolean over the boundary.
    pub fn carrier(self) -> TypeDesc {
        match self {
            BoolMarshal::I1 => TypeDesc::I8,
            BoolMarshal::I2 | BoolMarshal::VariantBool => TypeDesc::I16,
            BoolMarshal::I4 | BoolMarshal::Bool => TypeDesc::I32,
            BoolMarshal::I8 => TypeDesc::I64,
            BoolMarshal::U1 => TypeDesc::U8,
            BoolMarshal::U2 => TypeDesc::U16,
            BoolMarshal::U4 => TypeDesc::U32,
            BoolMarshal::U8 => TypeDesc::U64,
        }
    }

    /// The `(true, false)` literal pair.
    pub fn literals(self) -> (i64, i64) {
        match self {
            BoolMarshal::VariantBool => (-1, 0),
            _ => (1, 0),
        }
    }
}

/// Encoding of a string passed as a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringEncoding {
    /// Narrow platform string. Treated as UTF-8 bytes.
    Ansi,
    #[default]
    Utf8,
    /// NUL terminated UTF-16.
    Utf16,
    /// UTF-16 on Windows, UTF-8 elsewhere.
    Auto,
}

impl StringEncoding {
    pub fn is_wide(self) -> bool {
        match self {
            StringEncoding::Utf16 => true,
            StringEncoding::Auto => cfg!(windows),
            StringEncoding::Ansi | StringEncoding::Utf8 => false,
        }
    }
}

/// Who releases native memory handed across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FreePolicy {
    /// The callee keeps ownership.
    #[default]
    Retain,
    /// The caller frees returned memory with the C allocator after raising it.
    CallerFree,
}

/// How long a callback passed to native code is kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DelegateLifetime {
    /// Same as `Persistent`.
    #[default]
    Default,
    /// Retained by the instance until it is disposed.
    Persistent,
    /// Never retained; the caller keeps it alive.
    None,
    /// Retained for the duration of the call.
    CallOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MarshalHints {
    pub boolean: Option<BoolMarshal>,
    pub string: Option<StringEncoding>,
    pub free: FreePolicy,
    pub lifetime: Option<DelegateLifetime>,
    /// Element count of a returned span.
    pub span_length: Option<usize>,
}

impl MarshalHints {
    pub fn boolean(marshal: BoolMarshal) -> Self {
        MarshalHints {
            boolean: Some(marshal),
            ..Default::default()
        }
    }

    pub fn string(encoding: StringEncoding) -> Self {
        MarshalHints {
            string: Some(encoding),
            ..Default::default()
        }
    }

    pub fn sized_span(length: usize) -> Self {
        MarshalHints {
            span_length: Some(length),
            ..Default::default()
        }
    }

    pub fn lifetime(lifetime: DelegateLifetime) -> Self {
        MarshalHints {
            lifetime: Some(lifetime),
            ..Default::default()
        }
    }

    pub fn caller_free(mut self) -> Self {
        self.free = FreePolicy::CallerFree;
        self
    }

    pub fn bool_marshal(&self) -> BoolMarshal {
        self.boolean.unwrap_or_default()
    }

    pub fn string_encoding(&self) -> StringEncoding {
        self.string.unwrap_or_default()
    }

    pub fn delegate_lifetime(&self) -> DelegateLifetime {
        match self.lifetime.unwrap_or_default() {
            DelegateLifetime::Default => DelegateLifetime::Persistent,
            other => other,
        }
    }
}
