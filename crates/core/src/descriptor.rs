//! Declarative descriptions of native interfaces.
//!
//! Descriptors are immutable values. Pipeline stages derive new descriptors
//! from old ones rather than editing them in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hints::MarshalHints;
use crate::types::{CallingConvention, TypeDesc};

/// Process-unique identity of a described interface or base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity(u64);

impl TypeIdentity {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TypeIdentity(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDescriptor {
    pub name: String,
    pub ty: TypeDesc,
    pub by_ref: bool,
    pub hints: MarshalHints,
    pub metadata: BTreeMap<String, String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        ParameterDescriptor {
            name: name.into(),
            ty,
            by_ref: false,
            hints: MarshalHints::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn hints(mut self, hints: MarshalHints) -> Self {
        self.hints = hints;
        self
    }

    /// An optional value passed by reference; these are permuted.
    pub fn is_optional_ref(&self) -> bool {
        self.by_ref && matches!(self.ty, TypeDesc::Optional(_))
    }

    /// Same parameter with a different type and reference mode.
    pub fn retyped(&self, ty: TypeDesc, by_ref: bool) -> Self {
        ParameterDescriptor {
            ty,
            by_ref,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReturnDescriptor {
    pub ty: TypeDesc,
    pub hints: MarshalHints,
}

impl Default for ReturnDescriptor {
    fn default() -> Self {
        ReturnDescriptor {
            ty: TypeDesc::Void,
            hints: MarshalHints::default(),
        }
    }
}

/// A native function as seen from the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub name: String,
    /// Explicit native entry point, overriding the name.
    pub entry_point: Option<String>,
    pub params: Vec<ParameterDescriptor>,
    pub ret: ReturnDescriptor,
    pub convention: CallingConvention,
    /// Number of open type parameters.
    pub generic_arity: usize,
    pub metadata: BTreeMap<String, String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        MethodDescriptor {
            name: name.into(),
            entry_point: None,
            params: Vec::new(),
            ret: ReturnDescriptor::default(),
            convention: CallingConvention::default(),
            generic_arity: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn param(self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.with_param(ParameterDescriptor::new(name, ty))
    }

    pub fn param_ref(self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.with_param(ParameterDescriptor::new(name, ty).by_ref())
    }

    pub fn with_param(mut self, param: ParameterDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.ret.ty = ty;
        self
    }

    pub fn returns_with(mut self, ty: TypeDesc, hints: MarshalHints) -> Self {
        self.ret = ReturnDescriptor { ty, hints };
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn generic(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A copy of this descriptor with a new parameter list.
    pub fn with_params(&self, params: Vec<ParameterDescriptor>) -> Self {
        MethodDescriptor {
            params,
            ..self.clone()
        }
    }

    /// A copy of this descriptor with a new return type.
    pub fn with_return(&self, ty: TypeDesc) -> Self {
        let mut method = self.clone();
        method.ret.ty = ty;
        method
    }

    pub fn is_open(&self) -> bool {
        self.generic_arity > 0 || self.ret.ty.is_open() || self.params.iter().any(|p| p.ty.is_open())
    }

    /// Substitutes concrete type arguments for every open type parameter.
    pub fn close(&self, type_args: &[TypeDesc]) -> Result<MethodDescriptor> {
        if type_args.len() != self.generic_arity {
            return Err(Error::argument_mismatch(
                &self.name,
                format!(
                    "expected {} type arguments, found {}",
                    self.generic_arity,
                    type_args.len()
                ),
            ));
        }
        let mut closed = self.clone();
        closed.generic_arity = 0;
        closed.ret.ty = self.ret.ty.close(type_args)?;
        for param in closed.params.iter_mut() {
            param.ty = param.ty.close(type_args)?;
        }
        Ok(closed)
    }

    /// Whether any parameter or the return value is of a type selected by `f`.
    pub fn mentions(&self, mut f: impl FnMut(&TypeDesc, bool) -> bool) -> bool {
        f(&self.ret.ty, false) || self.params.iter().any(|p| f(&p.ty, p.by_ref))
    }

    /// Total size of the arguments as pushed on a 32-bit stack.
    pub fn argument_bytes(&self) -> usize {
        self.params
            .iter()
            .map(|p| {
                let size = if p.by_ref { None } else { p.ty.size() };
                size.unwrap_or(std::mem::size_of::<usize>()).max(4).next_multiple_of(4)
            })
            .sum()
    }

    /// Parameter and return types, for detecting duplicate declarations.
    pub fn same_signature(&self, other: &MethodDescriptor) -> bool {
        self.name == other.name
            && self.generic_arity == other.generic_arity
            && self.ret == other.ret
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty && a.by_ref == b.by_ref && a.hints == b.hints)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if p.by_ref {
                f.write_str("ref ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
        }
        write!(f, ") -> {}", self.ret.ty)
    }
}

/// A native global variable exposed as a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TypeDesc,
    pub can_read: bool,
    pub can_write: bool,
    pub entry_point: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        PropertyDescriptor {
            name: name.into(),
            ty,
            can_read: true,
            can_write: true,
            entry_point: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.can_write = false;
        self
    }

    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }
}

/// Case transformation applied to a symbol after its prefix is prepended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolTransformation {
    #[default]
    None,
    Pascalize,
    Camelize,
    Underscore,
    Dasherize,
    Kebaberize,
}

/// Interface-wide native naming rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NativeSymbols {
    pub prefix: String,
    pub transformation: SymbolTransformation,
}

impl NativeSymbols {
    pub fn new(prefix: impl Into<String>, transformation: SymbolTransformation) -> Self {
        NativeSymbols {
            prefix: prefix.into(),
            transformation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Interface,
    Class,
}

/// A described interface whose members are bound to native symbols.
#[derive(Debug)]
pub struct InterfaceDescriptor {
    id: TypeIdentity,
    pub name: String,
    pub kind: TypeKind,
    pub methods: Vec<MethodDescriptor>,
    pub properties: Vec<PropertyDescriptor>,
    pub parents: Vec<Arc<InterfaceDescriptor>>,
    pub native_symbols: Option<NativeSymbols>,
}

impl InterfaceDescriptor {
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            name: name.into(),
            kind: TypeKind::Interface,
            methods: Vec::new(),
            properties: Vec::new(),
            parents: Vec::new(),
            native_symbols: None,
        }
    }

    pub fn id(&self) -> TypeIdentity {
        self.id
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Own methods followed by inherited ones, each with its declaring interface.
    pub fn all_methods(&self) -> Vec<(&InterfaceDescriptor, &MethodDescriptor)> {
        let mut out: Vec<_> = self.methods.iter().map(|m| (self, m)).collect();
        for parent in &self.parents {
            out.extend(parent.all_methods());
        }
        out
    }

    pub fn all_properties(&self) -> Vec<(&InterfaceDescriptor, &PropertyDescriptor)> {
        let mut out: Vec<_> = self.properties.iter().map(|p| (self, p)).collect();
        for parent in &self.parents {
            out.extend(parent.all_properties());
        }
        out
    }
}

pub struct InterfaceBuilder {
    name: String,
    kind: TypeKind,
    methods: Vec<MethodDescriptor>,
    properties: Vec<PropertyDescriptor>,
    parents: Vec<Arc<InterfaceDescriptor>>,
    native_symbols: Option<NativeSymbols>,
}

impl InterfaceBuilder {
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn extends(mut self, parent: &Arc<InterfaceDescriptor>) -> Self {
        self.parents.push(parent.clone());
        self
    }

    pub fn native_symbols(mut self, rule: NativeSymbols) -> Self {
        self.native_symbols = Some(rule);
        self
    }

    /// Marks the described type as a class rather than an interface.
    pub fn class(mut self) -> Self {
        self.kind = TypeKind::Class;
        self
    }

    pub fn build(self) -> Arc<InterfaceDescriptor> {
        Arc::new(InterfaceDescriptor {
            id: TypeIdentity::next(),
            name: self.name,
            kind: self.kind,
            methods: self.methods,
            properties: self.properties,
            parents: self.parents,
            native_symbols: self.native_symbols,
        })
    }
}
