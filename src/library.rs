use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dlbind_core::{
    Error, ImplementationOptions, InterfaceDescriptor, MethodDescriptor, Result,
    SymbolNameTransformer, TypeDesc, TypeIdentity, TypeTransformerRepository, Value,
};
use dlbind_loader::{LibraryHandle, LibraryLoader, SymbolLoader};
use once_cell::sync::OnceCell;

use crate::base::BaseType;
use crate::cache::ImplementationCache;
use crate::generators::BoundFunction;
use crate::implementation::{
    GeneratedImplementation, ImplementationKey, ImplementationTypeId, MethodImpl, PropertyImpl,
};
use crate::lifetime::CallbackLifetimes;
use crate::pipeline::CallContext;

/// Collaborators an instance needs after activation, for closing generic
/// methods.
pub(crate) struct BindingContext {
    pub transformers: Arc<TypeTransformerRepository>,
    pub symbol_transformer: Arc<dyn SymbolNameTransformer>,
    pub cache: Arc<ImplementationCache>,
}

/// An opened library. The handle is closed when the last owner drops it.
pub(crate) struct LoadedLibrary {
    handle: LibraryHandle,
    path: PathBuf,
    library_loader: Arc<dyn LibraryLoader>,
    symbol_loader: Arc<dyn SymbolLoader>,
}

impl LoadedLibrary {
    pub fn open(
        path: PathBuf,
        library_loader: Arc<dyn LibraryLoader>,
        symbol_loader: Arc<dyn SymbolLoader>,
    ) -> Result<Arc<LoadedLibrary>> {
        let handle = library_loader.load_library(Some(&path))?;
        log::debug!("loaded {} as {handle:?}", path.display());
        Ok(Arc::new(LoadedLibrary {
            handle,
            path,
            library_loader,
            symbol_loader,
        }))
    }

    pub fn symbol(&self, name: &str) -> Result<usize> {
        let address = self.symbol_loader.load_symbol(self.handle, name)?;
        log::trace!("resolved `{name}` at {address:?}");
        Ok(address.get())
    }
}

impl Drop for LoadedLibrary {
    fn drop(&mut self) {
        if self.library_loader.close_library(self.handle) {
            log::debug!("closed {}", self.path.display());
        } else {
            log::warn!("closing {} reported failure", self.path.display());
        }
    }
}

type ClosedGenerics = HashMap<(TypeIdentity, Vec<TypeDesc>), Arc<OnceCell<Arc<NativeLibrary>>>>;

/// An activated binding: a generated implementation bound to one opened
/// library.
pub struct NativeLibrary {
    implementation: Arc<GeneratedImplementation>,
    context: Arc<BindingContext>,
    library: Mutex<Option<Arc<LoadedLibrary>>>,
    path: PathBuf,
    symbols: Vec<OnceCell<usize>>,
    bindings: Vec<OnceCell<BoundFunction>>,
    lifetimes: CallbackLifetimes,
    closed_generics: Mutex<ClosedGenerics>,
    disposed: AtomicBool,
}

impl NativeLibrary {
    /// Creates an instance. Unless lazy binding is requested every symbol
    /// is resolved here, and the first failure is returned.
    pub(crate) fn activate(
        implementation: Arc<GeneratedImplementation>,
        library: Arc<LoadedLibrary>,
        context: Arc<BindingContext>,
    ) -> Result<NativeLibrary> {
        let instance = NativeLibrary {
            symbols: implementation.symbols.iter().map(|_| OnceCell::new()).collect(),
            bindings: implementation.bindings.iter().map(|_| OnceCell::new()).collect(),
            path: library.path.clone(),
            library: Mutex::new(Some(library)),
            implementation,
            context,
            lifetimes: CallbackLifetimes::default(),
            closed_generics: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        };
        if !instance.options().contains(ImplementationOptions::USE_LAZY_BINDING) {
            for index in 0..instance.bindings.len() {
                instance.binding(index)?;
            }
            for index in 0..instance.symbols.len() {
                instance.symbol(index)?;
            }
        }
        Ok(instance)
    }

    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke_generic(name, &[], args)
    }

    /// Invokes a member with concrete type arguments for its open type
    /// parameters.
    pub fn invoke_generic(&self, name: &str, type_args: &[TypeDesc], args: Vec<Value>) -> Result<Value> {
        match self.implementation.methods.get(name) {
            Some(MethodImpl::Native {
                descriptor, invoker, ..
            }) => {
                check_arguments(descriptor, type_args, &args)?;
                invoker.invoke(
                    &CallContext {
                        library: self,
                        type_args,
                    },
                    args,
                )
            }
            Some(MethodImpl::Managed(body)) => Ok(body(self, &args)?),
            None => Err(self.unknown(name)),
        }
    }

    pub fn get_property(&self, name: &str) -> Result<Value> {
        match self.implementation.properties.get(name) {
            Some(PropertyImpl::Native { accessor, .. }) => accessor.get(self),
            Some(PropertyImpl::Managed {
                getter: Some(getter), ..
            }) => Ok(getter(self)?),
            Some(PropertyImpl::Managed { .. }) => Err(Error::argument_mismatch(name, "property is write-only")),
            None => Err(self.unknown(name)),
        }
    }

    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let property = self
            .implementation
            .properties
            .get(name)
            .ok_or_else(|| self.unknown(name))?;
        let ty = &property.descriptor().ty;
        if !value.matches(ty) {
            return Err(Error::argument_mismatch(
                name,
                format!("expected {ty}, found {}", value.kind()),
            ));
        }
        match property {
            PropertyImpl::Native { accessor, .. } => accessor.set(self, &value),
            PropertyImpl::Managed {
                setter: Some(setter), ..
            } => Ok(setter(self, value)?),
            PropertyImpl::Managed { .. } => Err(Error::argument_mismatch(name, "property is read-only")),
        }
    }

    /// Releases retained callbacks and, with disposal checks enabled, the
    /// library handle. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            log::debug!("`{}` is already disposed", self.type_name());
            return;
        }
        self.lifetimes.clear();
        let closed: Vec<_> = self
            .closed_generics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect();
        for child in closed {
            child.dispose();
        }
        if self.options().contains(ImplementationOptions::GENERATE_DISPOSAL_CHECKS) {
            let library = self.library.lock().unwrap_or_else(PoisonError::into_inner).take();
            drop(library);
        }
        log::debug!("disposed `{}`", self.type_name());
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn implementation(&self) -> &Arc<GeneratedImplementation> {
        &self.implementation
    }

    /// The runtime type of this instance.
    pub fn implementation_type(&self) -> ImplementationTypeId {
        self.implementation.id()
    }

    pub fn type_name(&self) -> &str {
        self.implementation.name()
    }

    pub fn library_path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> ImplementationOptions {
        self.implementation.key().options
    }

    /// Number of callbacks currently kept alive for native code.
    pub fn retained_callbacks(&self) -> usize {
        self.lifetimes.len()
    }

    pub(crate) fn lifetimes(&self) -> &CallbackLifetimes {
        &self.lifetimes
    }

    pub(crate) fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed {
                type_name: self.type_name().to_string(),
            });
        }
        Ok(())
    }

    /// Address of symbol slot `index`. Resolved once; a failed resolution
    /// is attempted again on the next access.
    pub(crate) fn symbol(&self, index: usize) -> Result<usize> {
        let cell = self
            .symbols
            .get(index)
            .ok_or_else(|| Error::InvalidDescriptor(format!("no symbol slot {index}")))?;
        cell.get_or_try_init(|| {
            let name = &self.implementation.symbols[index];
            self.loaded()?.symbol(name)
        })
        .copied()
    }

    pub(crate) fn binding(&self, index: usize) -> Result<&BoundFunction> {
        let cell = self
            .bindings
            .get(index)
            .ok_or_else(|| Error::InvalidDescriptor(format!("no binding slot {index}")))?;
        cell.get_or_try_init(|| {
            let binding = &self.implementation.bindings[index];
            Ok(BoundFunction::new(self.symbol(binding.symbol)?, binding.signature.clone()))
        })
    }

    /// The instance binding `host`, the closed form of a generic member,
    /// activated on first use.
    pub(crate) fn closed_generic(
        &self,
        member: TypeIdentity,
        type_args: &[TypeDesc],
        host: &Arc<InterfaceDescriptor>,
    ) -> Result<Arc<NativeLibrary>> {
        let cell = self
            .closed_generics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((member, type_args.to_vec()))
            .or_default()
            .clone();
        cell.get_or_try_init(|| {
            let library = self.loaded()?;
            let base = BaseType::native_library();
            let key = ImplementationKey {
                base: base.id(),
                interfaces: vec![host.id()],
                library: self.path.clone(),
                options: self.options(),
            };
            let implementation = self.context.cache.get_or_create(&self.context, &key, || {
                GeneratedImplementation::generate(key.clone(), &base, std::slice::from_ref(host), &self.context)
            })?;
            NativeLibrary::activate(implementation, library, self.context.clone()).map(Arc::new)
        })
        .cloned()
    }

    fn loaded(&self) -> Result<Arc<LoadedLibrary>> {
        self.library
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Disposed {
                type_name: self.type_name().to_string(),
            })
    }

    fn unknown(&self, member: &str) -> Error {
        Error::UnknownMember {
            type_name: self.type_name().to_string(),
            member: member.to_string(),
        }
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("type", &self.type_name())
            .field("path", &self.path)
            .field("options", &self.options())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn check_arguments(method: &MethodDescriptor, type_args: &[TypeDesc], args: &[Value]) -> Result<()> {
    let method = if method.generic_arity > 0 || !type_args.is_empty() {
        Cow::Owned(method.close(type_args)?)
    } else {
        Cow::Borrowed(method)
    };
    if args.len() != method.params.len() {
        return Err(Error::argument_mismatch(
            &method.name,
            format!("expected {} arguments, found {}", method.params.len(), args.len()),
        ));
    }
    for (i, (param, arg)) in method.params.iter().zip(args).enumerate() {
        let ok = match arg {
            Value::Ref(cell) if param.by_ref => cell.get().matches(&param.ty),
            _ if param.by_ref => false,
            arg => arg.matches(&param.ty),
        };
        if !ok {
            return Err(Error::argument_mismatch(
                &method.name,
                format!(
                    "argument {i} (`{}`) expects {}{}, found {}",
                    param.name,
                    if param.by_ref { "ref " } else { "" },
                    param.ty,
                    arg.kind()
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlbind_core::ValueRef;

    #[test]
    fn arguments_are_checked_against_the_descriptor() {
        let m = MethodDescriptor::new("f")
            .param("a", TypeDesc::I32)
            .param_ref("b", TypeDesc::optional(TypeDesc::I64));
        let good = [Value::I32(1), Value::Ref(ValueRef::new(Value::none()))];
        assert!(check_arguments(&m, &[], &good).is_ok());
        let present = [Value::I32(1), Value::by_ref(Value::some(2i64))];
        assert!(check_arguments(&m, &[], &present).is_ok());
        assert!(check_arguments(&m, &[], &[Value::I32(1)]).is_err());
        assert!(check_arguments(&m, &[], &[Value::I32(1), Value::none()]).is_err());
        assert!(check_arguments(&m, &[], &[Value::I64(1), Value::by_ref(Value::none())]).is_err());
    }

    #[test]
    fn generic_arguments_are_checked_after_closing() {
        let m = MethodDescriptor::new("Add")
            .generic(1)
            .param("a", TypeDesc::Generic(0))
            .returns(TypeDesc::Generic(0));
        assert!(check_arguments(&m, &[TypeDesc::F64], &[Value::F64(1.0)]).is_ok());
        assert!(check_arguments(&m, &[TypeDesc::I32], &[Value::F64(1.0)]).is_err());
        assert!(check_arguments(&m, &[], &[Value::F64(1.0)]).is_err());
    }
}
