use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dlbind_core::{
    Error, ImplementationOptions, InterfaceDescriptor, MethodDescriptor, PropertyDescriptor,
    Result, TypeIdentity,
};
use indexmap::{IndexMap, IndexSet};

use crate::base::{BaseType, ManagedGetter, ManagedMethod, ManagedSetter};
use crate::call::CallInterface;
use crate::generators::property::{NativeProperty, PropertyGenerator};
use crate::library::BindingContext;
use crate::pipeline::{ImplementationPipeline, Invoker, PipelineWorkUnit};

/// Runtime type of a generated implementation.
///
/// Two instances share an id exactly when they were activated with the same
/// [`ImplementationKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImplementationTypeId(u64);

impl ImplementationTypeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ImplementationTypeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ImplementationTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything that selects a generated implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplementationKey {
    pub base: TypeIdentity,
    pub interfaces: Vec<TypeIdentity>,
    pub library: PathBuf,
    pub options: ImplementationOptions,
}

/// Symbol and signature of a statically bound call.
pub(crate) struct StaticBinding {
    pub symbol: usize,
    pub signature: Arc<CallInterface>,
}

/// Per-artifact tables filled in while the pipeline runs.
#[derive(Default)]
pub(crate) struct ArtifactBuilder {
    symbols: IndexSet<String>,
    bindings: Vec<StaticBinding>,
}

impl ArtifactBuilder {
    /// Slot of `name` in the instance symbol table.
    pub fn symbol(&mut self, name: &str) -> usize {
        self.symbols.insert_full(name.to_string()).0
    }

    pub fn binding(&mut self, symbol: usize, signature: Arc<CallInterface>) -> usize {
        self.bindings.push(StaticBinding { symbol, signature });
        self.bindings.len() - 1
    }

    #[cfg(test)]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

pub(crate) enum MethodImpl {
    Native {
        descriptor: MethodDescriptor,
        symbol: String,
        invoker: Invoker,
    },
    Managed(ManagedMethod),
}

pub(crate) enum PropertyImpl {
    Native {
        descriptor: PropertyDescriptor,
        accessor: NativeProperty,
    },
    Managed {
        descriptor: PropertyDescriptor,
        getter: Option<ManagedGetter>,
        setter: Option<ManagedSetter>,
    },
}

impl PropertyImpl {
    pub fn descriptor(&self) -> &PropertyDescriptor {
        match self {
            PropertyImpl::Native { descriptor, .. } | PropertyImpl::Managed { descriptor, .. } => descriptor,
        }
    }
}

/// A generated binding artifact, shared by every instance activated with
/// the same key.
pub struct GeneratedImplementation {
    id: ImplementationTypeId,
    name: String,
    key: ImplementationKey,
    pub(crate) methods: IndexMap<String, MethodImpl>,
    pub(crate) properties: IndexMap<String, PropertyImpl>,
    pub(crate) symbols: Vec<String>,
    pub(crate) bindings: Vec<StaticBinding>,
}

impl GeneratedImplementation {
    pub fn id(&self) -> ImplementationTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ImplementationKey {
        &self.key
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Native symbols this implementation resolves, in slot order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub(crate) fn generate(
        key: ImplementationKey,
        base: &BaseType,
        interfaces: &[Arc<InterfaceDescriptor>],
        context: &BindingContext,
    ) -> Result<GeneratedImplementation> {
        let options = key.options;
        let pipeline = ImplementationPipeline::baseline(context.transformers.clone(), options);
        let properties_generator = PropertyGenerator;
        let mut artifact = ArtifactBuilder::default();
        let mut methods = IndexMap::new();
        let mut properties = IndexMap::new();

        for interface in interfaces {
            for (declaring, method) in interface.all_methods() {
                if let Some(managed) = base.method(&method.name) {
                    log::trace!("`{}` is managed by `{}`", method.name, base.name());
                    methods
                        .entry(method.name.clone())
                        .or_insert_with(|| MethodImpl::Managed(managed.clone()));
                    continue;
                }
                let symbol = context.symbol_transformer.method_symbol(declaring, method)?;
                let name = match methods.get(&method.name) {
                    None => method.name.clone(),
                    Some(MethodImpl::Native {
                        descriptor,
                        symbol: existing,
                        ..
                    }) if descriptor.same_signature(method) && *existing == symbol => {
                        log::trace!("folding duplicate declaration of `{}`", method.name);
                        continue;
                    }
                    Some(_) => format!("{}.{}", declaring.name, method.name),
                };
                if methods.contains_key(&name) {
                    return Err(Error::InvalidDescriptor(format!(
                        "`{name}` is declared more than once"
                    )));
                }
                let unit = PipelineWorkUnit {
                    interface: declaring.name.clone(),
                    naming: declaring.native_symbols.clone(),
                    symbol: symbol.clone(),
                    member: method.clone(),
                    options,
                };
                let invoker = pipeline.generate(unit, &mut artifact)?;
                methods.insert(
                    name,
                    MethodImpl::Native {
                        descriptor: method.clone(),
                        symbol,
                        invoker,
                    },
                );
            }

            for (declaring, property) in interface.all_properties() {
                if properties.contains_key(&property.name) {
                    continue;
                }
                let getter = base.getter(&property.name).filter(|_| property.can_read);
                let setter = base.setter(&property.name).filter(|_| property.can_write);
                let managed = usize::from(getter.is_some()) + usize::from(setter.is_some());
                let accessors = usize::from(property.can_read) + usize::from(property.can_write);
                let implementation = if managed == 0 {
                    let symbol = context.symbol_transformer.property_symbol(declaring, property)?;
                    PropertyImpl::Native {
                        descriptor: property.clone(),
                        accessor: properties_generator.generate(property, &symbol, options, &mut artifact)?,
                    }
                } else if managed == accessors {
                    PropertyImpl::Managed {
                        descriptor: property.clone(),
                        getter: getter.cloned(),
                        setter: setter.cloned(),
                    }
                } else {
                    return Err(Error::PartiallyManagedProperty {
                        name: property.name.clone(),
                    });
                };
                properties.insert(property.name.clone(), implementation);
            }
        }

        let id = ImplementationTypeId::next();
        let name = format!("{}_{id}", type_stem(base, interfaces));
        log::debug!(
            "generated `{name}` with {} methods, {} properties and {} symbols",
            methods.len(),
            properties.len(),
            artifact.symbols.len()
        );
        Ok(GeneratedImplementation {
            id,
            name,
            key,
            methods,
            properties,
            symbols: artifact.symbols.into_iter().collect(),
            bindings: artifact.bindings,
        })
    }
}

impl fmt::Debug for GeneratedImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImplementation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("symbols", &self.symbols)
            .finish()
    }
}

fn type_stem(base: &BaseType, interfaces: &[Arc<InterfaceDescriptor>]) -> String {
    if !base.is_default() {
        return base.name().to_string();
    }
    let name = interfaces.first().map(|i| i.name.as_str()).unwrap_or_default();
    match name.strip_prefix('I') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest.to_string(),
        _ => format!("Generated_{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        let base = BaseType::native_library();
        let lib = InterfaceDescriptor::builder("ILibrary").build();
        assert_eq!(type_stem(&base, &[lib]), "Library");
        let plain = InterfaceDescriptor::builder("Ident").build();
        assert_eq!(type_stem(&base, &[plain]), "Generated_Ident");
        let mixed = BaseType::builder("MixedModeClass").build();
        assert_eq!(type_stem(&mixed, &[]), "MixedModeClass");
    }

    #[test]
    fn symbols_are_interned() {
        let mut artifact = ArtifactBuilder::default();
        assert_eq!(artifact.symbol("a"), 0);
        assert_eq!(artifact.symbol("b"), 1);
        assert_eq!(artifact.symbol("a"), 0);
    }
}
