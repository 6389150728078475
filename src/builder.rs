use std::path::PathBuf;
use std::sync::Arc;

use dlbind_core::{
    DefaultSymbolTransformer, Error, ImplementationOptions, InterfaceDescriptor, Result,
    SymbolNameTransformer, TypeTransformerRepository,
};
use dlbind_loader::{
    DefaultPlatformLoader, DynamicLibraryPathResolver, LibraryLoader, LibraryPathResolver,
    PlatformLoader, SymbolLoader,
};
use once_cell::sync::Lazy;

use crate::base::BaseType;
use crate::cache::ImplementationCache;
use crate::implementation::{GeneratedImplementation, ImplementationKey};
use crate::library::{BindingContext, LoadedLibrary, NativeLibrary};

/// Rewrites library names before they are resolved, in the manner of a
/// Mono dllmap. Only consulted with `ENABLE_DLL_MAP_SUPPORT`.
pub trait LibraryNameRemapper: Send + Sync {
    fn remap(&self, library: &str) -> Option<String>;
}

impl<F> LibraryNameRemapper for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn remap(&self, library: &str) -> Option<String> {
        self(library)
    }
}

static DEFAULT_LOADER: Lazy<Arc<DefaultPlatformLoader>> = Lazy::new(|| Arc::new(DefaultPlatformLoader::new()));
static DEFAULT_SYMBOLS: Lazy<Arc<dyn SymbolNameTransformer>> =
    Lazy::new(|| Arc::new(DefaultSymbolTransformer::default()));

/// Activates described interfaces against native libraries.
///
/// ```ignore
/// let lib = NativeLibraryBuilder::default().activate_interface("libm", &imath)?;
/// let r = lib.invoke("cos", vec![0.0f64.into()])?;
/// ```
#[derive(Clone)]
pub struct NativeLibraryBuilder {
    options: ImplementationOptions,
    library_loader: Arc<dyn LibraryLoader>,
    symbol_loader: Arc<dyn SymbolLoader>,
    path_resolver: Arc<dyn LibraryPathResolver>,
    symbol_transformer: Arc<dyn SymbolNameTransformer>,
    transformers: Arc<TypeTransformerRepository>,
    cache: Arc<ImplementationCache>,
    remapper: Option<Arc<dyn LibraryNameRemapper>>,
}

impl Default for NativeLibraryBuilder {
    fn default() -> Self {
        Self::new(ImplementationOptions::default())
    }
}

impl NativeLibraryBuilder {
    pub fn new(options: ImplementationOptions) -> Self {
        let loader = DEFAULT_LOADER.clone();
        NativeLibraryBuilder {
            options,
            library_loader: loader.clone(),
            symbol_loader: loader,
            path_resolver: Arc::new(DynamicLibraryPathResolver::new()),
            symbol_transformer: DEFAULT_SYMBOLS.clone(),
            transformers: TypeTransformerRepository::shared(),
            cache: ImplementationCache::shared(),
            remapper: None,
        }
    }

    pub fn options(&self) -> ImplementationOptions {
        self.options
    }

    pub fn with_options(mut self, options: ImplementationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_library_loader(mut self, loader: Arc<dyn LibraryLoader>) -> Self {
        self.library_loader = loader;
        self
    }

    pub fn with_symbol_loader(mut self, loader: Arc<dyn SymbolLoader>) -> Self {
        self.symbol_loader = loader;
        self
    }

    /// Uses `loader` for both libraries and symbols.
    pub fn with_platform_loader<L: PlatformLoader + 'static>(mut self, loader: Arc<L>) -> Self {
        self.library_loader = loader.clone();
        self.symbol_loader = loader;
        self
    }

    pub fn with_path_resolver(mut self, resolver: Arc<dyn LibraryPathResolver>) -> Self {
        self.path_resolver = resolver;
        self
    }

    pub fn with_symbol_transformer(mut self, transformer: Arc<dyn SymbolNameTransformer>) -> Self {
        self.symbol_transformer = transformer;
        self
    }

    pub fn with_transformers(mut self, transformers: Arc<TypeTransformerRepository>) -> Self {
        self.transformers = transformers;
        self
    }

    /// Uses a private implementation cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: Arc<ImplementationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_library_remapper(mut self, remapper: Arc<dyn LibraryNameRemapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    pub fn activate_interface(&self, library: &str, interface: &Arc<InterfaceDescriptor>) -> Result<NativeLibrary> {
        self.activate_class(library, &BaseType::native_library(), std::slice::from_ref(interface))
    }

    pub fn activate_interfaces(&self, library: &str, interfaces: &[Arc<InterfaceDescriptor>]) -> Result<NativeLibrary> {
        self.activate_class(library, &BaseType::native_library(), interfaces)
    }

    /// Activates `interfaces` on top of `base`, whose managed members take
    /// precedence over native bindings.
    pub fn activate_class(
        &self,
        library: &str,
        base: &Arc<BaseType>,
        interfaces: &[Arc<InterfaceDescriptor>],
    ) -> Result<NativeLibrary> {
        if interfaces.is_empty() {
            return Err(Error::NoInterfaces);
        }
        if let Some(class) = interfaces.iter().find(|i| !i.is_interface()) {
            return Err(Error::NotAnInterface {
                name: class.name.clone(),
            });
        }
        if !base.is_abstract() {
            return Err(Error::BaseNotAbstract {
                name: base.name().to_string(),
            });
        }

        let path = self.resolve(library)?;
        let key = ImplementationKey {
            base: base.id(),
            interfaces: interfaces.iter().map(|i| i.id()).collect(),
            library: path.clone(),
            options: self.options,
        };
        let context = Arc::new(BindingContext {
            transformers: self.transformers.clone(),
            symbol_transformer: self.symbol_transformer.clone(),
            cache: self.cache.clone(),
        });
        let implementation = self.cache.get_or_create(&context, &key, || {
            GeneratedImplementation::generate(key.clone(), base, interfaces, &context)
        })?;
        let loaded = LoadedLibrary::open(path, self.library_loader.clone(), self.symbol_loader.clone())?;
        NativeLibrary::activate(implementation, loaded, context)
    }

    fn resolve(&self, library: &str) -> Result<PathBuf> {
        let remapped = match &self.remapper {
            Some(remapper) if self.options.contains(ImplementationOptions::ENABLE_DLL_MAP_SUPPORT) => {
                remapper.remap(library)
            }
            _ => None,
        };
        if let Some(name) = &remapped {
            log::debug!("remapped `{library}` to `{name}`");
        }
        self.path_resolver.resolve(remapped.as_deref().unwrap_or(library))
    }
}
