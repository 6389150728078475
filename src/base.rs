use std::fmt;
use std::sync::Arc;

use dlbind_core::{TypeIdentity, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::library::NativeLibrary;

/// A managed method body. It receives the instance so it can call native
/// members.
pub type ManagedMethod = Arc<dyn Fn(&NativeLibrary, &[Value]) -> anyhow::Result<Value> + Send + Sync>;
pub type ManagedGetter = Arc<dyn Fn(&NativeLibrary) -> anyhow::Result<Value> + Send + Sync>;
pub type ManagedSetter = Arc<dyn Fn(&NativeLibrary, Value) -> anyhow::Result<()> + Send + Sync>;

/// The class an implementation derives from. Members it implements are
/// used instead of native bindings.
pub struct BaseType {
    id: TypeIdentity,
    name: String,
    is_abstract: bool,
    methods: IndexMap<String, ManagedMethod>,
    getters: IndexMap<String, ManagedGetter>,
    setters: IndexMap<String, ManagedSetter>,
}

static NATIVE_LIBRARY: Lazy<Arc<BaseType>> = Lazy::new(|| BaseType::builder("NativeLibraryBase").build());

impl BaseType {
    pub fn builder(name: impl Into<String>) -> BaseTypeBuilder {
        BaseTypeBuilder {
            name: name.into(),
            is_abstract: true,
            methods: IndexMap::new(),
            getters: IndexMap::new(),
            setters: IndexMap::new(),
        }
    }

    /// The base of plain interface activations. It implements nothing.
    pub fn native_library() -> Arc<BaseType> {
        NATIVE_LIBRARY.clone()
    }

    pub fn id(&self) -> TypeIdentity {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub(crate) fn is_default(&self) -> bool {
        self.id == NATIVE_LIBRARY.id
    }

    pub(crate) fn method(&self, name: &str) -> Option<&ManagedMethod> {
        self.methods.get(name)
    }

    pub(crate) fn getter(&self, name: &str) -> Option<&ManagedGetter> {
        self.getters.get(name)
    }

    pub(crate) fn setter(&self, name: &str) -> Option<&ManagedSetter> {
        self.setters.get(name)
    }
}

impl fmt::Debug for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct BaseTypeBuilder {
    name: String,
    is_abstract: bool,
    methods: IndexMap<String, ManagedMethod>,
    getters: IndexMap<String, ManagedGetter>,
    setters: IndexMap<String, ManagedSetter>,
}

impl BaseTypeBuilder {
    /// Marks the type concrete. Concrete types cannot be activated.
    pub fn concrete(mut self) -> Self {
        self.is_abstract = false;
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&NativeLibrary, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(body));
        self
    }

    pub fn getter(
        mut self,
        property: impl Into<String>,
        body: impl Fn(&NativeLibrary) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.getters.insert(property.into(), Arc::new(body));
        self
    }

    pub fn setter(
        mut self,
        property: impl Into<String>,
        body: impl Fn(&NativeLibrary, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setters.insert(property.into(), Arc::new(body));
        self
    }

    pub fn build(self) -> Arc<BaseType> {
        Arc::new(BaseType {
            id: TypeIdentity::next(),
            name: self.name,
            is_abstract: self.is_abstract,
            methods: self.methods,
            getters: self.getters,
            setters: self.setters,
        })
    }
}
