use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dlbind_core::{Result, SymbolNameTransformer, TypeTransformerRepository};
use once_cell::sync::Lazy;

use crate::implementation::{GeneratedImplementation, ImplementationKey};
use crate::library::BindingContext;

/// Identity of the collaborators an implementation was generated with.
///
/// Symbol names and marshalling are baked into a generated implementation,
/// so builders configured with different transformers never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Collaborators {
    symbols: usize,
    transformers: usize,
}

impl Collaborators {
    fn of(context: &BindingContext) -> Self {
        Collaborators {
            symbols: Arc::as_ptr(&context.symbol_transformer) as *const () as usize,
            transformers: Arc::as_ptr(&context.transformers) as usize,
        }
    }
}

/// Implementations generated with one set of collaborators. Holding the
/// collaborators keeps their addresses from being reused by others.
struct Partition {
    _symbols: Arc<dyn SymbolNameTransformer>,
    _transformers: Arc<TypeTransformerRepository>,
    entries: HashMap<ImplementationKey, Arc<GeneratedImplementation>>,
}

/// Generated implementations by identity key.
///
/// Lookups only take the read lock. Generating a missing entry happens under
/// a single build lock, so concurrent first requests for a key all receive
/// the same artifact.
#[derive(Default)]
pub struct ImplementationCache {
    partitions: RwLock<HashMap<Collaborators, Partition>>,
    build: Mutex<()>,
}

impl ImplementationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by default configured builders.
    pub fn shared() -> Arc<ImplementationCache> {
        static SHARED: Lazy<Arc<ImplementationCache>> = Lazy::new(|| Arc::new(ImplementationCache::new()));
        SHARED.clone()
    }

    fn get(&self, collaborators: Collaborators, key: &ImplementationKey) -> Option<Arc<GeneratedImplementation>> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collaborators)
            .and_then(|partition| partition.entries.get(key))
            .cloned()
    }

    pub(crate) fn get_or_create(
        &self,
        context: &BindingContext,
        key: &ImplementationKey,
        generate: impl FnOnce() -> Result<GeneratedImplementation>,
    ) -> Result<Arc<GeneratedImplementation>> {
        let collaborators = Collaborators::of(context);
        if let Some(hit) = self.get(collaborators, key) {
            log::debug!("cache hit for `{}`", hit.name());
            return Ok(hit);
        }
        let _build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = self.get(collaborators, key) {
            log::debug!("`{}` was generated concurrently", hit.name());
            return Ok(hit);
        }
        log::debug!("cache miss for {key:?}");
        let generated = Arc::new(generate()?);
        self.partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collaborators)
            .or_insert_with(|| Partition {
                _symbols: context.symbol_transformer.clone(),
                _transformers: context.transformers.clone(),
                entries: HashMap::new(),
            })
            .entries
            .insert(key.clone(), generated.clone());
        Ok(generated)
    }

    /// Number of generated implementations across all collaborator sets.
    pub fn len(&self) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|partition| partition.entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
