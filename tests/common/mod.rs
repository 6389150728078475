#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dlbind::{
    Error, ImplementationCache, ImplementationOptions, LibraryHandle, LibraryLoader,
    NativeLibraryBuilder, Result, SymbolAddress, SymbolLoader,
};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A "library" whose symbols are functions and statics of the test binary.
#[derive(Default)]
pub struct TestLibrary {
    symbols: Mutex<HashMap<String, usize>>,
    next: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    lookups: Mutex<HashMap<String, usize>>,
}

impl TestLibrary {
    pub fn new<'a>(symbols: impl IntoIterator<Item = (&'a str, usize)>) -> Arc<TestLibrary> {
        let lib = TestLibrary::default();
        for (name, address) in symbols {
            lib.define(name, address);
        }
        Arc::new(lib)
    }

    pub fn define(&self, name: &str, address: usize) {
        self.symbols.lock().unwrap().insert(name.to_string(), address);
    }

    /// How often `name` was resolved.
    pub fn lookups(&self, name: &str) -> usize {
        self.lookups.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for TestLibrary {
    fn load_library(&self, path: Option<&Path>) -> Result<LibraryHandle> {
        assert!(path.is_some());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(LibraryHandle::from_raw(self.next.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn close_library(&self, _handle: LibraryHandle) -> bool {
        self.closed.fetch_add(1, Ordering::SeqCst);
        true
    }
}

impl SymbolLoader for TestLibrary {
    fn load_symbol(&self, _library: LibraryHandle, symbol: &str) -> Result<SymbolAddress> {
        *self.lookups.lock().unwrap().entry(symbol.to_string()).or_default() += 1;
        self.symbols
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .and_then(SymbolAddress::new)
            .ok_or_else(|| Error::SymbolLoading {
                symbol: symbol.to_string(),
                source: "not exported by the test library".into(),
            })
    }
}

/// A builder over `lib` with its own implementation cache.
pub fn builder(lib: &Arc<TestLibrary>, options: ImplementationOptions) -> NativeLibraryBuilder {
    NativeLibraryBuilder::new(options)
        .with_platform_loader(lib.clone())
        .with_cache(Arc::new(ImplementationCache::new()))
}

/// An existing file to stand in for the library on disk.
pub fn library_path() -> String {
    std::env::current_exe()
        .expect("test binary path")
        .to_string_lossy()
        .into_owned()
}
