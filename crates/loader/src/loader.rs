use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use dlbind_core::{Error, Result};
use libloading::{Library, Symbol};

/// Opaque handle of an opened library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(usize);

impl LibraryHandle {
    pub fn from_raw(raw: usize) -> Self {
        LibraryHandle(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// Address of a resolved symbol. Never null.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    pub fn new(address: usize) -> Option<Self> {
        (address != 0).then_some(SymbolAddress(address))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:#x})", self.0)
    }
}

pub trait LibraryLoader: Send + Sync {
    /// Opens the library at `path`, or the running process for `None`.
    fn load_library(&self, path: Option<&Path>) -> Result<LibraryHandle>;

    /// Closes a handle returned by `load_library`.
    fn close_library(&self, handle: LibraryHandle) -> bool;
}

pub trait SymbolLoader: Send + Sync {
    fn load_symbol(&self, library: LibraryHandle, symbol: &str) -> Result<SymbolAddress>;
}

/// A loader for both libraries and their symbols.
pub trait PlatformLoader: LibraryLoader + SymbolLoader {}

impl<T: LibraryLoader + SymbolLoader + ?Sized> PlatformLoader for T {}

/// Loader backed by the operating system's dynamic linker.
#[derive(Default)]
pub struct DefaultPlatformLoader {
    libraries: Mutex<HashMap<usize, Library>>,
    next: AtomicUsize,
}

impl DefaultPlatformLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(path: Option<&Path>) -> std::result::Result<Library, libloading::Error> {
        match path {
            // SAFETY: running library initialisers is inherent to loading a
            // native library.
            Some(path) => unsafe { Library::new(path) },
            None => this_process(),
        }
    }
}

#[cfg(unix)]
fn this_process() -> std::result::Result<Library, libloading::Error> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_process() -> std::result::Result<Library, libloading::Error> {
    Ok(libloading::os::windows::Library::this()?.into())
}

impl LibraryLoader for DefaultPlatformLoader {
    fn load_library(&self, path: Option<&Path>) -> Result<LibraryHandle> {
        let library = Self::open(path).map_err(|e| Error::LibraryLoading {
            path: path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("<process>")),
            source: Box::new(e),
        })?;
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, library);
        log::debug!("opened {:?} as handle {id}", path);
        Ok(LibraryHandle(id))
    }

    fn close_library(&self, handle: LibraryHandle) -> bool {
        let library = self
            .libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
        match library.map(Library::close) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log::warn!("failed to close library handle {}: {e}", handle.0);
                false
            }
            None => false,
        }
    }
}

impl SymbolLoader for DefaultPlatformLoader {
    fn load_symbol(&self, library: LibraryHandle, symbol: &str) -> Result<SymbolAddress> {
        let libraries = self.libraries.lock().unwrap_or_else(PoisonError::into_inner);
        let lib = libraries.get(&library.0).ok_or_else(|| Error::SymbolLoading {
            symbol: symbol.to_string(),
            source: format!("library handle {} is not open", library.0).into(),
        })?;
        let mut name = symbol.as_bytes().to_vec();
        name.push(0);
        // SAFETY: the symbol is only read as an address here.
        let address = unsafe { lib.get::<*mut c_void>(&name) }
            .map(|sym: Symbol<'_, *mut c_void>| *sym as usize)
            .map_err(|e| Error::SymbolLoading {
                symbol: symbol.to_string(),
                source: Box::new(e),
            })?;
        SymbolAddress::new(address).ok_or_else(|| Error::SymbolLoading {
            symbol: symbol.to_string(),
            source: "symbol resolved to a null address".into(),
        })
    }
}
