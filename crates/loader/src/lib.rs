//! Platform seams of the dlbind binding generator: opening libraries,
//! resolving their symbols, and finding them on disk.

mod loader;
mod resolver;

pub use loader::{
    DefaultPlatformLoader, LibraryHandle, LibraryLoader, PlatformLoader, SymbolAddress, SymbolLoader,
};
pub use resolver::{candidate_names, DynamicLibraryPathResolver, LibraryPathResolver};
