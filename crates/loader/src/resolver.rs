use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dlbind_core::{Error, Result};

/// Turns a library name or path into the absolute path of an existing file.
pub trait LibraryPathResolver: Send + Sync {
    fn resolve(&self, library: &str) -> Result<PathBuf>;
}

#[cfg(target_os = "macos")]
const SUFFIX: &str = ".dylib";
#[cfg(all(unix, not(target_os = "macos")))]
const SUFFIX: &str = ".so";
#[cfg(windows)]
const SUFFIX: &str = ".dll";

/// File names a library may go by on this platform, most specific first.
///
/// `foo` becomes `foo`, `foo.so`, `libfoo` and `libfoo.so` on Linux, and
/// `foo` and `foo.dll` on Windows.
pub fn candidate_names(library: &str) -> Vec<String> {
    let mut names = vec![library.to_string()];
    let has_suffix = library.ends_with(SUFFIX) || library.contains(&format!("{SUFFIX}."));
    if !has_suffix {
        names.push(format!("{library}{SUFFIX}"));
    }
    if cfg!(unix) && !library.starts_with("lib") {
        names.push(format!("lib{library}"));
        if !has_suffix {
            names.push(format!("lib{library}{SUFFIX}"));
        }
    }
    names
}

/// Resolver following the dynamic linker's conventions.
///
/// Explicit paths are checked directly. Bare names are searched for in any
/// extra directories, then next to the running executable and in the working
/// directory, then in the platform's search lists.
#[derive(Debug, Clone, Default)]
pub struct DynamicLibraryPathResolver {
    extra: Vec<PathBuf>,
}

impl DynamicLibraryPathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches `dir` before every other location.
    pub fn with_search_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra.push(dir.into());
        self
    }

    fn local_directories() -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
            dirs.push(dir);
        }
        if let Ok(dir) = env::current_dir() {
            dirs.push(dir);
        }
        dirs
    }

    fn search_directories(&self) -> Vec<PathBuf> {
        let mut dirs = self.extra.clone();
        dirs.extend(Self::local_directories());
        dirs.extend(platform::search_directories());
        let mut seen = std::collections::HashSet::new();
        dirs.retain(|d| seen.insert(d.clone()));
        dirs
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(fs::canonicalize(&path).unwrap_or(path))
    } else {
        None
    }
}

impl LibraryPathResolver for DynamicLibraryPathResolver {
    fn resolve(&self, library: &str) -> Result<PathBuf> {
        let as_path = Path::new(library);
        let mut searched = Vec::new();

        if as_path.is_absolute() || as_path.components().count() > 1 {
            let dir = as_path.parent().unwrap_or(Path::new(""));
            let file = as_path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or(library);
            for name in candidate_names(file) {
                let candidate = dir.join(name);
                searched.push(candidate.clone());
                if let Some(found) = existing(candidate) {
                    log::trace!("resolved `{library}` to {}", found.display());
                    return Ok(found);
                }
            }
            return Err(Error::LibraryNotFound {
                library: library.to_string(),
                searched,
            });
        }

        let names = candidate_names(library);
        for dir in self.search_directories() {
            for name in &names {
                let candidate = dir.join(name);
                searched.push(candidate.clone());
                if let Some(found) = existing(candidate) {
                    log::trace!("resolved `{library}` to {}", found.display());
                    return Ok(found);
                }
            }
        }
        for name in &names {
            if let Some(found) = platform::cached(name) {
                return Ok(found);
            }
        }
        Err(Error::LibraryNotFound {
            library: library.to_string(),
            searched,
        })
    }
}

fn split_env(var: &str) -> Vec<PathBuf> {
    env::var_os(var)
        .map(|v| env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default()
}

#[cfg(all(unix, not(target_os = "macos")))]
mod platform {
    use super::*;

    pub fn search_directories() -> Vec<PathBuf> {
        let mut dirs = split_env("LD_LIBRARY_PATH");
        let multiarch = format!("{}-linux-gnu", env::consts::ARCH);
        for root in ["/lib", "/usr/lib"] {
            dirs.push(PathBuf::from(root).join(&multiarch));
        }
        dirs.extend(
            ["/lib64", "/usr/lib64", "/lib", "/usr/lib", "/usr/local/lib"]
                .into_iter()
                .map(PathBuf::from),
        );
        dirs
    }

    /// Looks `name` up in the dynamic linker cache. Entries are NUL
    /// separated strings; absolute paths among them are candidates.
    pub fn cached(name: &str) -> Option<PathBuf> {
        let cache = fs::read("/etc/ld.so.cache").ok()?;
        cache
            .split(|b| *b == 0)
            .filter(|entry| entry.first() == Some(&b'/'))
            .filter_map(|entry| std::str::from_utf8(entry).ok())
            .map(Path::new)
            .find(|path| path.file_name().and_then(|f| f.to_str()) == Some(name))
            .and_then(|path| existing(path.to_path_buf()))
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;

    pub fn search_directories() -> Vec<PathBuf> {
        let mut dirs = split_env("DYLD_FRAMEWORK_PATH");
        dirs.extend(split_env("DYLD_LIBRARY_PATH"));
        dirs.extend(split_env("DYLD_FALLBACK_LIBRARY_PATH"));
        dirs.extend(["/usr/local/lib", "/usr/lib"].into_iter().map(PathBuf::from));
        dirs
    }

    pub fn cached(_name: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(windows)]
mod platform {
    use super::*;

    pub fn search_directories() -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(root) = env::var_os("SystemRoot") {
            let root = PathBuf::from(root);
            dirs.push(root.join("System32"));
            dirs.push(root);
        }
        dirs.extend(split_env("PATH"));
        dirs
    }

    pub fn cached(_name: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn unix_candidates() {
        assert_eq!(candidate_names("foo"), ["foo", "foo.so", "libfoo", "libfoo.so"]);
        assert_eq!(candidate_names("libfoo.so"), ["libfoo.so"]);
        assert_eq!(candidate_names("libc.so.6"), ["libc.so.6"]);
        assert_eq!(candidate_names("foo.so"), ["foo.so", "libfoo.so"]);
    }

    #[test]
    fn finds_libraries_in_extra_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(candidate_names("dlbindtest").pop().unwrap());
        fs::write(&file, b"").unwrap();
        let resolver = DynamicLibraryPathResolver::new().with_search_directory(dir.path());
        let found = resolver.resolve("dlbindtest").unwrap();
        assert_eq!(found, fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn explicit_paths_are_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.bin");
        fs::write(&file, b"").unwrap();
        let found = DynamicLibraryPathResolver::new()
            .resolve(file.to_str().unwrap())
            .unwrap();
        assert_eq!(found, fs::canonicalize(&file).unwrap());

        let missing = dir.path().join("missing");
        let err = DynamicLibraryPathResolver::new()
            .resolve(missing.to_str().unwrap())
            .unwrap_err();
        match err {
            Error::LibraryNotFound { searched, .. } => {
                assert!(searched.iter().all(|p| p.starts_with(dir.path())))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_names_are_not_found() {
        let err = DynamicLibraryPathResolver::new()
            .resolve("no-such-library-dlbind")
            .unwrap_err();
        assert!(matches!(err, Error::LibraryNotFound { .. }));
    }
}
