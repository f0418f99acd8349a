//! Dynamic Library Loader
//!
//! Safe wrapper around libloading for loading shared libraries and resolving
//! function addresses.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use parking_lot::Mutex;
use tracing::info;

use crate::config::LibraryConfig;
use crate::error::{InvokerError, Result};

use super::SymbolResolver;

/// Library names that refer to the C runtime the process is linked against
const C_RUNTIME_NAMES: [&str; 3] = ["c", "stdlib", "libc"];

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Path to the library (or a marker for the running process)
    path: PathBuf,
    /// The loaded library handle
    library: Library,
    /// Cached function symbols
    symbols: HashMap<String, usize>,
}

impl DynamicLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading a library runs its initializers; the caller chose
        // which library to trust.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                InvokerError::LibraryLoad(format!("'{}': {}", path.display(), e))
            })?
        };

        Ok(Self {
            path,
            library,
            symbols: HashMap::new(),
        })
    }

    /// Symbols of the running process, which include the linked C runtime
    pub fn c_runtime() -> Result<Self> {
        #[cfg(unix)]
        let library: Library = libloading::os::unix::Library::this().into();

        #[cfg(windows)]
        let library: Library = unsafe {
            Library::new("msvcrt.dll")
                .map_err(|e| InvokerError::LibraryLoad(format!("'msvcrt.dll': {}", e)))?
        };

        Ok(Self {
            path: PathBuf::from("<c runtime>"),
            library,
            symbols: HashMap::new(),
        })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a function symbol by name
    pub fn get_symbol(&mut self, name: &str) -> Result<usize> {
        if let Some(&addr) = self.symbols.get(name) {
            return Ok(addr);
        }

        let not_found = || InvokerError::SymbolNotFound {
            library: self.path.display().to_string(),
            name: name.to_string(),
        };
        let c_name = CString::new(name).map_err(|_| not_found())?;

        // Safety: the address is only ever called through a call site whose
        // signature the caller declared for this symbol.
        let symbol: Symbol<*const ()> =
            unsafe { self.library.get(c_name.as_bytes_with_nul()).map_err(|_| not_found())? };

        let addr = *symbol as usize;
        if addr == 0 {
            return Err(not_found());
        }
        self.symbols.insert(name.to_string(), addr);
        Ok(addr)
    }
}

/// Library loader with search paths and aliases
pub struct LibraryLoader {
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
    /// Logical names mapped to file names or paths
    aliases: HashMap<String, String>,
    /// Loaded libraries
    libraries: Mutex<HashMap<String, Arc<Mutex<DynamicLibrary>>>>,
}

impl LibraryLoader {
    /// Create a new library loader
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            aliases: HashMap::new(),
            libraries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a loader with the configured search paths (searched first) and aliases
    pub fn from_config(config: &LibraryConfig) -> Self {
        let mut loader = Self::new();
        let mut paths = config.search_paths.clone();
        paths.append(&mut loader.search_paths);
        loader.search_paths = paths;
        loader.aliases = config.aliases.clone();
        loader
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Map a logical library name to a file name or path
    pub fn add_alias(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(name.into(), target.into());
    }

    /// Find a library by name
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);

        let path = Path::new(name);
        if path.exists() {
            return Some(path.to_path_buf());
        }

        for candidate in [name.to_string(), library_filename(name)] {
            for search_path in &self.search_paths {
                let full_path = search_path.join(&candidate);
                if full_path.exists() {
                    return Some(full_path);
                }
            }
        }

        None
    }

    /// Load a library by name, reusing an earlier load
    pub fn load(&self, name: &str) -> Result<Arc<Mutex<DynamicLibrary>>> {
        let mut libraries = self.libraries.lock();
        if let Some(lib) = libraries.get(name) {
            return Ok(Arc::clone(lib));
        }

        let library = if !self.aliases.contains_key(name) && C_RUNTIME_NAMES.contains(&name) {
            DynamicLibrary::c_runtime()?
        } else {
            let path = self
                .find_library(name)
                .ok_or_else(|| InvokerError::LibraryLoad(format!("library '{}' not found", name)))?;
            DynamicLibrary::load(&path)?
        };
        info!(library = name, path = %library.path().display(), "opened native library");

        let lib = Arc::new(Mutex::new(library));
        libraries.insert(name.to_string(), Arc::clone(&lib));
        Ok(lib)
    }

    /// Get a loaded library
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<DynamicLibrary>>> {
        self.libraries.lock().get(name).cloned()
    }

    /// Unload a library
    pub fn unload(&self, name: &str) -> bool {
        self.libraries.lock().remove(name).is_some()
    }

    /// List loaded libraries
    pub fn loaded_libraries(&self) -> Vec<String> {
        self.libraries.lock().keys().cloned().collect()
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver for LibraryLoader {
    fn resolve(&self, library: &str, name: &str) -> Result<usize> {
        if library.is_empty() {
            return Err(InvokerError::LibraryLoad(
                "no native library specified".to_string(),
            ));
        }
        let lib = self.load(library)?;
        let mut lib = lib.lock();
        lib.get_symbol(name).map_err(|e| match e {
            InvokerError::SymbolNotFound { name, .. } => InvokerError::SymbolNotFound {
                library: library.to_string(),
                name,
            },
            other => other,
        })
    }
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Current directory
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));
        paths.push(PathBuf::from("/lib64"));
        paths.push(PathBuf::from("/usr/lib64"));
        #[cfg(target_arch = "x86_64")]
        {
            paths.push(PathBuf::from("/lib/x86_64-linux-gnu"));
            paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu"));
        }
        #[cfg(target_arch = "aarch64")]
        {
            paths.push(PathBuf::from("/lib/aarch64-linux-gnu"));
            paths.push(PathBuf::from("/usr/lib/aarch64-linux-gnu"));
        }

        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(ld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));

        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(dyld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Windows\\System32"));

        if let Ok(path) = std::env::var("PATH") {
            paths.extend(path.split(';').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    paths
}

/// Construct the platform-specific library filename
fn library_filename(name: &str) -> String {
    #[cfg(target_os = "linux")]
    {
        if name.starts_with("lib") && name.contains(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        name.to_string()
    }
}
