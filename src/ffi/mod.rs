//! Native call plumbing
//!
//! Resolves symbols in shared libraries and transfers control to them.
//!
//! # Architecture
//!
//! ```text
//! InterfaceDefinition (library + method names)
//!       │
//!       ▼
//! SymbolResolver ── LibraryLoader (libloading, search paths, aliases)
//!       │
//!       ▼
//! CallSite (converted arguments + CallDescriptor)
//!       │
//!       ▼
//! RawInvoker ── RegisterInvoker (integer-class arity table)
//!            └─ LibffiInvoker   (feature "libffi": all layouts)
//! ```

mod loader;
mod raw;

#[cfg(feature = "libffi")]
mod libffi_invoker;

pub use loader::{DynamicLibrary, LibraryLoader};
pub use raw::{
    FnInvoker, RawInvoker, RegisterInvoker, SymbolResolver, SymbolTable, MAX_REGISTER_ARGS,
};

#[cfg(feature = "libffi")]
pub use libffi_invoker::LibffiInvoker;

use std::sync::Arc;

use crate::config::Backend;

/// Raw invoker for the configured backend
pub fn invoker_for(backend: Backend) -> crate::error::Result<Arc<dyn RawInvoker>> {
    match backend {
        Backend::Register => Ok(Arc::new(RegisterInvoker::new())),
        #[cfg(feature = "libffi")]
        Backend::Libffi => Ok(Arc::new(LibffiInvoker::new())),
        #[cfg(not(feature = "libffi"))]
        Backend::Libffi => Err(crate::config::ConfigError::Invalid(
            "backend 'libffi' requires building with the libffi feature".to_string(),
        )
        .into()),
    }
}
