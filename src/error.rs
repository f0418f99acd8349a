//! Error types shared by every ffinvoke component.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while building or performing native calls.
#[derive(Debug, Error)]
pub enum InvokerError {
    /// No layout or converter can be derived for a logical type
    #[error("unsupported type {ty} ({position})")]
    UnsupportedType { ty: String, position: String },

    /// The library does not export the requested symbol
    #[error("symbol '{name}' not found in library '{library}'")]
    SymbolNotFound { library: String, name: String },

    /// The library itself could not be opened
    #[error("failed to load library: {0}")]
    LibraryLoad(String),

    /// Inconsistent field ordering or a field type that cannot be copied directly
    #[error("invalid structure definition: {0}")]
    StructureDefinition(String),

    /// A value cannot be transformed by its converter
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// The raw call mechanism reported a failure
    #[error("native call failed: {0}")]
    NativeCall(String),

    /// A converter is already bound to this logical type
    #[error("a converter is already registered for {0}")]
    DuplicateConverter(String),

    #[error("invalid argument count: expected {expected}, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("interface '{interface}' has no method '{method}' accepting these arguments")]
    UnknownMethod { interface: String, method: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl InvokerError {
    pub(crate) fn unsupported(ty: impl ToString, position: impl Into<String>) -> Self {
        InvokerError::UnsupportedType {
            ty: ty.to_string(),
            position: position.into(),
        }
    }

    /// Whether this error belongs to the setup phase (registration, validation,
    /// structure description) rather than to a single invocation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            InvokerError::UnsupportedType { .. }
                | InvokerError::StructureDefinition(_)
                | InvokerError::DuplicateConverter(_)
                | InvokerError::Config(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InvokerError>;
