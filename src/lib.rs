//! ffinvoke - Native Function Marshalling and Dynamic Dispatch
//!
//! Call functions exported by native shared libraries from a logical
//! interface description. Values are translated to and from native memory
//! representations automatically; the actual calling convention is delegated
//! to a pluggable raw-call backend.
//!
//! # Features
//!
//! - **Type converter registry**: one converter per logical type, with
//!   built-ins for primitives, strings, wide strings, primitive arrays,
//!   pointers, structures, and user native types
//! - **Layout resolver**: derives native width, alignment, and grouped
//!   layouts from logical types
//! - **Cached call sites**: one adapter per (symbol, signature), variadic
//!   calls with C default argument promotion
//! - **Structures**: field order from priorities or name lists, natural C
//!   alignment, write-before/read-after synchronization policies
//! - **Proxy dispatch**: interfaces declared as data or with
//!   [`native_interface!`], bound once and cached
//!
//! # Example
//!
//! ```no_run
//! use ffinvoke::callsite::FunctionSignature;
//! use ffinvoke::{LogicalType, NativeContext, Value};
//!
//! let context = NativeContext::new()?;
//! let strlen = FunctionSignature::new(vec![LogicalType::STRING], Some(LogicalType::I64));
//! let len = context.call("c", "strlen", &strlen, &mut [Value::from("hello")])?;
//! assert_eq!(len, Some(Value::I64(5)));
//! # Ok::<(), ffinvoke::InvokerError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   Dispatcher     │  interface method → cached call site
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │    CallSite      │────►│  LayoutResolver   │  logical type → native layout
//! └────────┬─────────┘     └─────────┬─────────┘
//!          │                         │
//!          │               ┌─────────┴─────────┐
//!          │               ▼                   ▼
//!          │      ┌────────────────┐  ┌─────────────────┐
//!          │      │ConverterRegistry│  │StructureEngine  │
//!          │      └────────────────┘  └─────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │   RawInvoker     │  register arity table / libffi
//! └──────────────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod callsite;
pub mod config;
pub mod context;
pub mod converter;
pub mod error;
pub mod ffi;
pub mod layout;
pub mod logging;
pub mod proxy;
pub mod structure;
pub mod types;

// Re-export commonly used types
pub use callsite::{CallDescriptor, CallSite, CallSiteCache, FunctionSignature};
pub use config::{Backend, ConfigError, InvokerConfig};
pub use context::{NativeContext, NativeContextBuilder};
pub use converter::{ConversionContext, ConverterRegistry, NativeType, TypeConverter};
pub use error::{InvokerError, Result};
pub use ffi::{LibraryLoader, RawInvoker, RegisterInvoker, SymbolResolver};
pub use layout::{Layout, LayoutResolver, ScalarKind};
pub use proxy::{Dispatcher, InterfaceDefinition, MethodDefinition};
pub use structure::{
    AutoRead, AutoWrite, Passing, StructType, StructureDescriptor, StructureEngine,
    StructureInstance, UpdatePolicy,
};
pub use types::{
    Integral, LogicalType, Memory, NativeValue, Pointer, PrimitiveArray, PrimitiveKind, Value,
    WString,
};

#[cfg(feature = "libffi")]
pub use ffi::LibffiInvoker;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
