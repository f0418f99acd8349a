//! Type Converters
//!
//! A converter turns logical values of one or more types into native values
//! and back, and reports the native layout those types occupy.
//!
//! # Architecture
//!
//! ```text
//! Value ──to_native──► NativeValue ──► raw call ──► NativeValue ──to_logical──► Value
//!                           │
//!                     read_back (arrays copy their buffer into the caller's value)
//! ```
//!
//! Converters are looked up in the [`ConverterRegistry`]. Types implementing
//! [`NativeType`] and user structures get a converter synthesized on first use.

mod array;
mod native;
mod pointer;
mod primitive;
mod registry;
mod string;
mod structure;

pub use array::ArrayConverter;
pub use native::NativeTypeConverter;
pub use pointer::PointerConverter;
pub use primitive::PrimitiveConverter;
pub use registry::ConverterRegistry;
pub use string::StringConverter;
pub use structure::StructureConverter;

use std::any::Any;
use std::fmt;

use crate::error::Result;
use crate::layout::{Layout, LayoutResolver};
use crate::types::{LogicalType, NativeValue, Value};

/// Capability of a caller type that knows its own native form.
///
/// Implementors are served by a converter the registry synthesizes on demand.
pub trait NativeType: Send + Sync + fmt::Debug {
    /// Name identifying the type (used for registry lookup)
    fn type_name(&self) -> &str;

    fn layout(&self) -> Layout;

    fn to_native(&self) -> Result<NativeValue>;

    /// Build a logical value of this type from its native form
    fn to_logical(&self, native: &NativeValue) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Context handed to every converter operation
#[derive(Clone, Copy)]
pub struct ConversionContext<'a> {
    /// Declared logical type of the value being converted
    pub ty: &'a LogicalType,
    pub resolver: &'a LayoutResolver,
}

impl<'a> ConversionContext<'a> {
    pub fn new(ty: &'a LogicalType, resolver: &'a LayoutResolver) -> Self {
        Self { ty, resolver }
    }
}

/// Bidirectional transformation for a family of logical types
pub trait TypeConverter: Send + Sync + fmt::Debug {
    /// Types this converter serves when registered through
    /// [`ConverterRegistry::register_converter`]
    fn supported_types(&self) -> Vec<LogicalType> {
        Vec::new()
    }

    fn layout(&self, cx: &ConversionContext<'_>) -> Result<Layout>;

    fn to_native(&self, value: &Value, cx: &ConversionContext<'_>) -> Result<NativeValue>;

    fn to_logical(&self, native: &NativeValue, cx: &ConversionContext<'_>) -> Result<Value>;

    /// Propagate changes the native side made to `native` back into `value`.
    /// Runs after the call, before the native value is released.
    fn read_back(
        &self,
        _value: &mut Value,
        _native: &NativeValue,
        _cx: &ConversionContext<'_>,
    ) -> Result<()> {
        Ok(())
    }
}
