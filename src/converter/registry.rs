//! Converter Registry
//!
//! Thread-safe table from logical type to the converter serving it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{InvokerError, Result};
use crate::layout::{Layout, LayoutResolver};
use crate::types::{LogicalType, NativeValue, Value};

use super::{
    ArrayConverter, ConversionContext, NativeTypeConverter, PointerConverter, PrimitiveConverter,
    StringConverter, StructureConverter, TypeConverter,
};

static SHARED: Lazy<Arc<ConverterRegistry>> = Lazy::new(|| Arc::new(ConverterRegistry::new()));

/// Converter lookup table.
///
/// Registration normally happens during setup; lookups may run concurrently
/// from any thread afterwards. Converters for [`crate::converter::NativeType`]
/// implementors and for structures are synthesized and cached on first lookup.
pub struct ConverterRegistry {
    converters: Mutex<HashMap<LogicalType, Arc<dyn TypeConverter>>>,
}

impl ConverterRegistry {
    /// Create a registry holding the built-in converters
    pub fn new() -> Self {
        let mut converters: HashMap<LogicalType, Arc<dyn TypeConverter>> = HashMap::new();
        let builtin: [Arc<dyn TypeConverter>; 4] = [
            Arc::new(PrimitiveConverter),
            Arc::new(ArrayConverter),
            Arc::new(StringConverter),
            Arc::new(PointerConverter),
        ];
        for converter in builtin {
            for ty in converter.supported_types() {
                converters.insert(ty, Arc::clone(&converter));
            }
        }
        Self {
            converters: Mutex::new(converters),
        }
    }

    /// Create a registry with no converters at all
    pub fn empty() -> Self {
        Self {
            converters: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry shared by contexts that do not bring their own
    pub fn shared() -> Arc<ConverterRegistry> {
        Arc::clone(&SHARED)
    }

    /// Bind `converter` to `ty`
    pub fn register(&self, ty: LogicalType, converter: Arc<dyn TypeConverter>) -> Result<()> {
        let mut converters = self.converters.lock();
        if converters.contains_key(&ty) {
            return Err(InvokerError::DuplicateConverter(ty.to_string()));
        }
        debug!(%ty, ?converter, "registered converter");
        converters.insert(ty, converter);
        Ok(())
    }

    /// Bind `converter` to every type it reports as supported.
    ///
    /// Nothing is registered if any of those types is already bound.
    pub fn register_converter(&self, converter: Arc<dyn TypeConverter>) -> Result<()> {
        let types = converter.supported_types();
        if types.is_empty() {
            return Err(InvokerError::Conversion(format!(
                "{:?} reports no supported types",
                converter
            )));
        }

        let mut converters = self.converters.lock();
        if let Some(taken) = types.iter().find(|ty| converters.contains_key(*ty)) {
            return Err(InvokerError::DuplicateConverter(taken.to_string()));
        }
        for ty in types {
            debug!(%ty, ?converter, "registered converter");
            converters.insert(ty, Arc::clone(&converter));
        }
        Ok(())
    }

    /// Converter bound to `ty`, synthesizing one for native types and structures
    pub fn lookup(&self, ty: &LogicalType) -> Result<Arc<dyn TypeConverter>> {
        let mut converters = self.converters.lock();
        if let Some(converter) = converters.get(ty) {
            return Ok(Arc::clone(converter));
        }

        let synthesized: Arc<dyn TypeConverter> = match ty {
            LogicalType::Native(native) => {
                Arc::new(NativeTypeConverter::new(Arc::clone(native.prototype())))
            }
            LogicalType::Structure(_) => Arc::new(StructureConverter),
            _ => return Err(InvokerError::unsupported(ty, "no converter registered")),
        };
        debug!(%ty, "synthesized converter");
        converters.insert(ty.clone(), Arc::clone(&synthesized));
        Ok(synthesized)
    }

    /// Check whether a converter is bound (or can be synthesized) for `ty`
    pub fn is_supported(&self, ty: &LogicalType) -> bool {
        matches!(ty, LogicalType::Native(_) | LogicalType::Structure(_))
            || self.converters.lock().contains_key(ty)
    }

    /// Layout reported by the converter bound to `ty`
    pub fn layout_of(&self, ty: &LogicalType, resolver: &LayoutResolver) -> Result<Layout> {
        self.lookup(ty)?.layout(&ConversionContext::new(ty, resolver))
    }

    /// Convert `value` using the converter of its runtime type
    pub fn to_native(&self, value: &Value, resolver: &LayoutResolver) -> Result<NativeValue> {
        match value.logical_type() {
            None => Ok(NativeValue::Null),
            Some(ty) => self.to_native_as(&ty, value, resolver),
        }
    }

    /// Convert `value` using the converter of the declared type `ty`
    pub fn to_native_as(
        &self,
        ty: &LogicalType,
        value: &Value,
        resolver: &LayoutResolver,
    ) -> Result<NativeValue> {
        if value.is_null() {
            return Ok(NativeValue::Null);
        }
        self.lookup(ty)?
            .to_native(value, &ConversionContext::new(ty, resolver))
    }

    /// Build a logical value of type `ty` from its native form
    pub fn to_logical(
        &self,
        ty: &LogicalType,
        native: &NativeValue,
        resolver: &LayoutResolver,
    ) -> Result<Value> {
        self.lookup(ty)?
            .to_logical(native, &ConversionContext::new(ty, resolver))
    }

    /// Let the converter of `ty` copy native-side changes back into `value`
    pub fn read_back(
        &self,
        ty: &LogicalType,
        value: &mut Value,
        native: &NativeValue,
        resolver: &LayoutResolver,
    ) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        self.lookup(ty)?
            .read_back(value, native, &ConversionContext::new(ty, resolver))
    }

    /// Number of bound types, synthesized ones included
    pub fn len(&self) -> usize {
        self.converters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.lock().is_empty()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.len())
            .finish()
    }
}
