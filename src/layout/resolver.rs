//! Logical type to native layout resolution

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::converter::ConverterRegistry;
use crate::error::{InvokerError, Result};
use crate::structure::{Passing, StructureEngine};
use crate::types::LogicalType;

use super::Layout;

/// Maps logical types to layouts, caching every result.
///
/// Structures are described through the [`StructureEngine`]; native and
/// extension types defer to their registered converter.
pub struct LayoutResolver {
    registry: Arc<ConverterRegistry>,
    structures: Arc<StructureEngine>,
    cache: Mutex<HashMap<LogicalType, Layout>>,
    this: Weak<LayoutResolver>,
}

impl LayoutResolver {
    pub fn new(registry: Arc<ConverterRegistry>, structures: Arc<StructureEngine>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            structures,
            cache: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Owning handle to this resolver, for values that outlive the current borrow
    pub fn handle(&self) -> Result<Arc<LayoutResolver>> {
        self.this
            .upgrade()
            .ok_or_else(|| InvokerError::Conversion("layout resolver is shutting down".to_string()))
    }

    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    pub fn structures(&self) -> &Arc<StructureEngine> {
        &self.structures
    }

    /// Layout of `ty`, or `UnsupportedType` when none can be derived
    pub fn layout_of(&self, ty: &LogicalType) -> Result<Layout> {
        if let Some(layout) = self.cache.lock().get(ty) {
            return Ok(layout.clone());
        }

        // Computed without the lock held: structure layouts recurse into field types
        let layout = self.compute(ty)?;
        let mut cache = self.cache.lock();
        Ok(cache.entry(ty.clone()).or_insert(layout).clone())
    }

    /// Check whether `ty` has a layout
    pub fn is_supported(&self, ty: &LogicalType) -> bool {
        self.layout_of(ty).is_ok()
    }

    fn compute(&self, ty: &LogicalType) -> Result<Layout> {
        match ty {
            LogicalType::Primitive(kind) | LogicalType::Boxed(kind) => Ok(Layout::from(*kind)),
            LogicalType::String(_) | LogicalType::Pointer => Ok(Layout::Address),
            LogicalType::Array(element) => {
                if element.is_primitive_or_boxed() {
                    Ok(Layout::Address)
                } else {
                    Err(InvokerError::unsupported(ty, "array element must be a primitive"))
                }
            }
            LogicalType::Structure(st) => match st.passing() {
                Passing::ByReference => Ok(Layout::Address),
                Passing::ByValue => {
                    let descriptor = self.structures.describe(st, self)?;
                    Ok(Layout::Group(descriptor.group().clone()))
                }
            },
            LogicalType::Native(_) | LogicalType::Extension(_) => self.registry.layout_of(ty, self),
            LogicalType::Any => Err(InvokerError::unsupported(
                ty,
                "only valid as a variadic element type",
            )),
        }
    }

    /// Number of cached layouts
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}
