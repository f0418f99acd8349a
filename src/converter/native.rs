use std::sync::Arc;

use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::{NativeValue, Value};

use super::{ConversionContext, NativeType, TypeConverter};

/// Converter synthesized for a [`NativeType`] implementor.
///
/// Layout and logical reconstruction come from a prototype instance;
/// outgoing values convert themselves.
#[derive(Debug, Clone)]
pub struct NativeTypeConverter {
    prototype: Arc<dyn NativeType>,
}

impl NativeTypeConverter {
    pub fn new(prototype: Arc<dyn NativeType>) -> Self {
        Self { prototype }
    }
}

impl TypeConverter for NativeTypeConverter {
    fn layout(&self, _cx: &ConversionContext<'_>) -> Result<Layout> {
        Ok(self.prototype.layout())
    }

    fn to_native(&self, value: &Value, _cx: &ConversionContext<'_>) -> Result<NativeValue> {
        match value {
            Value::Native(native) if native.type_name() == self.prototype.type_name() => {
                native.to_native()
            }
            other => Err(InvokerError::Conversion(format!(
                "expected a {} value, got {:?}",
                self.prototype.type_name(),
                other
            ))),
        }
    }

    fn to_logical(&self, native: &NativeValue, _cx: &ConversionContext<'_>) -> Result<Value> {
        if matches!(native, NativeValue::Void) {
            return Ok(Value::Null);
        }
        self.prototype.to_logical(native)
    }
}
