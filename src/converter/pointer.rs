use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::{LogicalType, NativeValue, Pointer, Value};

use super::{ConversionContext, TypeConverter};

/// Raw addresses pass through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PointerConverter;

impl TypeConverter for PointerConverter {
    fn supported_types(&self) -> Vec<LogicalType> {
        vec![LogicalType::Pointer]
    }

    fn layout(&self, _cx: &ConversionContext<'_>) -> Result<Layout> {
        Ok(Layout::Address)
    }

    fn to_native(&self, value: &Value, _cx: &ConversionContext<'_>) -> Result<NativeValue> {
        match value {
            Value::Pointer(pointer) => Ok(NativeValue::Address(pointer.address())),
            other => Err(InvokerError::Conversion(format!(
                "expected a pointer, got {:?}",
                other
            ))),
        }
    }

    fn to_logical(&self, native: &NativeValue, _cx: &ConversionContext<'_>) -> Result<Value> {
        let address = match native {
            NativeValue::Null | NativeValue::Void => 0,
            NativeValue::I64(v) => *v as usize,
            other => other.address().ok_or_else(|| {
                InvokerError::Conversion(format!("{:?} is not an address", other))
            })?,
        };
        Ok(Value::Pointer(Pointer::new(address)))
    }
}
