use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::{LogicalType, Memory, NativeValue, PrimitiveKind, PrimitiveArray, Value};

use super::{ConversionContext, TypeConverter};

/// Primitive arrays, copied into a fresh native buffer for each call.
///
/// After the call the buffer contents are copied back into the caller's array,
/// so functions that fill an output array behave as expected. Boolean arrays
/// are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayConverter;

fn element_kind(cx: &ConversionContext<'_>) -> Result<PrimitiveKind> {
    cx.ty
        .element()
        .and_then(LogicalType::primitive_kind)
        .ok_or_else(|| InvokerError::unsupported(cx.ty, "array element must be a primitive"))
}

impl TypeConverter for ArrayConverter {
    fn supported_types(&self) -> Vec<LogicalType> {
        PrimitiveKind::ALL
            .iter()
            .flat_map(|&kind| {
                [
                    LogicalType::array_of(LogicalType::Primitive(kind)),
                    LogicalType::array_of(LogicalType::Boxed(kind)),
                ]
            })
            .collect()
    }

    fn layout(&self, cx: &ConversionContext<'_>) -> Result<Layout> {
        element_kind(cx)?;
        Ok(Layout::Address)
    }

    fn to_native(&self, value: &Value, cx: &ConversionContext<'_>) -> Result<NativeValue> {
        let kind = element_kind(cx)?;
        match value {
            Value::Array(array) if array.kind() == kind => {
                let bytes = array.to_bytes()?;
                Ok(NativeValue::Buffer(Memory::from_bytes(&bytes, kind.size())?))
            }
            other => Err(InvokerError::Conversion(format!(
                "expected a {} array, got {:?}",
                kind, other
            ))),
        }
    }

    fn to_logical(&self, native: &NativeValue, cx: &ConversionContext<'_>) -> Result<Value> {
        let kind = element_kind(cx)?;
        match native {
            NativeValue::Null | NativeValue::Address(0) => Ok(Value::Null),
            NativeValue::Buffer(memory) => Ok(Value::Array(PrimitiveArray::from_bytes(
                kind,
                memory.as_slice(),
            )?)),
            other => Err(InvokerError::Conversion(format!(
                "array length unknown for native {:?}",
                other
            ))),
        }
    }

    fn read_back(
        &self,
        value: &mut Value,
        native: &NativeValue,
        _cx: &ConversionContext<'_>,
    ) -> Result<()> {
        if let (Value::Array(array), NativeValue::Buffer(memory)) = (value, native) {
            array.copy_from_bytes(memory.as_slice())?;
        }
        Ok(())
    }
}
