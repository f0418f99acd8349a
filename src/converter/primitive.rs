use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::{LogicalType, NativeValue, PrimitiveKind, Value};

use super::{ConversionContext, TypeConverter};

/// Primitives and their boxed counterparts; both share one native layout
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimitiveConverter;

fn kind_of(cx: &ConversionContext<'_>) -> Result<PrimitiveKind> {
    cx.ty
        .primitive_kind()
        .ok_or_else(|| InvokerError::unsupported(cx.ty, "not a primitive type"))
}

impl TypeConverter for PrimitiveConverter {
    fn supported_types(&self) -> Vec<LogicalType> {
        PrimitiveKind::ALL
            .iter()
            .flat_map(|&kind| [LogicalType::Primitive(kind), LogicalType::Boxed(kind)])
            .collect()
    }

    fn layout(&self, cx: &ConversionContext<'_>) -> Result<Layout> {
        Ok(Layout::from(kind_of(cx)?))
    }

    fn to_native(&self, value: &Value, cx: &ConversionContext<'_>) -> Result<NativeValue> {
        value.to_native_scalar(kind_of(cx)?)
    }

    fn to_logical(&self, native: &NativeValue, cx: &ConversionContext<'_>) -> Result<Value> {
        let kind = kind_of(cx)?;
        match (cx.ty, native) {
            (LogicalType::Primitive(_), NativeValue::Null) => Err(InvokerError::Conversion(
                format!("null cannot become a {} value", kind),
            )),
            _ => Value::from_native_scalar(kind, native),
        }
    }
}
