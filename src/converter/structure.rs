use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::structure::{Passing, StructType};
use crate::types::{LogicalType, NativeValue, Pointer, Value};

use super::{ConversionContext, TypeConverter};

/// User structures: by reference as the address of the backing memory,
/// by value as a copy of its bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureConverter;

fn struct_type<'a>(cx: &ConversionContext<'a>) -> Result<&'a StructType> {
    match cx.ty {
        LogicalType::Structure(st) => Ok(st),
        other => Err(InvokerError::unsupported(other, "not a structure type")),
    }
}

impl TypeConverter for StructureConverter {
    fn layout(&self, cx: &ConversionContext<'_>) -> Result<Layout> {
        let st = struct_type(cx)?;
        match st.passing() {
            Passing::ByReference => Ok(Layout::Address),
            Passing::ByValue => {
                let descriptor = cx.resolver.structures().describe(st, cx.resolver)?;
                Ok(Layout::Group(descriptor.group().clone()))
            }
        }
    }

    fn to_native(&self, value: &Value, cx: &ConversionContext<'_>) -> Result<NativeValue> {
        let st = struct_type(cx)?;
        match value {
            Value::Struct(instance) if instance.struct_type() == st => match st.passing() {
                Passing::ByReference => Ok(NativeValue::Address(instance.address())),
                Passing::ByValue => Ok(NativeValue::Group(instance.bytes())),
            },
            other => Err(InvokerError::Conversion(format!(
                "expected struct {}, got {:?}",
                st.name(),
                other
            ))),
        }
    }

    fn to_logical(&self, native: &NativeValue, cx: &ConversionContext<'_>) -> Result<Value> {
        let st = struct_type(cx)?;
        let engine = cx.resolver.structures();
        let mut instance = match native {
            NativeValue::Null | NativeValue::Void | NativeValue::Address(0) => return Ok(Value::Null),
            NativeValue::Address(address) => engine.view(st, cx.resolver, Pointer::new(*address))?,
            NativeValue::Group(bytes) => engine.from_bytes(st, cx.resolver, bytes)?,
            other => {
                return Err(InvokerError::Conversion(format!(
                    "{:?} cannot become struct {}",
                    other,
                    st.name()
                )))
            }
        };
        instance.read()?;
        Ok(Value::Struct(instance))
    }
}
