use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::{LogicalType, Memory, NativeValue, Pointer, StringEncoding, Value, WString};

use super::{ConversionContext, TypeConverter};

/// Text as a null-terminated buffer: UTF-8 bytes or `wchar_t` units
#[derive(Debug, Default, Clone, Copy)]
pub struct StringConverter;

fn encoding_of(cx: &ConversionContext<'_>) -> Result<StringEncoding> {
    match cx.ty {
        LogicalType::String(encoding) => Ok(*encoding),
        other => Err(InvokerError::unsupported(other, "not a string type")),
    }
}

impl TypeConverter for StringConverter {
    fn supported_types(&self) -> Vec<LogicalType> {
        vec![LogicalType::STRING, LogicalType::WSTRING]
    }

    fn layout(&self, cx: &ConversionContext<'_>) -> Result<Layout> {
        encoding_of(cx)?;
        Ok(Layout::Address)
    }

    fn to_native(&self, value: &Value, cx: &ConversionContext<'_>) -> Result<NativeValue> {
        let memory = match (encoding_of(cx)?, value) {
            (StringEncoding::Utf8, Value::Str(s)) => Memory::from_c_string(s)?,
            (StringEncoding::Wide, Value::WStr(w)) => Memory::from_wide_string(w)?,
            (StringEncoding::Wide, Value::Str(s)) => {
                Memory::from_wide_string(&WString::new(s.as_str()))?
            }
            (_, other) => {
                return Err(InvokerError::Conversion(format!(
                    "expected {}, got {:?}",
                    cx.ty, other
                )))
            }
        };
        Ok(NativeValue::Buffer(memory))
    }

    fn to_logical(&self, native: &NativeValue, cx: &ConversionContext<'_>) -> Result<Value> {
        let encoding = encoding_of(cx)?;
        let address = match native {
            NativeValue::Null | NativeValue::Void => return Ok(Value::Null),
            NativeValue::Address(address) => *address,
            NativeValue::Buffer(memory) => memory.address(),
            other => {
                return Err(InvokerError::Conversion(format!(
                    "{:?} is not a string address",
                    other
                )))
            }
        };
        if address == 0 {
            return Ok(Value::Null);
        }

        let pointer = Pointer::new(address);
        // Safety: a non-null string address handed back by native code points to
        // a null-terminated buffer of the declared width
        unsafe {
            match encoding {
                StringEncoding::Utf8 => pointer.read_c_string().map(Value::Str),
                StringEncoding::Wide => pointer.read_wide_string().map(Value::WStr),
            }
        }
    }
}
