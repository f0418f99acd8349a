//! Logical values passed to and returned from native calls

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::converter::NativeType;
use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::structure::{AutoRead, AutoWrite, StructureInstance};

use super::{LogicalType, NativeTypeRef, NativeValue, Pointer, PrimitiveKind, StringEncoding, WString};

/// Array of one primitive kind, copied element-wise to a native buffer
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    Char(Vec<u16>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! numeric_arrays {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        impl PrimitiveArray {
            /// Native byte image of the elements, in host byte order
            pub fn to_bytes(&self) -> Result<Vec<u8>> {
                match self {
                    PrimitiveArray::Bool(_) => Err(InvokerError::Conversion(
                        "boolean arrays have no native element representation".to_string(),
                    )),
                    $(PrimitiveArray::$variant(values) => {
                        Ok(values.iter().flat_map(|v| v.to_ne_bytes()).collect())
                    })*
                }
            }

            /// Rebuild an array of `kind` from a native byte image
            pub fn from_bytes(kind: PrimitiveKind, bytes: &[u8]) -> Result<Self> {
                if bytes.len() % kind.size() != 0 {
                    return Err(InvokerError::Conversion(format!(
                        "{} bytes is not a whole number of {} elements",
                        bytes.len(),
                        kind
                    )));
                }
                match kind {
                    PrimitiveKind::Bool => Err(InvokerError::Conversion(
                        "boolean arrays have no native element representation".to_string(),
                    )),
                    $(PrimitiveKind::$variant => Ok(PrimitiveArray::$variant(
                        bytes
                            .chunks_exact(std::mem::size_of::<$ty>())
                            .map(|chunk| {
                                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                                raw.copy_from_slice(chunk);
                                <$ty>::from_ne_bytes(raw)
                            })
                            .collect(),
                    )),)*
                }
            }

            /// Overwrite the elements in place from a native byte image of the same length
            pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
                let fresh = Self::from_bytes(self.kind(), bytes)?;
                if fresh.len() != self.len() {
                    return Err(InvokerError::Conversion(format!(
                        "native buffer holds {} elements, array has {}",
                        fresh.len(),
                        self.len()
                    )));
                }
                *self = fresh;
                Ok(())
            }
        }

        $(impl From<Vec<$ty>> for PrimitiveArray {
            fn from(values: Vec<$ty>) -> Self {
                PrimitiveArray::$variant(values)
            }
        })*
    };
}

numeric_arrays! {
    I8 => i8,
    Char => u16,
    I16 => i16,
    I32 => i32,
    I64 => i64,
    F32 => f32,
    F64 => f64,
}

impl From<Vec<bool>> for PrimitiveArray {
    fn from(values: Vec<bool>) -> Self {
        PrimitiveArray::Bool(values)
    }
}

impl PrimitiveArray {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveArray::Bool(_) => PrimitiveKind::Bool,
            PrimitiveArray::I8(_) => PrimitiveKind::I8,
            PrimitiveArray::Char(_) => PrimitiveKind::Char,
            PrimitiveArray::I16(_) => PrimitiveKind::I16,
            PrimitiveArray::I32(_) => PrimitiveKind::I32,
            PrimitiveArray::I64(_) => PrimitiveKind::I64,
            PrimitiveArray::F32(_) => PrimitiveKind::F32,
            PrimitiveArray::F64(_) => PrimitiveKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PrimitiveArray::Bool(v) => v.len(),
            PrimitiveArray::I8(v) => v.len(),
            PrimitiveArray::Char(v) => v.len(),
            PrimitiveArray::I16(v) => v.len(),
            PrimitiveArray::I32(v) => v.len(),
            PrimitiveArray::I64(v) => v.len(),
            PrimitiveArray::F32(v) => v.len(),
            PrimitiveArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the native buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.len() * self.kind().size()
    }
}

/// Value of a type served by an explicitly registered converter
#[derive(Clone)]
pub struct ExtensionValue {
    type_name: Arc<str>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl ExtensionValue {
    pub fn new<T: Any + Send + Sync>(type_name: &str, payload: T) -> Self {
        Self {
            type_name: Arc::from(type_name),
            payload: Arc::new(payload),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A caller-side value
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    Char(u16),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    WStr(WString),
    Pointer(Pointer),
    Array(PrimitiveArray),
    Struct(StructureInstance),
    Native(Arc<dyn NativeType>),
    Extension(ExtensionValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Primitive kind of a scalar value
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Value::Bool(_) => Some(PrimitiveKind::Bool),
            Value::I8(_) => Some(PrimitiveKind::I8),
            Value::Char(_) => Some(PrimitiveKind::Char),
            Value::I16(_) => Some(PrimitiveKind::I16),
            Value::I32(_) => Some(PrimitiveKind::I32),
            Value::I64(_) => Some(PrimitiveKind::I64),
            Value::F32(_) => Some(PrimitiveKind::F32),
            Value::F64(_) => Some(PrimitiveKind::F64),
            _ => None,
        }
    }

    /// Runtime logical type; `None` for null
    pub fn logical_type(&self) -> Option<LogicalType> {
        if let Some(kind) = self.primitive_kind() {
            return Some(LogicalType::Primitive(kind));
        }
        match self {
            Value::Str(_) => Some(LogicalType::String(StringEncoding::Utf8)),
            Value::WStr(_) => Some(LogicalType::String(StringEncoding::Wide)),
            Value::Pointer(_) => Some(LogicalType::Pointer),
            Value::Array(array) => Some(LogicalType::array_of(LogicalType::Primitive(array.kind()))),
            Value::Struct(instance) => Some(LogicalType::Structure(instance.struct_type().clone())),
            Value::Native(native) => Some(LogicalType::Native(NativeTypeRef::from_instance(
                Arc::clone(native),
            ))),
            Value::Extension(ext) => Some(LogicalType::extension(ext.type_name())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value of any integer kind, widened
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::I8(v) => Some(*v as i64),
            Value::Char(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point value of either float kind, widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::WStr(w) => Some(w.as_str()),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PrimitiveArray> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructureInstance> {
        match self {
            Value::Struct(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructureInstance> {
        match self {
            Value::Struct(instance) => Some(instance),
            _ => None,
        }
    }

    /// Downcast a native-type value to its concrete type
    pub fn as_native<T: NativeType + 'static>(&self) -> Option<&T> {
        match self {
            Value::Native(native) => native.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Write-back capability, if the value carries one
    pub fn as_auto_write(&mut self) -> Option<&mut dyn AutoWrite> {
        match self {
            Value::Struct(instance) => Some(instance),
            _ => None,
        }
    }

    /// Read-back capability, if the value carries one
    pub fn as_auto_read(&mut self) -> Option<&mut dyn AutoRead> {
        match self {
            Value::Struct(instance) => Some(instance),
            _ => None,
        }
    }

    /// Native scalar for a primitive of the given kind
    pub fn to_native_scalar(&self, kind: PrimitiveKind) -> Result<NativeValue> {
        let native = match self {
            Value::Null => return Ok(NativeValue::Null),
            Value::Bool(b) => NativeValue::Bool(*b),
            Value::I8(v) => NativeValue::I8(*v),
            Value::Char(v) => NativeValue::U16(*v),
            Value::I16(v) => NativeValue::I16(*v),
            Value::I32(v) => NativeValue::I32(*v),
            Value::I64(v) => NativeValue::I64(*v),
            Value::F32(v) => NativeValue::F32(*v),
            Value::F64(v) => NativeValue::F64(*v),
            other => {
                return Err(InvokerError::Conversion(format!(
                    "{:?} is not a {} value",
                    other, kind
                )))
            }
        };
        native.coerce(&Layout::from(kind))
    }

    /// Logical primitive of the given kind built from a native scalar
    pub fn from_native_scalar(kind: PrimitiveKind, native: &NativeValue) -> Result<Value> {
        let value = match native.clone_scalar()?.coerce(&Layout::from(kind))? {
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(b),
            NativeValue::I8(v) => Value::I8(v),
            NativeValue::U16(v) => Value::Char(v),
            NativeValue::I16(v) => Value::I16(v),
            NativeValue::I32(v) => Value::I32(v),
            NativeValue::I64(v) => Value::I64(v),
            NativeValue::F32(v) => Value::F32(v),
            NativeValue::F64(v) => Value::F64(v),
            other => {
                return Err(InvokerError::Conversion(format!(
                    "{:?} cannot become a {} value",
                    other, kind
                )))
            }
        };
        Ok(value)
    }

    /// Zero-equivalent value for a field of the given type
    pub fn default_for(ty: &LogicalType) -> Value {
        match ty {
            LogicalType::Primitive(kind) => match kind {
                PrimitiveKind::Bool => Value::Bool(false),
                PrimitiveKind::I8 => Value::I8(0),
                PrimitiveKind::Char => Value::Char(0),
                PrimitiveKind::I16 => Value::I16(0),
                PrimitiveKind::I32 => Value::I32(0),
                PrimitiveKind::I64 => Value::I64(0),
                PrimitiveKind::F32 => Value::F32(0.0),
                PrimitiveKind::F64 => Value::F64(0.0),
            },
            LogicalType::Pointer => Value::Pointer(Pointer::NULL),
            _ => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::WStr(a), Value::WStr(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Structures compare by the memory they are bound to
            (Value::Struct(a), Value::Struct(b)) => a.address() == b.address(),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Extension(a), Value::Extension(b)) => Arc::ptr_eq(&a.payload, &b.payload),
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Str,
    WString => WStr,
    Pointer => Pointer,
    PrimitiveArray => Array,
    StructureInstance => Struct,
    ExtensionValue => Extension,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl<T> From<Vec<T>> for Value
where
    PrimitiveArray: From<Vec<T>>,
{
    fn from(values: Vec<T>) -> Self {
        Value::Array(PrimitiveArray::from(values))
    }
}

impl<T: NativeType + 'static> From<Arc<T>> for Value {
    fn from(native: Arc<T>) -> Self {
        Value::Native(native)
    }
}
