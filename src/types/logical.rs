//! Logical type identifiers
//!
//! A [`LogicalType`] names the caller-visible type of a value before it is
//! converted to its native representation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::converter::NativeType;
use crate::layout::Layout;
use crate::structure::StructType;

use super::Value;

/// The eight standard numeric/boolean kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Boolean (1 byte)
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit character code unit
    Char,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
}

impl PrimitiveKind {
    /// Every primitive kind, in width order
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::Char,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
    ];

    /// Check if this kind is an integer kind (booleans and chars included)
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Check if this kind is a floating point kind
    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 => 1,
            PrimitiveKind::Char | PrimitiveKind::I16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::F64 => 8,
        }
    }

    /// Parse from a string representation
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Some(PrimitiveKind::Bool),
            "i8" | "byte" | "int8_t" => Some(PrimitiveKind::I8),
            "char" | "u16" | "char16_t" => Some(PrimitiveKind::Char),
            "i16" | "short" | "int16_t" => Some(PrimitiveKind::I16),
            "i32" | "int" | "int32_t" => Some(PrimitiveKind::I32),
            "i64" | "long" | "int64_t" => Some(PrimitiveKind::I64),
            "f32" | "float" => Some(PrimitiveKind::F32),
            "f64" | "double" => Some(PrimitiveKind::F64),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::Char => "char",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Character width used for the native form of a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringEncoding {
    /// Single-byte UTF-8 (`char*`)
    Utf8,
    /// Platform `wchar_t` (`wchar_t*`)
    Wide,
}

/// Handle to a type implementing the native-type capability.
///
/// Identity is the type name together with its native layout; the prototype
/// is a default-constructed instance used to produce layouts and to build
/// logical values from native ones.
#[derive(Clone)]
pub struct NativeTypeRef {
    name: Arc<str>,
    layout: Layout,
    prototype: Arc<dyn NativeType>,
}

impl NativeTypeRef {
    /// Reference a native type through its default instance
    pub fn of<T: NativeType + Default + 'static>() -> Self {
        Self::from_instance(Arc::new(T::default()))
    }

    /// Reference the native type of an existing instance
    pub fn from_instance(instance: Arc<dyn NativeType>) -> Self {
        Self {
            name: Arc::from(instance.type_name()),
            layout: instance.layout(),
            prototype: instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prototype(&self) -> &Arc<dyn NativeType> {
        &self.prototype
    }
}

impl PartialEq for NativeTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.layout == other.layout
    }
}

impl Eq for NativeTypeRef {}

impl Hash for NativeTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for NativeTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeTypeRef").field(&self.name).finish()
    }
}

/// A type identifier understood by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Plain primitive, never null
    Primitive(PrimitiveKind),
    /// Nullable primitive with the same native layout as its primitive
    Boxed(PrimitiveKind),
    /// Text, passed as a pointer to a null-terminated buffer
    String(StringEncoding),
    /// Raw address
    Pointer,
    /// Array of the element type, passed as a pointer to a separate buffer
    Array(Box<LogicalType>),
    /// User structure backed by native memory
    Structure(StructType),
    /// Type implementing the native-type capability
    Native(NativeTypeRef),
    /// Extension type served by an explicitly registered converter
    Extension(Arc<str>),
    /// Any runtime type; only meaningful as the element type of a variadic tail
    Any,
}

impl LogicalType {
    pub const BOOL: LogicalType = LogicalType::Primitive(PrimitiveKind::Bool);
    pub const I8: LogicalType = LogicalType::Primitive(PrimitiveKind::I8);
    pub const CHAR: LogicalType = LogicalType::Primitive(PrimitiveKind::Char);
    pub const I16: LogicalType = LogicalType::Primitive(PrimitiveKind::I16);
    pub const I32: LogicalType = LogicalType::Primitive(PrimitiveKind::I32);
    pub const I64: LogicalType = LogicalType::Primitive(PrimitiveKind::I64);
    pub const F32: LogicalType = LogicalType::Primitive(PrimitiveKind::F32);
    pub const F64: LogicalType = LogicalType::Primitive(PrimitiveKind::F64);
    pub const STRING: LogicalType = LogicalType::String(StringEncoding::Utf8);
    pub const WSTRING: LogicalType = LogicalType::String(StringEncoding::Wide);

    /// Nullable counterpart of a primitive kind
    pub fn boxed(kind: PrimitiveKind) -> Self {
        LogicalType::Boxed(kind)
    }

    /// Array of the given element type
    pub fn array_of(element: LogicalType) -> Self {
        LogicalType::Array(Box::new(element))
    }

    /// Extension type identified by name
    pub fn extension(name: &str) -> Self {
        LogicalType::Extension(Arc::from(name))
    }

    /// Native type identified through its default instance
    pub fn native<T: NativeType + Default + 'static>() -> Self {
        LogicalType::Native(NativeTypeRef::of::<T>())
    }

    /// Parse a C-style type name: primitives, `string`/`char*`,
    /// `wstring`/`wchar_t*`, `pointer`/`void*`, `T[]`, and `any`
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(element) = s.strip_suffix("[]") {
            return LogicalType::from_name(element).map(LogicalType::array_of);
        }
        if let Some(kind) = PrimitiveKind::from_name(s) {
            return Some(LogicalType::Primitive(kind));
        }
        match s.to_lowercase().as_str() {
            "string" | "cstr" | "char*" | "const char*" => Some(LogicalType::STRING),
            "wstring" | "wchar_t*" | "const wchar_t*" => Some(LogicalType::WSTRING),
            "pointer" | "ptr" | "void*" => Some(LogicalType::Pointer),
            "any" => Some(LogicalType::Any),
            _ => None,
        }
    }

    /// Primitive kind of a primitive or boxed primitive
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            LogicalType::Primitive(kind) | LogicalType::Boxed(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_primitive_or_boxed(&self) -> bool {
        self.primitive_kind().is_some()
    }

    /// Element type of an array
    pub fn element(&self) -> Option<&LogicalType> {
        match self {
            LogicalType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Check whether a runtime value may be passed where this type is declared
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (LogicalType::Any, _) => true,
            (LogicalType::Primitive(_), Value::Null) => false,
            (_, Value::Null) => true,
            (LogicalType::Primitive(kind) | LogicalType::Boxed(kind), value) => {
                match value.primitive_kind() {
                    Some(PrimitiveKind::Bool) => *kind == PrimitiveKind::Bool,
                    Some(actual) if kind.is_float() => actual.is_float(),
                    Some(actual) => {
                        *kind != PrimitiveKind::Bool && actual.is_integer()
                    }
                    None => false,
                }
            }
            (LogicalType::String(StringEncoding::Utf8), Value::Str(_)) => true,
            (LogicalType::String(StringEncoding::Wide), Value::Str(_) | Value::WStr(_)) => true,
            (LogicalType::Pointer, Value::Pointer(_)) => true,
            (LogicalType::Array(element), Value::Array(array)) => {
                element.primitive_kind() == Some(array.kind())
            }
            (LogicalType::Structure(ty), Value::Struct(instance)) => instance.struct_type() == ty,
            (LogicalType::Native(ty), Value::Native(native)) => native.type_name() == ty.name(),
            (LogicalType::Extension(name), Value::Extension(ext)) => ext.type_name() == &**name,
            _ => false,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Primitive(kind) => write!(f, "{}", kind),
            LogicalType::Boxed(kind) => write!(f, "boxed {}", kind),
            LogicalType::String(StringEncoding::Utf8) => write!(f, "string"),
            LogicalType::String(StringEncoding::Wide) => write!(f, "wstring"),
            LogicalType::Pointer => write!(f, "pointer"),
            LogicalType::Array(element) => write!(f, "{}[]", element),
            LogicalType::Structure(ty) => write!(f, "struct {}", ty.name()),
            LogicalType::Native(ty) => write!(f, "{}", ty.name()),
            LogicalType::Extension(name) => write!(f, "{}", name),
            LogicalType::Any => write!(f, "any"),
        }
    }
}
