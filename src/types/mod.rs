//! Logical and native value model
//!
//! Logical values are what callers hold; native values are what the raw
//! call mechanism consumes and produces.

mod integral;
mod logical;
mod memory;
mod native;
mod value;
mod wstring;

pub use integral::Integral;
pub use logical::{LogicalType, NativeTypeRef, PrimitiveKind, StringEncoding};
pub use memory::{Memory, Pointer};
pub use native::NativeValue;
pub use value::{ExtensionValue, PrimitiveArray, Value};
pub use wstring::{WString, WCHAR_WIDTH};
