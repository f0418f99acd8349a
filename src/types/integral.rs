use std::any::Any;
use std::sync::Arc;

use crate::converter::NativeType;
use crate::error::{InvokerError, Result};
use crate::layout::{Layout, ScalarKind};

use super::{NativeValue, Value};

/// Integer wrapper marshalled as a 32-bit native int
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Integral(pub i32);

impl Integral {
    pub fn new(value: i32) -> Self {
        Integral(value)
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl NativeType for Integral {
    fn type_name(&self) -> &str {
        "Integral"
    }

    fn layout(&self) -> Layout {
        Layout::Scalar(ScalarKind::I32)
    }

    fn to_native(&self) -> Result<NativeValue> {
        Ok(NativeValue::I32(self.0))
    }

    fn to_logical(&self, native: &NativeValue) -> Result<Value> {
        let value = native
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| InvokerError::Conversion(format!("{:?} is not an i32", native)))?;
        Ok(Value::Native(Arc::new(Integral(value))))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<Integral> for Value {
    fn from(v: Integral) -> Self {
        Value::Native(Arc::new(v))
    }
}
