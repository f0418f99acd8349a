//! Structure instances and field synchronization

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::converter::ConversionContext;
use crate::error::{InvokerError, Result};
use crate::layout::LayoutResolver;
use crate::types::{LogicalType, Memory, NativeValue, Pointer, Value};

use super::{StructType, StructureDescriptor};

/// When automatic synchronization around a native call takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    Never,
    Always,
    /// Only when the structure was passed to a native call
    #[default]
    AfterUsed,
}

impl UpdatePolicy {
    pub fn applies(&self, from_usage: bool) -> bool {
        match self {
            UpdatePolicy::Never => false,
            UpdatePolicy::Always => true,
            UpdatePolicy::AfterUsed => from_usage,
        }
    }
}

/// Capability invoked on arguments before a native call
pub trait AutoWrite {
    fn auto_write(&mut self, from_usage: bool) -> Result<()>;
}

/// Capability invoked on arguments after a native call
pub trait AutoRead {
    fn auto_read(&mut self, from_usage: bool) -> Result<()>;
}

enum Backing {
    Owned(Memory),
    Borrowed(Pointer),
}

/// A structure bound to native memory, with one logical value per field
pub struct StructureInstance {
    descriptor: Arc<StructureDescriptor>,
    resolver: Arc<LayoutResolver>,
    backing: Backing,
    values: Vec<Value>,
    /// Buffers referenced by the last write (strings, arrays)
    keep_alive: Vec<Memory>,
    read_policy: UpdatePolicy,
    write_policy: UpdatePolicy,
}

impl StructureInstance {
    fn with_backing(
        descriptor: Arc<StructureDescriptor>,
        resolver: Arc<LayoutResolver>,
        backing: Backing,
    ) -> Self {
        let values = descriptor
            .fields()
            .iter()
            .map(|field| Value::default_for(&field.ty))
            .collect();
        Self {
            descriptor,
            resolver,
            backing,
            values,
            keep_alive: Vec::new(),
            read_policy: UpdatePolicy::default(),
            write_policy: UpdatePolicy::default(),
        }
    }

    pub(crate) fn owned(
        descriptor: Arc<StructureDescriptor>,
        resolver: Arc<LayoutResolver>,
        memory: Memory,
    ) -> Self {
        Self::with_backing(descriptor, resolver, Backing::Owned(memory))
    }

    pub(crate) fn borrowed(
        descriptor: Arc<StructureDescriptor>,
        resolver: Arc<LayoutResolver>,
        pointer: Pointer,
    ) -> Self {
        Self::with_backing(descriptor, resolver, Backing::Borrowed(pointer))
    }

    pub fn struct_type(&self) -> &StructType {
        self.descriptor.struct_type()
    }

    pub fn descriptor(&self) -> &Arc<StructureDescriptor> {
        &self.descriptor
    }

    pub fn pointer(&self) -> Pointer {
        match &self.backing {
            Backing::Owned(memory) => memory.pointer(),
            Backing::Borrowed(pointer) => *pointer,
        }
    }

    pub fn address(&self) -> usize {
        self.pointer().address()
    }

    pub fn is_null(&self) -> bool {
        self.pointer().is_null()
    }

    pub fn size(&self) -> usize {
        self.descriptor.size()
    }

    /// Copy of the backing bytes (empty when unbound)
    pub fn bytes(&self) -> Vec<u8> {
        match &self.backing {
            Backing::Owned(memory) => memory.as_slice().to_vec(),
            Backing::Borrowed(pointer) if pointer.is_null() => Vec::new(),
            // Safety: a borrowed pointer covers the whole structure layout
            Backing::Borrowed(pointer) => unsafe { pointer.read_bytes(self.size()) },
        }
    }

    fn index(&self, field: &str) -> Result<usize> {
        self.descriptor.index_of(field).ok_or_else(|| {
            InvokerError::Conversion(format!(
                "'{}' has no field '{}'",
                self.struct_type().name(),
                field
            ))
        })
    }

    /// Logical value of `field` as of the last read or set
    pub fn get(&self, field: &str) -> Result<&Value> {
        Ok(&self.values[self.index(field)?])
    }

    pub fn get_mut(&mut self, field: &str) -> Result<&mut Value> {
        let index = self.index(field)?;
        Ok(&mut self.values[index])
    }

    /// Replace the logical value of `field`; memory changes on the next write
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index(field)?;
        let value = value.into();
        let ty = &self.descriptor.fields()[index].ty;
        if !ty.accepts(&value) {
            return Err(InvokerError::Conversion(format!(
                "field '{}' of '{}' is {}, got {:?}",
                field,
                self.struct_type().name(),
                ty,
                value
            )));
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn get_i32(&self, field: &str) -> Result<i32> {
        let wide = self.get_i64(field)?;
        i32::try_from(wide).map_err(|_| {
            InvokerError::Conversion(format!("field '{}' holds {}, outside i32", field, wide))
        })
    }

    pub fn get_i64(&self, field: &str) -> Result<i64> {
        let value = self.get(field)?;
        value
            .as_i64()
            .ok_or_else(|| InvokerError::Conversion(format!("field '{}' is {:?}", field, value)))
    }

    pub fn get_f64(&self, field: &str) -> Result<f64> {
        let value = self.get(field)?;
        value
            .as_f64()
            .ok_or_else(|| InvokerError::Conversion(format!("field '{}' is {:?}", field, value)))
    }

    /// Refresh every field value from native memory.
    ///
    /// An unbound (null) instance is left untouched.
    pub fn read(&mut self) -> Result<()> {
        let base = self.pointer();
        if base.is_null() {
            return Ok(());
        }
        let descriptor = Arc::clone(&self.descriptor);
        let resolver = Arc::clone(&self.resolver);

        for (index, field) in descriptor.fields().iter().enumerate() {
            // Safety: the backing memory covers every field offset of the layout
            let native = unsafe { NativeValue::read_from(base.offset(field.offset).as_ptr(), &field.layout) };

            // Array fields carry no length in memory; reuse the caller's array length
            if let LogicalType::Array(_) = field.ty {
                let address = native.address().unwrap_or(0);
                if address == 0 {
                    self.values[index] = Value::Null;
                } else if let Value::Array(array) = &mut self.values[index] {
                    // Safety: the array buffer at `address` was sized for this array
                    let bytes = unsafe { Pointer::new(address).read_bytes(array.byte_len()) };
                    array.copy_from_bytes(&bytes)?;
                }
                continue;
            }

            // Nested by-value structures are refreshed in place so they keep their policies
            if let (LogicalType::Structure(st), Value::Struct(nested), NativeValue::Group(bytes)) =
                (&field.ty, &mut self.values[index], &native)
            {
                if nested.struct_type() == st {
                    nested.load_bytes(bytes)?;
                    nested.read()?;
                    continue;
                }
            }

            let value = match (&field.converter, field.ty.primitive_kind()) {
                (Some(converter), _) => {
                    converter.to_logical(&native, &ConversionContext::new(&field.ty, &resolver))?
                }
                (None, Some(kind)) => Value::from_native_scalar(kind, &native)?,
                (None, None) => {
                    return Err(InvokerError::StructureDefinition(format!(
                        "field '{}' of '{}' has type {} without a converter",
                        field.name,
                        descriptor.struct_type().name(),
                        field.ty
                    )))
                }
            };
            self.values[index] = value;
        }
        Ok(())
    }

    /// Overwrite the backing memory with `bytes` of a whole structure
    fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.size() {
            return Err(InvokerError::Conversion(format!(
                "'{}' occupies {} bytes, got {}",
                self.struct_type().name(),
                self.size(),
                bytes.len()
            )));
        }
        match &mut self.backing {
            Backing::Owned(memory) => memory.as_mut_slice().copy_from_slice(bytes),
            Backing::Borrowed(pointer) if pointer.is_null() => {}
            // Safety: a borrowed pointer covers the whole structure layout
            Backing::Borrowed(pointer) => unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), pointer.as_mut_ptr(), bytes.len())
            },
        }
        Ok(())
    }

    /// Store every field value into native memory.
    ///
    /// An unbound (null) instance is left untouched.
    pub fn write(&mut self) -> Result<()> {
        let base = self.pointer();
        if base.is_null() {
            return Ok(());
        }
        let descriptor = Arc::clone(&self.descriptor);
        let resolver = Arc::clone(&self.resolver);
        let mut keep_alive = Vec::new();

        for (index, field) in descriptor.fields().iter().enumerate() {
            let value = &mut self.values[index];
            if let Some(nested) = value.as_auto_write() {
                nested.auto_write(true)?;
            }

            let native = match (&field.converter, field.ty.primitive_kind()) {
                (_, _) if value.is_null() => NativeValue::Null,
                (Some(converter), _) => {
                    converter.to_native(value, &ConversionContext::new(&field.ty, &resolver))?
                }
                (None, Some(kind)) => value.to_native_scalar(kind)?,
                (None, None) => {
                    return Err(InvokerError::StructureDefinition(format!(
                        "field '{}' of '{}' has type {} without a converter",
                        field.name,
                        descriptor.struct_type().name(),
                        field.ty
                    )))
                }
            };

            // Safety: the backing memory covers every field offset of the layout
            unsafe { native.write_to(base.offset(field.offset).as_mut_ptr(), &field.layout)? };
            if let NativeValue::Buffer(memory) = native {
                keep_alive.push(memory);
            }
        }

        self.keep_alive = keep_alive;
        Ok(())
    }

    pub fn read_policy(&self) -> UpdatePolicy {
        self.read_policy
    }

    pub fn set_read_policy(&mut self, policy: UpdatePolicy) {
        self.read_policy = policy;
    }

    pub fn write_policy(&self) -> UpdatePolicy {
        self.write_policy
    }

    pub fn set_write_policy(&mut self, policy: UpdatePolicy) {
        self.write_policy = policy;
    }
}

impl AutoWrite for StructureInstance {
    fn auto_write(&mut self, from_usage: bool) -> Result<()> {
        if self.write_policy.applies(from_usage) {
            self.write()?;
        }
        Ok(())
    }
}

impl AutoRead for StructureInstance {
    fn auto_read(&mut self, from_usage: bool) -> Result<()> {
        if self.read_policy.applies(from_usage) {
            self.read()?;
        }
        Ok(())
    }
}

impl fmt::Debug for StructureInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.struct_type().name());
        s.field("@", &format_args!("{:#x}", self.address()));
        for (field, value) in self.descriptor.fields().iter().zip(&self.values) {
            s.field(&field.name, value);
        }
        s.finish()
    }
}
