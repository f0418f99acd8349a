use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{InvokerError, Result};
use crate::ffi::RawInvoker;
use crate::layout::LayoutResolver;
use crate::types::{LogicalType, Value};

use super::{at_position, CallDescriptor, FunctionSignature};

/// Ready-to-invoke adapter for one native function and signature
pub struct CallSite {
    address: usize,
    signature: FunctionSignature,
    descriptor: CallDescriptor,
    resolver: Arc<LayoutResolver>,
    invoker: Arc<dyn RawInvoker>,
}

impl CallSite {
    pub(crate) fn new(
        address: usize,
        signature: FunctionSignature,
        descriptor: CallDescriptor,
        resolver: Arc<LayoutResolver>,
        invoker: Arc<dyn RawInvoker>,
    ) -> Self {
        Self {
            address,
            signature,
            descriptor,
            resolver,
            invoker,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    /// Descriptor of the fixed parameters
    pub fn descriptor(&self) -> &CallDescriptor {
        &self.descriptor
    }

    /// Call the native function.
    ///
    /// For variadic signatures the arguments past the fixed parameters form the
    /// variadic tail; each one is typed by its runtime value and promoted.
    /// Structures are written before the call and read after it, and arrays
    /// receive whatever the native side wrote into their buffers.
    pub fn invoke(&self, args: &mut [Value]) -> Result<Option<Value>> {
        let fixed = self.signature.fixed_params();
        if !self.signature.validate_args(args.len()) {
            return Err(InvokerError::ArgumentCount {
                expected: fixed.len(),
                got: args.len(),
            });
        }

        let mut types: Vec<LogicalType> = Vec::with_capacity(args.len());
        for (position, (ty, value)) in fixed.iter().zip(args.iter()).enumerate() {
            if !ty.accepts(value) {
                return Err(InvokerError::Conversion(format!(
                    "argument {} expects {}, got {:?}",
                    position, ty, value
                )));
            }
            types.push(ty.clone());
        }

        let descriptor = match self.signature.variadic_element() {
            None => Cow::Borrowed(&self.descriptor),
            Some(element) => {
                let mut extra = Vec::with_capacity(args.len() - fixed.len());
                for (offset, value) in args[fixed.len()..].iter().enumerate() {
                    let position = fixed.len() + offset;
                    if !element.accepts(value) {
                        return Err(InvokerError::Conversion(format!(
                            "variadic argument {} expects {}, got {:?}",
                            position, element, value
                        )));
                    }
                    // Null has no runtime type; it travels as a null address
                    let ty = value.logical_type().unwrap_or(LogicalType::Pointer);
                    let layout = self
                        .resolver
                        .layout_of(&ty)
                        .map_err(|e| at_position(e, &format!("variadic argument {}", position)))?;
                    extra.push(layout.promoted());
                    types.push(ty);
                }
                Cow::Owned(self.descriptor.with_variadic(extra))
            }
        };

        for value in args.iter_mut() {
            if let Some(structure) = value.as_auto_write() {
                structure.auto_write(true)?;
            }
        }

        let registry = self.resolver.registry();
        let mut natives = Vec::with_capacity(args.len());
        for ((value, ty), layout) in args.iter().zip(&types).zip(descriptor.args()) {
            natives.push(registry.to_native_as(ty, value, &self.resolver)?.coerce(layout)?);
        }

        trace!(
            address = format_args!("{:#x}", self.address),
            descriptor = %descriptor,
            "invoking native function"
        );
        let raw = self.invoker.invoke(self.address, &descriptor, &natives)?;

        for ((value, ty), native) in args.iter_mut().zip(&types).zip(&natives) {
            match value.as_auto_read() {
                Some(structure) => structure.auto_read(true)?,
                None => registry.read_back(ty, value, native, &self.resolver)?,
            }
        }
        // The return value may point into an argument buffer, so it is
        // converted while the call buffers are still alive
        let result = match self.signature.returns() {
            None => None,
            Some(ty) => Some(registry.to_logical(ty, &raw, &self.resolver)?),
        };
        drop(natives);
        Ok(result)
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("address", &format_args!("{:#x}", self.address))
            .field("signature", &self.signature.to_string())
            .field("descriptor", &self.descriptor.to_string())
            .finish()
    }
}
