//! Call-Site Builder
//!
//! Turns a native function address and a [`FunctionSignature`] into a
//! [`CallSite`]: every parameter and return type is validated and resolved
//! to a layout once, and the resulting call site is cached per
//! (address, signature).
//!
//! ```text
//! (address, signature) ──► CallSiteCache ──► CallSite ──invoke(args)──► RawInvoker
//!                              │
//!                    variadic: descriptor extended per call, never cached
//! ```

mod signature;
mod site;

pub use signature::{CallDescriptor, FunctionSignature};
pub use site::CallSite;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{InvokerError, Result};
use crate::ffi::RawInvoker;
use crate::layout::LayoutResolver;
use crate::types::LogicalType;

/// Prefix the position of a type inside a signature to an unsupported-type error
pub(crate) fn at_position(err: InvokerError, position: &str) -> InvokerError {
    match err {
        InvokerError::UnsupportedType { ty, position: reason } => InvokerError::UnsupportedType {
            ty,
            position: format!("{}: {}", position, reason),
        },
        other => other,
    }
}

/// Builds and caches call sites
pub struct CallSiteCache {
    resolver: Arc<LayoutResolver>,
    invoker: Arc<dyn RawInvoker>,
    sites: Mutex<HashMap<(usize, FunctionSignature), Arc<CallSite>>>,
    descriptors_built: AtomicUsize,
}

impl CallSiteCache {
    pub fn new(resolver: Arc<LayoutResolver>, invoker: Arc<dyn RawInvoker>) -> Self {
        Self {
            resolver,
            invoker,
            sites: Mutex::new(HashMap::new()),
            descriptors_built: AtomicUsize::new(0),
        }
    }

    /// Cached call site for a non-variadic signature; variadic signatures
    /// always get a freshly built one
    pub fn get_or_build(
        &self,
        address: usize,
        signature: &FunctionSignature,
    ) -> Result<Arc<CallSite>> {
        if signature.is_variadic() {
            return self.build(address, signature).map(Arc::new);
        }

        // Held across the build so a descriptor is computed once per key
        let mut sites = self.sites.lock();
        let key = (address, signature.clone());
        if let Some(site) = sites.get(&key) {
            return Ok(Arc::clone(site));
        }
        let site = Arc::new(self.build(address, signature)?);
        sites.insert(key, Arc::clone(&site));
        Ok(site)
    }

    /// Validate `signature` and build an uncached call site
    pub fn build(&self, address: usize, signature: &FunctionSignature) -> Result<CallSite> {
        if address == 0 {
            return Err(InvokerError::NativeCall("null function address".to_string()));
        }

        let mut args = Vec::with_capacity(signature.fixed_params().len());
        for (position, ty) in signature.fixed_params().iter().enumerate() {
            let layout = self
                .resolver
                .layout_of(ty)
                .map_err(|e| at_position(e, &format!("parameter {}", position)))?;
            args.push(layout);
        }

        if let Some(element) = signature.variadic_element() {
            if *element != LogicalType::Any {
                self.resolver
                    .layout_of(element)
                    .map_err(|e| at_position(e, "variadic element"))?;
            }
        }

        let ret = match signature.returns() {
            Some(ty) => Some(
                self.resolver
                    .layout_of(ty)
                    .map_err(|e| at_position(e, "return"))?,
            ),
            None => None,
        };

        let descriptor = CallDescriptor::new(args, ret);
        self.descriptors_built.fetch_add(1, Ordering::Relaxed);
        debug!(
            address = format_args!("{:#x}", address),
            %signature,
            %descriptor,
            "built call site"
        );

        Ok(CallSite::new(
            address,
            signature.clone(),
            descriptor,
            Arc::clone(&self.resolver),
            Arc::clone(&self.invoker),
        ))
    }

    /// Number of descriptors computed so far, variadic ones included
    pub fn descriptors_built(&self) -> usize {
        self.descriptors_built.load(Ordering::Relaxed)
    }

    /// Number of cached call sites
    pub fn len(&self) -> usize {
        self.sites.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.lock().is_empty()
    }

    pub fn resolver(&self) -> &Arc<LayoutResolver> {
        &self.resolver
    }
}

#[cfg(test)]
mod tests;
