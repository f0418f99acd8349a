use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::callsite::{CallSite, CallSiteCache};
use crate::config::ConfigError;
use crate::error::{InvokerError, Result};
use crate::ffi::SymbolResolver;
use crate::types::Value;

use super::{InterfaceDefinition, MethodDefinition};

/// Introspection method answered without a native call
pub const TO_STRING: &str = "to_string";
/// Introspection method answered without a native call
pub const HASH_CODE: &str = "hash_code";

struct MethodSlot {
    method: MethodDefinition,
    address: usize,
    site: OnceCell<Arc<CallSite>>,
}

/// Routes method invocations on a bound interface to native call sites.
///
/// Symbols are resolved when the interface is bound; call sites are built on
/// first use of each method. Variadic methods get a fresh call site per call.
pub struct Dispatcher {
    interface: String,
    library: String,
    slots: Vec<MethodSlot>,
    by_name: HashMap<String, Vec<usize>>,
    call_sites: Arc<CallSiteCache>,
}

impl Dispatcher {
    /// Resolve every method of `definition` and bind it
    pub fn bind(
        definition: &InterfaceDefinition,
        symbols: &dyn SymbolResolver,
        call_sites: Arc<CallSiteCache>,
    ) -> Result<Self> {
        if definition.library().is_empty() {
            return Err(InvokerError::LibraryLoad(format!(
                "interface '{}' names no native library",
                definition.name()
            )));
        }

        let mut slots = Vec::with_capacity(definition.methods().len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for method in definition.methods() {
            let address = symbols.resolve(definition.library(), &method.name)?;
            by_name
                .entry(method.name.clone())
                .or_default()
                .push(slots.len());
            slots.push(MethodSlot {
                method: method.clone(),
                address,
                site: OnceCell::new(),
            });
        }

        debug!(
            interface = definition.name(),
            library = definition.library(),
            methods = slots.len(),
            "bound native interface"
        );

        Ok(Self {
            interface: definition.name().to_string(),
            library: definition.library().to_string(),
            slots,
            by_name,
            call_sites,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.slots.iter().map(|slot| &slot.method)
    }

    /// Resolved address of the first method named `method`
    pub fn address_of(&self, method: &str) -> Option<usize> {
        self.by_name
            .get(method)
            .and_then(|indices| indices.first())
            .map(|&index| self.slots[index].address)
    }

    /// Identity hash of this dispatcher
    pub fn hash_code(&self) -> i64 {
        self as *const Self as usize as i64
    }

    /// Invoke `method` with `args`, which are updated in place by read-back.
    ///
    /// `to_string` and `hash_code` with no arguments are answered locally
    /// unless the interface declares methods with those names.
    pub fn invoke(&self, method: &str, args: &mut [Value]) -> Result<Option<Value>> {
        if args.is_empty() && !self.by_name.contains_key(method) {
            match method {
                TO_STRING => return Ok(Some(Value::Str(self.to_string()))),
                HASH_CODE => return Ok(Some(Value::I64(self.hash_code()))),
                _ => {}
            }
        }

        let slot = self.select(method, args)?;
        trace!(
            interface = %self.interface,
            method,
            signature = %slot.method.signature,
            "dispatching"
        );
        let site = self.call_site(slot)?;
        site.invoke(args)
    }

    fn select(&self, method: &str, args: &[Value]) -> Result<&MethodSlot> {
        let unknown = || InvokerError::UnknownMethod {
            interface: self.interface.clone(),
            method: method.to_string(),
        };
        let candidates = self.by_name.get(method).ok_or_else(unknown)?;

        // A single declaration reports its own argument errors
        if let [index] = candidates.as_slice() {
            return Ok(&self.slots[*index]);
        }
        candidates
            .iter()
            .map(|&index| &self.slots[index])
            .find(|slot| slot.method.signature.accepts(args))
            .ok_or_else(|| {
                InvokerError::Conversion(format!(
                    "no overload of {}.{} accepts {} argument(s) of these types",
                    self.interface,
                    method,
                    args.len()
                ))
            })
    }

    fn call_site(&self, slot: &MethodSlot) -> Result<Arc<CallSite>> {
        if slot.method.signature.is_variadic() {
            return self
                .call_sites
                .get_or_build(slot.address, &slot.method.signature);
        }
        slot.site
            .get_or_try_init(|| {
                self.call_sites
                    .get_or_build(slot.address, &slot.method.signature)
            })
            .map(Arc::clone)
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}$NativeProxy", self.interface)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("interface", &self.interface)
            .field("library", &self.library)
            .field("methods", &self.slots.len())
            .finish()
    }
}

/// Bound dispatchers keyed by interface and library.
///
/// Requesting a bound interface again with a different method list is an error.
#[derive(Default)]
pub struct DispatcherCache {
    dispatchers: Mutex<HashMap<(String, String), Arc<Dispatcher>>>,
}

impl DispatcherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher for `definition`, binding it on first request
    pub fn get_or_bind(
        &self,
        definition: &InterfaceDefinition,
        symbols: &dyn SymbolResolver,
        call_sites: &Arc<CallSiteCache>,
    ) -> Result<Arc<Dispatcher>> {
        let key = (
            definition.name().to_string(),
            definition.library().to_string(),
        );
        let mut dispatchers = self.dispatchers.lock();
        if let Some(dispatcher) = dispatchers.get(&key) {
            if !dispatcher.methods().eq(definition.methods()) {
                return Err(InvokerError::Config(ConfigError::Invalid(format!(
                    "interface '{}' on '{}' is already bound with different methods",
                    key.0, key.1
                ))));
            }
            return Ok(Arc::clone(dispatcher));
        }
        let dispatcher = Arc::new(Dispatcher::bind(
            definition,
            symbols,
            Arc::clone(call_sites),
        )?);
        dispatchers.insert(key, Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    pub fn len(&self) -> usize {
        self.dispatchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.lock().is_empty()
    }
}
