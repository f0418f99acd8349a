//! Native Context
//!
//! Owns one of each registry and cache and wires them together: converter
//! registry, structure engine, layout resolver, call-site cache, symbol
//! resolver, and the dispatcher cache. Create it once at startup and share
//! it by reference.

use std::sync::Arc;

use tracing::debug;

use crate::callsite::{CallSite, CallSiteCache, FunctionSignature};
use crate::config::InvokerConfig;
use crate::converter::{ConverterRegistry, TypeConverter};
use crate::error::Result;
use crate::ffi::{invoker_for, LibraryLoader, RawInvoker, SymbolResolver};
use crate::layout::{Layout, LayoutResolver};
use crate::proxy::{Dispatcher, DispatcherCache, InterfaceDefinition};
use crate::structure::{StructType, StructureDescriptor, StructureEngine, StructureInstance};
use crate::types::{LogicalType, Pointer, Value};

/// Entry point tying the marshalling engine to a raw call mechanism
pub struct NativeContext {
    config: InvokerConfig,
    registry: Arc<ConverterRegistry>,
    resolver: Arc<LayoutResolver>,
    call_sites: Arc<CallSiteCache>,
    symbols: Arc<dyn SymbolResolver>,
    dispatchers: DispatcherCache,
}

impl NativeContext {
    /// Context with default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn from_config(config: InvokerConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> NativeContextBuilder {
        NativeContextBuilder::default()
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    pub fn structures(&self) -> &Arc<StructureEngine> {
        self.resolver.structures()
    }

    pub fn resolver(&self) -> &Arc<LayoutResolver> {
        &self.resolver
    }

    pub fn call_sites(&self) -> &Arc<CallSiteCache> {
        &self.call_sites
    }

    pub fn symbols(&self) -> &Arc<dyn SymbolResolver> {
        &self.symbols
    }

    /// Register a converter for every type it declares
    pub fn register_converter(&self, converter: Arc<dyn TypeConverter>) -> Result<()> {
        self.registry.register_converter(converter)
    }

    pub fn layout_of(&self, ty: &LogicalType) -> Result<Layout> {
        self.resolver.layout_of(ty)
    }

    pub fn describe(&self, ty: &StructType) -> Result<Arc<StructureDescriptor>> {
        self.structures().describe(ty, &self.resolver)
    }

    /// New zeroed instance of `ty`
    pub fn instantiate(&self, ty: &StructType) -> Result<StructureInstance> {
        self.structures().instantiate(ty, &self.resolver)
    }

    /// Instance of `ty` over existing native memory
    pub fn view(&self, ty: &StructType, pointer: Pointer) -> Result<StructureInstance> {
        self.structures().view(ty, &self.resolver, pointer)
    }

    /// Resolve `name` in `library` and get its call site for `signature`
    pub fn call_site(
        &self,
        library: &str,
        name: &str,
        signature: &FunctionSignature,
    ) -> Result<Arc<CallSite>> {
        let address = self.symbols.resolve(library, name)?;
        self.call_sites.get_or_build(address, signature)
    }

    /// One-off call without declaring an interface
    pub fn call(
        &self,
        library: &str,
        name: &str,
        signature: &FunctionSignature,
        args: &mut [Value],
    ) -> Result<Option<Value>> {
        self.call_site(library, name, signature)?.invoke(args)
    }

    /// Dispatcher for `definition`, bound once per interface
    pub fn load(&self, definition: &InterfaceDefinition) -> Result<Arc<Dispatcher>> {
        self.dispatchers
            .get_or_bind(definition, self.symbols.as_ref(), &self.call_sites)
    }
}

/// Builder for [`NativeContext`]; unset parts come from the configuration
#[derive(Default)]
pub struct NativeContextBuilder {
    config: InvokerConfig,
    registry: Option<Arc<ConverterRegistry>>,
    invoker: Option<Arc<dyn RawInvoker>>,
    symbols: Option<Arc<dyn SymbolResolver>>,
}

impl NativeContextBuilder {
    pub fn config(mut self, config: InvokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `registry` instead of a fresh registry of built-in converters
    pub fn registry(mut self, registry: Arc<ConverterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `invoker` instead of the configured backend
    pub fn invoker(mut self, invoker: Arc<dyn RawInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Use `symbols` instead of a library loader built from the configuration
    pub fn symbols(mut self, symbols: Arc<dyn SymbolResolver>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn build(self) -> Result<NativeContext> {
        self.config.validate()?;

        let invoker = match self.invoker {
            Some(invoker) => invoker,
            None => invoker_for(self.config.invoker.backend)?,
        };
        let symbols = self
            .symbols
            .unwrap_or_else(|| Arc::new(LibraryLoader::from_config(&self.config.libraries)));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ConverterRegistry::new()));
        let structures = Arc::new(StructureEngine::from_config(&self.config.structures));
        let resolver = LayoutResolver::new(Arc::clone(&registry), structures);
        let call_sites = Arc::new(CallSiteCache::new(Arc::clone(&resolver), invoker));

        debug!(
            backend = ?self.config.invoker.backend,
            converters = registry.len(),
            "native context ready"
        );

        Ok(NativeContext {
            config: self.config,
            registry,
            resolver,
            call_sites,
            symbols,
            dispatchers: DispatcherCache::new(),
        })
    }
}
