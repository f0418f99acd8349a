//! Structure description and allocation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::StructureConfig;
use crate::error::{InvokerError, Result};
use crate::layout::{GroupLayout, LayoutResolver};
use crate::types::{Memory, Pointer};

use super::{
    FieldBinding, FieldDecl, FieldOrderSource, StructType, StructureDescriptor, StructureInstance,
    UpdatePolicy,
};

/// Describes structure types once and hands out instances bound to memory
pub struct StructureEngine {
    descriptors: Mutex<HashMap<StructType, Arc<StructureDescriptor>>>,
    read_policy: UpdatePolicy,
    write_policy: UpdatePolicy,
    warn_on_declaration_order: bool,
}

impl StructureEngine {
    pub fn new() -> Self {
        Self::from_config(&StructureConfig::default())
    }

    /// Engine whose instances start with the configured policies
    pub fn from_config(config: &StructureConfig) -> Self {
        Self {
            descriptors: Mutex::new(HashMap::new()),
            read_policy: config.read_policy,
            write_policy: config.write_policy,
            warn_on_declaration_order: config.warn_on_declaration_order,
        }
    }

    /// Resolve field order, offsets, and per-field converters for `ty`.
    ///
    /// Descriptors are cached per structure type; concurrent first calls
    /// converge on a single published descriptor.
    pub fn describe(
        &self,
        ty: &StructType,
        resolver: &LayoutResolver,
    ) -> Result<Arc<StructureDescriptor>> {
        if let Some(descriptor) = self.descriptors.lock().get(ty) {
            return Ok(Arc::clone(descriptor));
        }

        // Built without the lock held: nested by-value structures describe recursively
        let descriptor = Arc::new(self.build(ty, resolver)?);
        let mut descriptors = self.descriptors.lock();
        Ok(Arc::clone(descriptors.entry(ty.clone()).or_insert(descriptor)))
    }

    fn build(&self, ty: &StructType, resolver: &LayoutResolver) -> Result<StructureDescriptor> {
        let (ordered, order) = self.ordered_fields(ty)?;

        let mut layouts = Vec::with_capacity(ordered.len());
        for field in &ordered {
            let layout = resolver.layout_of(&field.ty).map_err(|e| {
                InvokerError::StructureDefinition(format!(
                    "field '{}' of '{}': {}",
                    field.name,
                    ty.name(),
                    e
                ))
            })?;
            layouts.push((field.name.clone(), layout));
        }
        let group = GroupLayout::new(Some(ty.name().to_string()), layouts);

        let fields = ordered
            .iter()
            .zip(group.members())
            .map(|(field, member)| {
                let converter = if field.ty.is_primitive_or_boxed() {
                    None
                } else {
                    resolver.registry().lookup(&field.ty).ok()
                };
                FieldBinding {
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                    offset: member.offset,
                    layout: member.layout.clone(),
                    converter,
                }
            })
            .collect();

        debug!(
            structure = ty.name(),
            size = group.size(),
            align = group.align(),
            ?order,
            "described structure"
        );
        Ok(StructureDescriptor::new(ty.clone(), fields, group, order))
    }

    fn ordered_fields<'a>(
        &self,
        ty: &'a StructType,
    ) -> Result<(Vec<&'a FieldDecl>, FieldOrderSource)> {
        let fields = ty.fields();

        let annotated = fields.iter().filter(|f| f.order.is_some()).count();
        if annotated > 0 {
            if annotated != fields.len() {
                return Err(InvokerError::StructureDefinition(format!(
                    "'{}': either all fields or none must declare an order ({} of {} do)",
                    ty.name(),
                    annotated,
                    fields.len()
                )));
            }
            let mut sorted: Vec<&FieldDecl> = fields.iter().collect();
            sorted.sort_by_key(|f| f.order);
            if let Some(pair) = sorted.windows(2).find(|pair| pair[0].order == pair[1].order) {
                return Err(InvokerError::StructureDefinition(format!(
                    "'{}': fields '{}' and '{}' share order {}",
                    ty.name(),
                    pair[0].name,
                    pair[1].name,
                    pair[0].order.unwrap_or_default()
                )));
            }
            return Ok((sorted, FieldOrderSource::Priority));
        }

        if let Some(names) = ty.field_order() {
            if names.len() != fields.len() {
                return Err(InvokerError::StructureDefinition(format!(
                    "'{}': field order lists {} names for {} fields",
                    ty.name(),
                    names.len(),
                    fields.len()
                )));
            }
            let mut seen = HashSet::new();
            let mut sorted = Vec::with_capacity(names.len());
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(InvokerError::StructureDefinition(format!(
                        "'{}': field order names '{}' twice",
                        ty.name(),
                        name
                    )));
                }
                let field = fields.iter().find(|f| &f.name == name).ok_or_else(|| {
                    InvokerError::StructureDefinition(format!(
                        "'{}': field order names unknown field '{}'",
                        ty.name(),
                        name
                    ))
                })?;
                sorted.push(field);
            }
            return Ok((sorted, FieldOrderSource::NameList));
        }

        if self.warn_on_declaration_order && !fields.is_empty() {
            warn!(
                structure = ty.name(),
                "no field order declared; falling back to declaration order"
            );
        }
        Ok((fields.iter().collect(), FieldOrderSource::Declaration))
    }

    /// Zeroed memory sized and aligned for `descriptor`
    pub fn allocate(&self, descriptor: &StructureDescriptor) -> Result<Memory> {
        Memory::allocate(descriptor.size(), descriptor.align())
    }

    /// New instance of `ty` backed by freshly allocated zeroed memory
    pub fn instantiate(
        &self,
        ty: &StructType,
        resolver: &LayoutResolver,
    ) -> Result<StructureInstance> {
        let descriptor = self.describe(ty, resolver)?;
        let memory = self.allocate(&descriptor)?;
        let mut instance = StructureInstance::owned(descriptor, resolver.handle()?, memory);
        instance.set_read_policy(self.read_policy);
        instance.set_write_policy(self.write_policy);
        Ok(instance)
    }

    /// Instance of `ty` viewing native memory at `pointer`; nothing is read yet
    pub fn view(
        &self,
        ty: &StructType,
        resolver: &LayoutResolver,
        pointer: Pointer,
    ) -> Result<StructureInstance> {
        let descriptor = self.describe(ty, resolver)?;
        let mut instance = StructureInstance::borrowed(descriptor, resolver.handle()?, pointer);
        instance.set_read_policy(self.read_policy);
        instance.set_write_policy(self.write_policy);
        Ok(instance)
    }

    /// Instance of `ty` holding a private copy of `bytes`
    pub fn from_bytes(
        &self,
        ty: &StructType,
        resolver: &LayoutResolver,
        bytes: &[u8],
    ) -> Result<StructureInstance> {
        let descriptor = self.describe(ty, resolver)?;
        if bytes.len() != descriptor.size() {
            return Err(InvokerError::Conversion(format!(
                "'{}' occupies {} bytes, got {}",
                ty.name(),
                descriptor.size(),
                bytes.len()
            )));
        }
        let memory = Memory::from_bytes(bytes, descriptor.align())?;
        let mut instance = StructureInstance::owned(descriptor, resolver.handle()?, memory);
        instance.set_read_policy(self.read_policy);
        instance.set_write_policy(self.write_policy);
        Ok(instance)
    }

    pub fn read_policy(&self) -> UpdatePolicy {
        self.read_policy
    }

    pub fn write_policy(&self) -> UpdatePolicy {
        self.write_policy
    }

    /// Number of cached descriptors
    pub fn cached(&self) -> usize {
        self.descriptors.lock().len()
    }
}

impl Default for StructureEngine {
    fn default() -> Self {
        Self::new()
    }
}
