use std::sync::Arc;

use crate::converter::TypeConverter;
use crate::layout::{GroupLayout, Layout};
use crate::types::LogicalType;

use super::StructType;

/// Which rule decided the memory order of a structure's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrderSource {
    /// Every field carries an order priority
    Priority,
    /// The structure declares a list of field names
    NameList,
    /// Neither is present; declaration order is used
    Declaration,
}

/// A field bound to its position in native memory
#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub name: String,
    pub ty: LogicalType,
    pub offset: usize,
    pub layout: Layout,
    /// Converter for non-primitive fields; primitives are copied directly
    pub converter: Option<Arc<dyn TypeConverter>>,
}

/// Resolved, immutable description of a structure type
#[derive(Debug)]
pub struct StructureDescriptor {
    struct_type: StructType,
    fields: Vec<FieldBinding>,
    group: GroupLayout,
    order: FieldOrderSource,
}

impl StructureDescriptor {
    pub(crate) fn new(
        struct_type: StructType,
        fields: Vec<FieldBinding>,
        group: GroupLayout,
        order: FieldOrderSource,
    ) -> Self {
        Self {
            struct_type,
            fields,
            group,
            order,
        }
    }

    pub fn struct_type(&self) -> &StructType {
        &self.struct_type
    }

    /// Fields in memory order
    pub fn fields(&self) -> &[FieldBinding] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Aggregate layout with natural alignment and padding
    pub fn group(&self) -> &GroupLayout {
        &self.group
    }

    pub fn size(&self) -> usize {
        self.group.size()
    }

    pub fn align(&self) -> usize {
        self.group.align()
    }

    pub fn order_source(&self) -> FieldOrderSource {
        self.order
    }
}
