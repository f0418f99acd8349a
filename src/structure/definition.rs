//! Structure type declarations

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::LogicalType;

/// How a structure crosses the call boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Passing {
    /// Passed as the address of its backing memory
    #[default]
    ByReference,
    /// Passed as an aggregate copy of its bytes
    ByValue,
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDecl {
    pub name: String,
    pub ty: LogicalType,
    /// Explicit order priority; lower sorts first
    pub order: Option<i32>,
}

/// Declared shape of a user structure
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StructDefinition {
    name: String,
    fields: Vec<FieldDecl>,
    field_order: Option<Vec<String>>,
    passing: Passing,
}

/// Shared handle to a structure definition.
///
/// Two handles are the same type when their whole declaration matches, so
/// unrelated definitions that happen to share a name never share a layout.
#[derive(Clone)]
pub struct StructType(Arc<Declared>);

#[derive(Debug)]
struct Declared {
    definition: StructDefinition,
    fingerprint: u64,
}

impl StructType {
    pub fn builder(name: impl Into<String>) -> StructBuilder {
        StructBuilder {
            definition: StructDefinition {
                name: name.into(),
                fields: Vec::new(),
                field_order: None,
                passing: Passing::default(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.0.definition.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDecl] {
        &self.0.definition.fields
    }

    /// Type-level list of field names, if declared
    pub fn field_order(&self) -> Option<&[String]> {
        self.0.definition.field_order.as_deref()
    }

    pub fn passing(&self) -> Passing {
        self.0.definition.passing
    }

    pub fn logical(&self) -> LogicalType {
        LogicalType::Structure(self.clone())
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.fingerprint == other.0.fingerprint
                && self.0.definition == other.0.definition)
    }
}

impl Eq for StructType {}

impl Hash for StructType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.fingerprint);
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructType({})", self.0.definition.name)
    }
}

/// Builder for [`StructType`]
#[derive(Debug)]
pub struct StructBuilder {
    definition: StructDefinition,
}

impl StructBuilder {
    /// Add a field without an order priority
    pub fn field(mut self, name: impl Into<String>, ty: LogicalType) -> Self {
        self.definition.fields.push(FieldDecl {
            name: name.into(),
            ty,
            order: None,
        });
        self
    }

    /// Add a field with an explicit order priority
    pub fn ordered_field(mut self, name: impl Into<String>, ty: LogicalType, order: i32) -> Self {
        self.definition.fields.push(FieldDecl {
            name: name.into(),
            ty,
            order: Some(order),
        });
        self
    }

    /// Declare the memory order of the fields by name
    pub fn field_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.field_order = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn by_value(mut self) -> Self {
        self.definition.passing = Passing::ByValue;
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.definition.passing = Passing::ByReference;
        self
    }

    pub fn build(self) -> StructType {
        let mut hasher = DefaultHasher::new();
        self.definition.hash(&mut hasher);
        StructType(Arc::new(Declared {
            fingerprint: hasher.finish(),
            definition: self.definition,
        }))
    }
}
