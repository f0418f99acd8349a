//! Structure synchronization
//!
//! Maps user structures onto native memory: field order and offsets are
//! resolved once per type into a [`StructureDescriptor`], and each
//! [`StructureInstance`] copies field values between its logical form and its
//! backing memory on `read`/`write`, or automatically around native calls
//! according to its [`UpdatePolicy`].
//!
//! Field order is decided by the first rule that applies:
//!
//! 1. every field declares an order priority (partial declarations are an error)
//! 2. the structure declares a list of field names
//! 3. declaration order, with a warning

mod definition;
mod descriptor;
mod engine;
mod instance;

pub use definition::{FieldDecl, Passing, StructBuilder, StructDefinition, StructType};
pub use descriptor::{FieldBinding, FieldOrderSource, StructureDescriptor};
pub use engine::StructureEngine;
pub use instance::{AutoRead, AutoWrite, StructureInstance, UpdatePolicy};

#[cfg(test)]
mod tests;
