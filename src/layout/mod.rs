//! Native memory layouts
//!
//! A [`Layout`] describes how a value sits in native memory and how it is
//! classified by the calling convention: scalar, address, or aggregate group.

mod resolver;

pub use resolver::LayoutResolver;

use std::fmt;

use crate::types::PrimitiveKind;

/// Scalar kinds understood by the raw call mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    U16,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// Size in bytes; alignment equals size for every scalar
    pub fn size(&self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Variadic default promotion: narrow integers widen to I64, F32 widens to F64
    pub fn promoted(&self) -> ScalarKind {
        match self {
            ScalarKind::F32 | ScalarKind::F64 => ScalarKind::F64,
            _ => ScalarKind::I64,
        }
    }
}

impl From<PrimitiveKind> for ScalarKind {
    fn from(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Bool => ScalarKind::Bool,
            PrimitiveKind::I8 => ScalarKind::I8,
            PrimitiveKind::Char => ScalarKind::U16,
            PrimitiveKind::I16 => ScalarKind::I16,
            PrimitiveKind::I32 => ScalarKind::I32,
            PrimitiveKind::I64 => ScalarKind::I64,
            PrimitiveKind::F32 => ScalarKind::F32,
            PrimitiveKind::F64 => ScalarKind::F64,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::U16 => "u16",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A named member of a group layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupMember {
    pub name: String,
    pub offset: usize,
    pub layout: Layout,
}

/// Aggregate layout with C natural alignment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupLayout {
    name: Option<String>,
    members: Vec<GroupMember>,
    size: usize,
    align: usize,
}

impl GroupLayout {
    /// Lay out members in order, padding each to its alignment and the
    /// total size to the strictest member alignment.
    pub fn new<I>(name: Option<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (String, Layout)>,
    {
        let mut offset = 0;
        let mut align = 1;
        let mut placed = Vec::new();
        for (member_name, layout) in members {
            let member_align = layout.align();
            offset = align_up(offset, member_align);
            align = align.max(member_align);
            let size = layout.size();
            placed.push(GroupMember {
                name: member_name,
                offset,
                layout,
            });
            offset += size;
        }
        Self {
            name,
            members: placed,
            size: align_up(offset, align),
            align,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

/// Native memory layout of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layout {
    Scalar(ScalarKind),
    Address,
    Group(GroupLayout),
}

impl Layout {
    pub const BOOL: Layout = Layout::Scalar(ScalarKind::Bool);
    pub const I8: Layout = Layout::Scalar(ScalarKind::I8);
    pub const U16: Layout = Layout::Scalar(ScalarKind::U16);
    pub const I16: Layout = Layout::Scalar(ScalarKind::I16);
    pub const I32: Layout = Layout::Scalar(ScalarKind::I32);
    pub const I64: Layout = Layout::Scalar(ScalarKind::I64);
    pub const F32: Layout = Layout::Scalar(ScalarKind::F32);
    pub const F64: Layout = Layout::Scalar(ScalarKind::F64);

    pub fn size(&self) -> usize {
        match self {
            Layout::Scalar(kind) => kind.size(),
            Layout::Address => std::mem::size_of::<usize>(),
            Layout::Group(group) => group.size(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            Layout::Scalar(kind) => kind.size(),
            Layout::Address => std::mem::align_of::<usize>(),
            Layout::Group(group) => group.align(),
        }
    }

    /// Integer-class: integer scalars and addresses
    pub fn is_integer_class(&self) -> bool {
        match self {
            Layout::Scalar(kind) => kind.is_integer(),
            Layout::Address => true,
            Layout::Group(_) => false,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Layout::Scalar(kind) if kind.is_float())
    }

    pub fn as_group(&self) -> Option<&GroupLayout> {
        match self {
            Layout::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Layout after variadic default promotion
    pub fn promoted(&self) -> Layout {
        match self {
            Layout::Scalar(kind) => Layout::Scalar(kind.promoted()),
            other => other.clone(),
        }
    }
}

impl From<PrimitiveKind> for Layout {
    fn from(kind: PrimitiveKind) -> Self {
        Layout::Scalar(kind.into())
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Scalar(kind) => write!(f, "{}", kind),
            Layout::Address => write!(f, "ptr"),
            Layout::Group(group) => {
                if let Some(name) = group.name() {
                    write!(f, "{}", name)?;
                }
                write!(f, "{{")?;
                for (i, member) in group.members().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}@{}: {}", member.name, member.offset, member.layout)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests;
