//! Native-side values handed to and received from the raw call mechanism

use crate::error::{InvokerError, Result};
use crate::layout::{Layout, ScalarKind};

use super::Memory;

/// A value in native representation
#[derive(Debug)]
pub enum NativeValue {
    /// No value (void return)
    Void,
    /// Null address, or zero for a missing boxed primitive
    Null,
    Bool(bool),
    I8(i8),
    U16(u16),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Raw address owned by someone else
    Address(usize),
    /// Buffer allocated for the duration of one call; passed by address
    Buffer(Memory),
    /// Bytes of a by-value aggregate
    Group(Vec<u8>),
}

impl NativeValue {
    /// Integer of `kind` holding `v`; values outside the target range fail
    fn integer(kind: ScalarKind, v: i64) -> Result<Self> {
        let overflow = |_| InvokerError::Conversion(format!("{} does not fit in {}", v, kind));
        Ok(match kind {
            ScalarKind::Bool => NativeValue::Bool(v != 0),
            ScalarKind::I8 => NativeValue::I8(i8::try_from(v).map_err(overflow)?),
            ScalarKind::U16 => NativeValue::U16(u16::try_from(v).map_err(overflow)?),
            ScalarKind::I16 => NativeValue::I16(i16::try_from(v).map_err(overflow)?),
            ScalarKind::I32 => NativeValue::I32(i32::try_from(v).map_err(overflow)?),
            ScalarKind::I64 => NativeValue::I64(v),
            ScalarKind::F32 | ScalarKind::F64 => Self::float(kind, v as f64),
        })
    }

    fn float(kind: ScalarKind, v: f64) -> Self {
        match kind {
            ScalarKind::F32 => NativeValue::F32(v as f32),
            _ => NativeValue::F64(v),
        }
    }

    /// Integer-class content, sign-extended
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Bool(b) => Some(*b as i64),
            NativeValue::I8(v) => Some(*v as i64),
            NativeValue::U16(v) => Some(*v as i64),
            NativeValue::I16(v) => Some(*v as i64),
            NativeValue::I32(v) => Some(*v as i64),
            NativeValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::F32(v) => Some(*v as f64),
            NativeValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Address carried by this value; null counts as address zero
    pub fn address(&self) -> Option<usize> {
        match self {
            NativeValue::Null => Some(0),
            NativeValue::Address(addr) => Some(*addr),
            NativeValue::Buffer(memory) => Some(memory.address()),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, NativeValue::Void)
    }

    /// Copy of a value that owns no memory
    pub fn clone_scalar(&self) -> Result<NativeValue> {
        Ok(match self {
            NativeValue::Void => NativeValue::Void,
            NativeValue::Null => NativeValue::Null,
            NativeValue::Bool(v) => NativeValue::Bool(*v),
            NativeValue::I8(v) => NativeValue::I8(*v),
            NativeValue::U16(v) => NativeValue::U16(*v),
            NativeValue::I16(v) => NativeValue::I16(*v),
            NativeValue::I32(v) => NativeValue::I32(*v),
            NativeValue::I64(v) => NativeValue::I64(*v),
            NativeValue::F32(v) => NativeValue::F32(*v),
            NativeValue::F64(v) => NativeValue::F64(*v),
            NativeValue::Address(v) => NativeValue::Address(*v),
            NativeValue::Group(bytes) => NativeValue::Group(bytes.clone()),
            NativeValue::Buffer(_) => {
                return Err(InvokerError::Conversion(
                    "a call buffer cannot be duplicated".to_string(),
                ))
            }
        })
    }

    /// Reshape this value to match `layout`.
    ///
    /// Integer kinds convert among themselves, as do float kinds; crossing
    /// between the two classes is a conversion error.
    pub fn coerce(self, layout: &Layout) -> Result<NativeValue> {
        match layout {
            Layout::Scalar(kind) => {
                if matches!(self, NativeValue::Null) {
                    return Ok(NativeValue::Null);
                }
                let mismatch =
                    || InvokerError::Conversion(format!("{:?} does not fit layout {}", self, layout));
                if kind.is_float() {
                    self.as_f64().map(|v| Self::float(*kind, v)).ok_or_else(mismatch)
                } else {
                    Self::integer(*kind, self.as_i64().ok_or_else(mismatch)?)
                }
            }
            Layout::Address => match self {
                NativeValue::Null | NativeValue::Address(_) | NativeValue::Buffer(_) => Ok(self),
                other => match other.as_i64() {
                    Some(v) if !matches!(other, NativeValue::Bool(_)) => {
                        Ok(NativeValue::Address(v as usize))
                    }
                    _ => Err(InvokerError::Conversion(format!(
                        "{:?} is not an address",
                        other
                    ))),
                },
            },
            Layout::Group(group) => match self {
                NativeValue::Null => Ok(self),
                NativeValue::Group(ref bytes) if bytes.len() == group.size() => Ok(self),
                other => Err(InvokerError::Conversion(format!(
                    "{:?} does not fit aggregate layout {}",
                    other, layout
                ))),
            },
        }
    }

    /// Encode as a 64-bit integer register word
    pub fn to_register(&self) -> u64 {
        match self {
            NativeValue::Void | NativeValue::Null | NativeValue::Group(_) => 0,
            NativeValue::F32(v) => v.to_bits() as u64,
            NativeValue::F64(v) => v.to_bits(),
            NativeValue::Address(addr) => *addr as u64,
            NativeValue::Buffer(memory) => memory.address() as u64,
            other => other.as_i64().unwrap_or(0) as u64,
        }
    }

    /// Decode a 64-bit register word according to `layout`.
    ///
    /// Returns `None` for aggregate layouts, which never travel in one register.
    pub fn from_register(bits: u64, layout: &Layout) -> Option<NativeValue> {
        let value = match layout {
            Layout::Scalar(ScalarKind::Bool) => NativeValue::Bool(bits as u8 != 0),
            Layout::Scalar(ScalarKind::I8) => NativeValue::I8(bits as i8),
            Layout::Scalar(ScalarKind::U16) => NativeValue::U16(bits as u16),
            Layout::Scalar(ScalarKind::I16) => NativeValue::I16(bits as i16),
            Layout::Scalar(ScalarKind::I32) => NativeValue::I32(bits as i32),
            Layout::Scalar(ScalarKind::I64) => NativeValue::I64(bits as i64),
            Layout::Scalar(ScalarKind::F32) => NativeValue::F32(f32::from_bits(bits as u32)),
            Layout::Scalar(ScalarKind::F64) => NativeValue::F64(f64::from_bits(bits)),
            Layout::Address => NativeValue::Address(bits as usize),
            Layout::Group(_) => return None,
        };
        Some(value)
    }

    /// Store this value at `dst` using `layout`.
    ///
    /// Null stores zero bytes over the whole layout.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of `layout.size()` bytes.
    pub unsafe fn write_to(&self, dst: *mut u8, layout: &Layout) -> Result<()> {
        if matches!(self, NativeValue::Null) {
            std::ptr::write_bytes(dst, 0, layout.size());
            return Ok(());
        }
        match layout {
            Layout::Scalar(kind) => match self.clone_scalar()?.coerce(layout)? {
                NativeValue::Bool(v) => dst.write(v as u8),
                NativeValue::I8(v) => (dst as *mut i8).write_unaligned(v),
                NativeValue::U16(v) => (dst as *mut u16).write_unaligned(v),
                NativeValue::I16(v) => (dst as *mut i16).write_unaligned(v),
                NativeValue::I32(v) => (dst as *mut i32).write_unaligned(v),
                NativeValue::I64(v) => (dst as *mut i64).write_unaligned(v),
                NativeValue::F32(v) => (dst as *mut f32).write_unaligned(v),
                NativeValue::F64(v) => (dst as *mut f64).write_unaligned(v),
                other => {
                    return Err(InvokerError::Conversion(format!(
                        "{:?} cannot be stored as {}",
                        other, kind
                    )))
                }
            },
            Layout::Address => {
                let addr = self.address().or_else(|| self.as_i64().map(|v| v as usize));
                match addr {
                    Some(addr) => (dst as *mut usize).write_unaligned(addr),
                    None => {
                        return Err(InvokerError::Conversion(format!(
                            "{:?} cannot be stored as an address",
                            self
                        )))
                    }
                }
            }
            Layout::Group(group) => match self {
                NativeValue::Group(bytes) if bytes.len() == group.size() => {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
                }
                NativeValue::Address(src) if *src != 0 => {
                    std::ptr::copy_nonoverlapping(*src as *const u8, dst, group.size());
                }
                other => {
                    return Err(InvokerError::Conversion(format!(
                        "{:?} cannot be stored as {}",
                        other, layout
                    )))
                }
            },
        }
        Ok(())
    }

    /// Load a value of `layout` from `src`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads of `layout.size()` bytes.
    pub unsafe fn read_from(src: *const u8, layout: &Layout) -> NativeValue {
        match layout {
            Layout::Scalar(ScalarKind::Bool) => NativeValue::Bool(src.read() != 0),
            Layout::Scalar(ScalarKind::I8) => NativeValue::I8((src as *const i8).read_unaligned()),
            Layout::Scalar(ScalarKind::U16) => {
                NativeValue::U16((src as *const u16).read_unaligned())
            }
            Layout::Scalar(ScalarKind::I16) => {
                NativeValue::I16((src as *const i16).read_unaligned())
            }
            Layout::Scalar(ScalarKind::I32) => {
                NativeValue::I32((src as *const i32).read_unaligned())
            }
            Layout::Scalar(ScalarKind::I64) => {
                NativeValue::I64((src as *const i64).read_unaligned())
            }
            Layout::Scalar(ScalarKind::F32) => {
                NativeValue::F32((src as *const f32).read_unaligned())
            }
            Layout::Scalar(ScalarKind::F64) => {
                NativeValue::F64((src as *const f64).read_unaligned())
            }
            Layout::Address => NativeValue::Address((src as *const usize).read_unaligned()),
            Layout::Group(group) => {
                NativeValue::Group(std::slice::from_raw_parts(src, group.size()).to_vec())
            }
        }
    }
}
