//! Owned native memory and raw pointers

use std::alloc::{self, Layout as AllocLayout};
use std::ffi::CStr;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{InvokerError, Result};

use super::WString;

/// Zero-initialized native memory, released on drop
pub struct Memory {
    /// Start of the allocation
    ptr: NonNull<u8>,
    /// Requested size in bytes (may be zero)
    size: usize,
    /// Allocation layout actually used
    alloc: AllocLayout,
}

impl Memory {
    /// Allocate `size` zeroed bytes aligned to `align`
    pub fn allocate(size: usize, align: usize) -> Result<Self> {
        // Zero-sized requests still get a unique, dereferenceable address
        let alloc = AllocLayout::from_size_align(size.max(1), align.max(1))
            .map_err(|e| InvokerError::Conversion(format!("invalid allocation: {}", e)))?;
        let raw = unsafe { alloc::alloc_zeroed(alloc) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            InvokerError::Conversion(format!("out of memory allocating {} bytes", size))
        })?;
        Ok(Self { ptr, size, alloc })
    }

    /// Allocate a copy of `bytes`
    pub fn from_bytes(bytes: &[u8], align: usize) -> Result<Self> {
        let mut memory = Self::allocate(bytes.len(), align)?;
        memory.as_mut_slice().copy_from_slice(bytes);
        Ok(memory)
    }

    /// Allocate a null-terminated single-byte copy of `s`
    pub fn from_c_string(s: &str) -> Result<Self> {
        if s.as_bytes().contains(&0) {
            return Err(InvokerError::Conversion(format!(
                "string contains an interior NUL byte: {:?}",
                s
            )));
        }
        let mut memory = Self::allocate(s.len() + 1, 1)?;
        memory.as_mut_slice()[..s.len()].copy_from_slice(s.as_bytes());
        Ok(memory)
    }

    /// Allocate a null-terminated `wchar_t` copy of `s`
    pub fn from_wide_string(s: &WString) -> Result<Self> {
        let units = s.to_wide();
        let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_ne_bytes()).collect();
        Self::from_bytes(&bytes, std::mem::align_of::<libc::wchar_t>())
    }

    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn pointer(&self) -> Pointer {
        Pointer::new(self.address())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Set every byte to zero
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.alloc) }
    }
}

// Safety: Memory exclusively owns its allocation
unsafe impl Send for Memory {}
unsafe impl Sync for Memory {}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("size", &self.size)
            .finish()
    }
}

/// Raw native address with unchecked peek/poke helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pointer(usize);

impl Pointer {
    pub const NULL: Pointer = Pointer(0);

    pub fn new(address: usize) -> Self {
        Pointer(address)
    }

    pub fn address(&self) -> usize {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Pointer `bytes` past this one
    pub fn offset(&self, bytes: usize) -> Pointer {
        Pointer(self.0.wrapping_add(bytes))
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// # Safety
    ///
    /// `self + offset` must be valid for reads of `T`.
    pub unsafe fn read<T: Copy>(&self, offset: usize) -> T {
        (self.offset(offset).as_ptr() as *const T).read_unaligned()
    }

    /// # Safety
    ///
    /// `self + offset` must be valid for writes of `T`.
    pub unsafe fn write<T: Copy>(&self, offset: usize, value: T) {
        (self.offset(offset).as_mut_ptr() as *mut T).write_unaligned(value)
    }

    /// # Safety
    ///
    /// `self + offset` must hold a pointer-sized value.
    pub unsafe fn get_pointer(&self, offset: usize) -> Pointer {
        Pointer(self.read::<usize>(offset))
    }

    /// # Safety
    ///
    /// `self + offset` must be valid for a pointer-sized write.
    pub unsafe fn set_pointer(&self, offset: usize, value: Pointer) {
        self.write::<usize>(offset, value.0)
    }

    /// # Safety
    ///
    /// `self` must be valid for writes of `len` bytes.
    pub unsafe fn fill(&self, len: usize, byte: u8) {
        std::ptr::write_bytes(self.as_mut_ptr(), byte, len)
    }

    /// # Safety
    ///
    /// `self` must be valid for reads of `len` bytes.
    pub unsafe fn read_bytes(&self, len: usize) -> Vec<u8> {
        std::slice::from_raw_parts(self.as_ptr(), len).to_vec()
    }

    /// Decode the null-terminated single-byte string at this address
    ///
    /// # Safety
    ///
    /// `self` must point to a null-terminated buffer.
    pub unsafe fn read_c_string(&self) -> Result<String> {
        if self.is_null() {
            return Err(InvokerError::Conversion("null string pointer".to_string()));
        }
        CStr::from_ptr(self.as_ptr() as *const libc::c_char)
            .to_str()
            .map(str::to_string)
            .map_err(|e| InvokerError::Conversion(format!("native string is not UTF-8: {}", e)))
    }

    /// Decode the null-terminated `wchar_t` string at this address
    ///
    /// # Safety
    ///
    /// `self` must point to a `wchar_t` buffer terminated by a zero unit.
    pub unsafe fn read_wide_string(&self) -> Result<WString> {
        if self.is_null() {
            return Err(InvokerError::Conversion("null string pointer".to_string()));
        }
        let base = self.as_ptr() as *const libc::wchar_t;
        let mut len = 0;
        while base.add(len).read_unaligned() != 0 {
            len += 1;
        }
        let units: Vec<libc::wchar_t> = (0..len).map(|i| base.add(i).read_unaligned()).collect();
        Ok(WString::from_wide(&units))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native@{:#x}", self.0)
    }
}
