//! libffi-backed raw invoker
//!
//! Supports every layout: floating point scalars, by-value aggregates in
//! both directions, and variadic calls prepared with `ffi_prep_cif_var`.

use libffi::middle::{Cif, CodePtr, Type};
use libffi::raw;

use crate::callsite::CallDescriptor;
use crate::error::{InvokerError, Result};
use crate::layout::{Layout, ScalarKind};
use crate::types::{Memory, NativeValue};

use super::RawInvoker;

/// Calls through a libffi call interface built from the descriptor
#[derive(Debug, Default, Clone, Copy)]
pub struct LibffiInvoker;

impl LibffiInvoker {
    pub fn new() -> Self {
        LibffiInvoker
    }
}

fn ffi_type(layout: &Layout) -> Type {
    match layout {
        Layout::Scalar(ScalarKind::Bool) => Type::u8(),
        Layout::Scalar(ScalarKind::I8) => Type::i8(),
        Layout::Scalar(ScalarKind::U16) => Type::u16(),
        Layout::Scalar(ScalarKind::I16) => Type::i16(),
        Layout::Scalar(ScalarKind::I32) => Type::i32(),
        Layout::Scalar(ScalarKind::I64) => Type::i64(),
        Layout::Scalar(ScalarKind::F32) => Type::f32(),
        Layout::Scalar(ScalarKind::F64) => Type::f64(),
        Layout::Address => Type::pointer(),
        Layout::Group(group) => {
            Type::structure(group.members().iter().map(|member| ffi_type(&member.layout)))
        }
    }
}

/// Width of libffi's widened integral return slot
const FFI_ARG_SIZE: usize = std::mem::size_of::<u64>();

impl RawInvoker for LibffiInvoker {
    fn invoke(
        &self,
        address: usize,
        descriptor: &CallDescriptor,
        args: &[NativeValue],
    ) -> Result<NativeValue> {
        if address == 0 {
            return Err(InvokerError::NativeCall("null function address".to_string()));
        }
        if args.len() != descriptor.args().len() {
            return Err(InvokerError::ArgumentCount {
                expected: descriptor.args().len(),
                got: args.len(),
            });
        }

        let cif = Cif::new(
            descriptor.args().iter().map(ffi_type),
            descriptor.ret().map(ffi_type).unwrap_or_else(Type::void),
        );

        if descriptor.is_variadic() {
            let raw_cif = cif.as_raw_ptr();
            // Safety: raw_cif was prepared by Cif::new with these same types
            let status = unsafe {
                raw::ffi_prep_cif_var(
                    raw_cif,
                    raw::ffi_abi_FFI_DEFAULT_ABI,
                    descriptor.fixed_count() as u32,
                    descriptor.args().len() as u32,
                    (*raw_cif).rtype,
                    (*raw_cif).arg_types,
                )
            };
            if status != raw::ffi_status_FFI_OK {
                return Err(InvokerError::NativeCall(format!(
                    "ffi_prep_cif_var failed for {}",
                    descriptor
                )));
            }
        }

        // One aligned slot per argument holding its native bytes
        let mut slots = Vec::with_capacity(args.len());
        for (value, layout) in args.iter().zip(descriptor.args()) {
            let mut slot = Memory::allocate(layout.size().max(FFI_ARG_SIZE), layout.align().max(8))?;
            // Safety: the slot is at least layout.size() bytes
            unsafe { value.write_to(slot.as_mut_ptr(), layout)? };
            slots.push(slot);
        }
        let mut arg_ptrs: Vec<*mut libc::c_void> = slots
            .iter_mut()
            .map(|slot| slot.as_mut_ptr() as *mut libc::c_void)
            .collect();

        let ret_layout = descriptor.ret();
        let (ret_size, ret_align) = ret_layout
            .map(|l| (l.size().max(FFI_ARG_SIZE), l.align().max(8)))
            .unwrap_or((FFI_ARG_SIZE, 8));
        let mut ret = Memory::allocate(ret_size, ret_align)?;

        let code = CodePtr(address as *mut libc::c_void);
        // Safety: the cif describes the declared C signature of `address`, every
        // argument slot matches its ffi type, and the return buffer is large enough.
        unsafe {
            raw::ffi_call(
                cif.as_raw_ptr(),
                Some(*code.as_safe_fun()),
                ret.as_mut_ptr() as *mut libc::c_void,
                arg_ptrs.as_mut_ptr(),
            );
        }

        let value = match ret_layout {
            None => NativeValue::Void,
            // Integral returns narrower than a register come back widened
            Some(layout) if layout.is_integer_class() && layout.size() < FFI_ARG_SIZE => {
                // Safety: the return buffer holds at least FFI_ARG_SIZE bytes
                let word = unsafe { (ret.as_ptr() as *const u64).read_unaligned() };
                NativeValue::from_register(word, layout).unwrap_or(NativeValue::Void)
            }
            // Safety: the return buffer holds at least layout.size() bytes
            Some(layout) => unsafe { NativeValue::read_from(ret.as_ptr(), layout) },
        };
        Ok(value)
    }
}
