//! Raw call mechanisms
//!
//! A [`RawInvoker`] performs the actual transfer of control to a native
//! function once every argument is in native form.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::callsite::CallDescriptor;
use crate::error::{InvokerError, Result};
use crate::layout::Layout;
use crate::types::NativeValue;

/// Performs a native call described by a [`CallDescriptor`]
pub trait RawInvoker: Send + Sync {
    /// Call the function at `address`. `args` match `descriptor.args()` one to one.
    fn invoke(
        &self,
        address: usize,
        descriptor: &CallDescriptor,
        args: &[NativeValue],
    ) -> Result<NativeValue>;
}

/// Maps a library and symbol name to a function address
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, library: &str, name: &str) -> Result<usize>;
}

/// Maximum number of arguments the register backend supports
pub const MAX_REGISTER_ARGS: usize = 8;

/// Calls through `extern "C" fn(u64, ..) -> u64` pointers of matching arity.
///
/// Every argument travels as one integer register word, so only
/// integer-class layouts (integers, booleans, addresses) are supported;
/// floating point and aggregate layouts need the libffi backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterInvoker;

impl RegisterInvoker {
    pub fn new() -> Self {
        RegisterInvoker
    }

    fn check(descriptor: &CallDescriptor) -> Result<()> {
        let unsupported = |layout: &Layout, what: &str| {
            InvokerError::NativeCall(format!(
                "{} layout {} requires the libffi backend",
                what, layout
            ))
        };
        for layout in descriptor.args() {
            if !layout.is_integer_class() {
                return Err(unsupported(layout, "argument"));
            }
        }
        if let Some(ret) = descriptor.ret() {
            if !ret.is_integer_class() {
                return Err(unsupported(ret, "return"));
            }
        }
        // Apple arm64 passes variadic arguments on the stack, not in registers
        if descriptor.is_variadic() && cfg!(all(target_arch = "aarch64", target_vendor = "apple")) {
            return Err(InvokerError::NativeCall(
                "variadic calls on this platform require the libffi backend".to_string(),
            ));
        }
        if descriptor.args().len() > MAX_REGISTER_ARGS {
            return Err(InvokerError::NativeCall(format!(
                "too many arguments: {} (max {})",
                descriptor.args().len(),
                MAX_REGISTER_ARGS
            )));
        }
        Ok(())
    }
}

impl RawInvoker for RegisterInvoker {
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
        Self::check(descriptor)?;

        let a: Vec<u64> = args.iter().map(NativeValue::to_register).collect();

        // Safety: the address was resolved for a function whose C signature the
        // caller declared; every argument fits one integer register word.
        let result = unsafe {
            match a.len() {
                0 => call_0(address),
                1 => call_1(address, a[0]),
                2 => call_2(address, a[0], a[1]),
                3 => call_3(address, a[0], a[1], a[2]),
                4 => call_4(address, a[0], a[1], a[2], a[3]),
                5 => call_5(address, a[0], a[1], a[2], a[3], a[4]),
                6 => call_6(address, a[0], a[1], a[2], a[3], a[4], a[5]),
                7 => call_7(address, a[0], a[1], a[2], a[3], a[4], a[5], a[6]),
                _ => call_8(address, a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]),
            }
        };

        match descriptor.ret() {
            None => Ok(NativeValue::Void),
            Some(layout) => NativeValue::from_register(result, layout).ok_or_else(|| {
                InvokerError::NativeCall(format!("cannot decode a {} return", layout))
            }),
        }
    }
}

// Function call implementations for different arities.
// Rust needs the parameter count of a function pointer at compile time.

unsafe fn call_0(addr: usize) -> u64 {
    type Fn0 = extern "C" fn() -> u64;
    let f: Fn0 = std::mem::transmute(addr);
    f()
}

unsafe fn call_1(addr: usize, a0: u64) -> u64 {
    type Fn1 = extern "C" fn(u64) -> u64;
    let f: Fn1 = std::mem::transmute(addr);
    f(a0)
}

unsafe fn call_2(addr: usize, a0: u64, a1: u64) -> u64 {
    type Fn2 = extern "C" fn(u64, u64) -> u64;
    let f: Fn2 = std::mem::transmute(addr);
    f(a0, a1)
}

unsafe fn call_3(addr: usize, a0: u64, a1: u64, a2: u64) -> u64 {
    type Fn3 = extern "C" fn(u64, u64, u64) -> u64;
    let f: Fn3 = std::mem::transmute(addr);
    f(a0, a1, a2)
}

unsafe fn call_4(addr: usize, a0: u64, a1: u64, a2: u64, a3: u64) -> u64 {
    type Fn4 = extern "C" fn(u64, u64, u64, u64) -> u64;
    let f: Fn4 = std::mem::transmute(addr);
    f(a0, a1, a2, a3)
}

unsafe fn call_5(addr: usize, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64) -> u64 {
    type Fn5 = extern "C" fn(u64, u64, u64, u64, u64) -> u64;
    let f: Fn5 = std::mem::transmute(addr);
    f(a0, a1, a2, a3, a4)
}

unsafe fn call_6(addr: usize, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64) -> u64 {
    type Fn6 = extern "C" fn(u64, u64, u64, u64, u64, u64) -> u64;
    let f: Fn6 = std::mem::transmute(addr);
    f(a0, a1, a2, a3, a4, a5)
}

#[allow(clippy::too_many_arguments)]
unsafe fn call_7(
    addr: usize,
    a0: u64,
    a1: u64,
    a2: u64,
    a3: u64,
    a4: u64,
    a5: u64,
    a6: u64,
) -> u64 {
    type Fn7 = extern "C" fn(u64, u64, u64, u64, u64, u64, u64) -> u64;
    let f: Fn7 = std::mem::transmute(addr);
    f(a0, a1, a2, a3, a4, a5, a6)
}

#[allow(clippy::too_many_arguments)]
unsafe fn call_8(
    addr: usize,
    a0: u64,
    a1: u64,
    a2: u64,
    a3: u64,
    a4: u64,
    a5: u64,
    a6: u64,
    a7: u64,
) -> u64 {
    type Fn8 = extern "C" fn(u64, u64, u64, u64, u64, u64, u64, u64) -> u64;
    let f: Fn8 = std::mem::transmute(addr);
    f(a0, a1, a2, a3, a4, a5, a6, a7)
}

type InvokeFn = dyn Fn(usize, &CallDescriptor, &[NativeValue]) -> Result<NativeValue> + Send + Sync;

/// Raw invoker backed by a closure; useful for embedding a custom call
/// mechanism or for observing calls
pub struct FnInvoker {
    f: Box<InvokeFn>,
}

impl FnInvoker {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, &CallDescriptor, &[NativeValue]) -> Result<NativeValue> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl RawInvoker for FnInvoker {
    fn invoke(
        &self,
        address: usize,
        descriptor: &CallDescriptor,
        args: &[NativeValue],
    ) -> Result<NativeValue> {
        (self.f)(address, descriptor, args)
    }
}

impl fmt::Debug for FnInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInvoker").finish_non_exhaustive()
    }
}

/// Fixed table of symbol addresses keyed by library and name
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: RwLock<HashMap<(String, String), usize>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, library: &str, name: &str, address: usize) {
        self.symbols
            .write()
            .insert((library.to_string(), name.to_string()), address);
    }

    pub fn with(self, library: &str, name: &str, address: usize) -> Self {
        self.insert(library, name, address);
        self
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, library: &str, name: &str) -> Result<usize> {
        self.symbols
            .read()
            .get(&(library.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| InvokerError::SymbolNotFound {
                library: library.to_string(),
                name: name.to_string(),
            })
    }
}
