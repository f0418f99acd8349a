//! Call-Site Builder Tests

use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::converter::ConverterRegistry;
use crate::ffi::FnInvoker;
use crate::layout::Layout;
use crate::structure::{StructType, StructureEngine, UpdatePolicy};
use crate::types::{Integral, NativeValue, PrimitiveKind, Value};

const FN_ADDR: usize = 0x1000;

type Calls = Arc<Mutex<Vec<CallDescriptor>>>;

fn resolver() -> Arc<LayoutResolver> {
    LayoutResolver::new(
        Arc::new(ConverterRegistry::new()),
        Arc::new(StructureEngine::new()),
    )
}

fn cache_with(invoker: FnInvoker) -> CallSiteCache {
    CallSiteCache::new(resolver(), Arc::new(invoker))
}

/// Invoker that records each descriptor and returns the sum of integer arguments
fn recording() -> (FnInvoker, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let invoker = FnInvoker::new(move |_addr, descriptor, args| {
        seen.lock().push(descriptor.clone());
        let sum: i64 = args.iter().filter_map(NativeValue::as_i64).sum();
        Ok(NativeValue::I64(sum))
    });
    (invoker, calls)
}

fn point() -> StructType {
    StructType::builder("Point")
        .ordered_field("x", LogicalType::I32, 0)
        .ordered_field("y", LogicalType::I32, 1)
        .build()
}

#[test]
fn test_call_site_reuse() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![LogicalType::I32, LogicalType::I32], Some(LogicalType::I32));

    let first = cache.get_or_build(FN_ADDR, &sig).unwrap();
    for i in 0..10 {
        let site = cache.get_or_build(FN_ADDR, &sig).unwrap();
        assert!(Arc::ptr_eq(&first, &site));
        let result = site.invoke(&mut [Value::I32(i), Value::I32(1)]).unwrap();
        assert_eq!(result, Some(Value::I32(i + 1)));
    }

    assert_eq!(cache.descriptors_built(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(calls.lock().len(), 10);
}

#[test]
fn test_distinct_shapes_get_distinct_sites() {
    let (invoker, _calls) = recording();
    let cache = cache_with(invoker);
    let a = FunctionSignature::new(vec![LogicalType::I32], Some(LogicalType::I32));
    let b = FunctionSignature::new(vec![LogicalType::I64], Some(LogicalType::I32));

    let site_a = cache.get_or_build(FN_ADDR, &a).unwrap();
    let site_b = cache.get_or_build(FN_ADDR, &b).unwrap();
    let site_c = cache.get_or_build(FN_ADDR + 8, &a).unwrap();
    assert!(!Arc::ptr_eq(&site_a, &site_b));
    assert!(!Arc::ptr_eq(&site_a, &site_c));
    assert_eq!(cache.descriptors_built(), 3);
    assert_eq!(site_b.descriptor().args(), &[Layout::I64]);
}

#[test]
fn test_null_address_rejected() {
    let (invoker, _calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![], None);
    assert!(matches!(
        cache.get_or_build(0, &sig),
        Err(InvokerError::NativeCall(_))
    ));
}

#[test]
fn test_validation_is_eager() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);

    let sig = FunctionSignature::new(
        vec![LogicalType::I32, LogicalType::extension("Unknown")],
        None,
    );
    match cache.get_or_build(FN_ADDR, &sig) {
        Err(InvokerError::UnsupportedType { position, .. }) => {
            assert!(position.starts_with("parameter 1"), "{}", position)
        }
        other => panic!("Expected UnsupportedType, got {:?}", other),
    }

    let sig = FunctionSignature::new(vec![], Some(LogicalType::Any));
    match cache.get_or_build(FN_ADDR, &sig) {
        Err(InvokerError::UnsupportedType { position, .. }) => {
            assert!(position.starts_with("return"), "{}", position)
        }
        other => panic!("Expected UnsupportedType, got {:?}", other),
    }

    let sig = FunctionSignature::variadic(vec![], LogicalType::extension("Unknown"), None);
    match cache.get_or_build(FN_ADDR, &sig) {
        Err(InvokerError::UnsupportedType { position, .. }) => {
            assert!(position.starts_with("variadic element"), "{}", position)
        }
        other => panic!("Expected UnsupportedType, got {:?}", other),
    }

    assert!(cache.is_empty());
    assert_eq!(cache.descriptors_built(), 0);
    assert!(calls.lock().is_empty());
}

#[test]
fn test_argument_checks() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![LogicalType::I32], Some(LogicalType::I32));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    assert!(matches!(
        site.invoke(&mut []),
        Err(InvokerError::ArgumentCount {
            expected: 1,
            got: 0
        })
    ));
    assert!(matches!(
        site.invoke(&mut [Value::from("x")]),
        Err(InvokerError::Conversion(_))
    ));
    assert!(matches!(
        site.invoke(&mut [Value::Null]),
        Err(InvokerError::Conversion(_))
    ));
    assert!(calls.lock().is_empty());
}

#[test]
fn test_void_and_boxed_returns() {
    let invoker = FnInvoker::new(|_, descriptor, _| {
        Ok(match descriptor.ret() {
            None => NativeValue::Void,
            Some(_) => NativeValue::Null,
        })
    });
    let cache = cache_with(invoker);

    let void = FunctionSignature::new(vec![], None);
    let site = cache.get_or_build(FN_ADDR, &void).unwrap();
    assert_eq!(site.invoke(&mut []).unwrap(), None);

    let boxed = FunctionSignature::new(vec![], Some(LogicalType::boxed(PrimitiveKind::I64)));
    let site = cache.get_or_build(FN_ADDR, &boxed).unwrap();
    assert_eq!(site.invoke(&mut []).unwrap(), Some(Value::Null));
}

#[test]
fn test_arguments_are_coerced_to_declared_layouts() {
    let invoker = FnInvoker::new(|_, descriptor, args| {
        assert_eq!(descriptor.args(), &[Layout::I16, Layout::F32, Layout::Address]);
        assert!(matches!(args[0], NativeValue::I16(7)));
        assert!(matches!(args[1], NativeValue::F32(v) if v == 0.5));
        assert!(matches!(args[2], NativeValue::Null));
        Ok(NativeValue::F64(1.25))
    });
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(
        vec![LogicalType::I16, LogicalType::F32, LogicalType::STRING],
        Some(LogicalType::F64),
    );
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    let result = site
        .invoke(&mut [Value::I64(7), Value::F64(0.5), Value::Null])
        .unwrap();
    assert_eq!(result, Some(Value::F64(1.25)));
}

#[test]
fn test_out_of_range_argument_is_not_truncated() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![LogicalType::I8], Some(LogicalType::I64));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    assert!(matches!(
        site.invoke(&mut [Value::I64(300)]),
        Err(InvokerError::Conversion(_))
    ));
    assert!(calls.lock().is_empty());
    assert_eq!(site.invoke(&mut [Value::I64(-5)]).unwrap(), Some(Value::I64(-5)));
}

#[test]
fn test_variadic_calls_are_not_cached() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::variadic(vec![LogicalType::STRING], LogicalType::Any, Some(LogicalType::I32));

    let first = cache.get_or_build(FN_ADDR, &sig).unwrap();
    first
        .invoke(&mut [Value::from("%d %f"), Value::I8(1), Value::F32(2.0)])
        .unwrap();

    let second = cache.get_or_build(FN_ADDR, &sig).unwrap();
    second
        .invoke(&mut [
            Value::from("%d %d %p"),
            Value::Bool(true),
            Value::I64(3),
            Value::Null,
        ])
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(cache.is_empty());
    assert_eq!(cache.descriptors_built(), 2);

    let calls = calls.lock();
    assert_eq!(calls[0].args(), &[Layout::Address, Layout::I64, Layout::F64]);
    assert_eq!(
        calls[1].args(),
        &[Layout::Address, Layout::I64, Layout::I64, Layout::Address]
    );
    assert!(calls.iter().all(|d| d.is_variadic() && d.fixed_count() == 1));
    assert_ne!(calls[0], calls[1]);
}

#[test]
fn test_variadic_site_varies_per_call() {
    let (invoker, calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::variadic(vec![], LogicalType::Any, Some(LogicalType::I64));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    assert_eq!(site.invoke(&mut []).unwrap(), Some(Value::I64(0)));
    assert_eq!(
        site.invoke(&mut [Value::Char(2), Value::I16(3)]).unwrap(),
        Some(Value::I64(5))
    );
    assert_eq!(
        site.invoke(&mut [Value::from(Integral(4))]).unwrap(),
        Some(Value::I64(4))
    );

    let calls = calls.lock();
    assert!(calls[0].args().is_empty());
    assert_eq!(calls[1].args(), &[Layout::I64, Layout::I64]);
    // Native-type arguments use their own layout, promoted
    assert_eq!(calls[2].args(), &[Layout::I64]);
    assert_eq!(calls[1].to_string(), "(...i64, i64) -> i64");
}

#[test]
fn test_variadic_element_constraint() {
    let (invoker, _calls) = recording();
    let cache = cache_with(invoker);
    let sig = FunctionSignature::variadic(vec![], LogicalType::I32, Some(LogicalType::I64));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    assert_eq!(
        site.invoke(&mut [Value::I32(1), Value::I32(2)]).unwrap(),
        Some(Value::I64(3))
    );
    assert!(matches!(
        site.invoke(&mut [Value::I32(1), Value::from("two")]),
        Err(InvokerError::Conversion(_))
    ));
}

#[test]
fn test_array_read_back() {
    // memcpy(dest, src, n)
    let invoker = FnInvoker::new(|_, _, args| {
        let dest = args[0].address().unwrap_or(0);
        let src = args[1].address().unwrap_or(0);
        let n = args[2].as_i64().unwrap_or(0) as usize;
        unsafe { std::ptr::copy_nonoverlapping(src as *const u8, dest as *mut u8, n) };
        Ok(NativeValue::Address(dest))
    });
    let cache = cache_with(invoker);
    let ints = LogicalType::array_of(LogicalType::I32);
    let sig = FunctionSignature::new(
        vec![ints.clone(), ints, LogicalType::I64],
        Some(LogicalType::Pointer),
    );
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    let mut args = [
        Value::from(vec![0i32; 3]),
        Value::from(vec![1i32, 2, 3]),
        Value::I64(12),
    ];
    let result = site.invoke(&mut args).unwrap();
    assert!(matches!(result, Some(Value::Pointer(p)) if !p.is_null()));
    assert_eq!(args[0], Value::from(vec![1i32, 2, 3]));
    assert_eq!(args[1], Value::from(vec![1i32, 2, 3]));
}

#[test]
fn test_structure_write_and_read_around_call() {
    // Doubles x in place
    let invoker = FnInvoker::new(|_, _, args| {
        let ptr = args[0].address().unwrap_or(0) as *mut i32;
        unsafe { ptr.write(ptr.read() * 2) };
        Ok(NativeValue::Void)
    });
    let cache = cache_with(invoker);
    let resolver = Arc::clone(cache.resolver());
    let ty = point();
    let sig = FunctionSignature::new(vec![ty.logical()], None);
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    let mut instance = resolver.structures().instantiate(&ty, &resolver).unwrap();
    instance.set("x", 21).unwrap();
    let mut args = [Value::Struct(instance)];
    site.invoke(&mut args).unwrap();
    assert_eq!(args[0].as_struct().unwrap().get_i32("x").unwrap(), 42);

    // Without write-back the native side sees zeroed memory
    let mut instance = resolver.structures().instantiate(&ty, &resolver).unwrap();
    instance.set("x", 21).unwrap();
    instance.set_write_policy(UpdatePolicy::Never);
    let mut args = [Value::Struct(instance)];
    site.invoke(&mut args).unwrap();
    assert_eq!(args[0].as_struct().unwrap().get_i32("x").unwrap(), 0);
}

#[test]
fn test_string_return() {
    static GREETING: &[u8] = b"hello\0";
    let invoker = FnInvoker::new(|_, _, _| Ok(NativeValue::Address(GREETING.as_ptr() as usize)));
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![], Some(LogicalType::STRING));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();
    assert_eq!(site.invoke(&mut []).unwrap(), Some(Value::from("hello")));
}

#[test]
fn test_string_return_into_argument_buffer() {
    // Returns its first argument, like strchr on a leading match
    let invoker = FnInvoker::new(|_, _, args| Ok(NativeValue::Address(args[0].address().unwrap_or(0))));
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![LogicalType::STRING], Some(LogicalType::STRING));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();

    let text = "a string long enough to need its own heap allocation for the call";
    let result = site.invoke(&mut [Value::from(text)]).unwrap();
    assert_eq!(result, Some(Value::from(text)));
}

#[test]
fn test_invoker_errors_propagate() {
    let invoker = FnInvoker::new(|_, _, _| Err(InvokerError::NativeCall("trap".to_string())));
    let cache = cache_with(invoker);
    let sig = FunctionSignature::new(vec![], Some(LogicalType::I32));
    let site = cache.get_or_build(FN_ADDR, &sig).unwrap();
    assert!(matches!(
        site.invoke(&mut []),
        Err(InvokerError::NativeCall(msg)) if msg == "trap"
    ));
}

#[test]
fn test_signature_shape() {
    let sig = FunctionSignature::variadic(vec![LogicalType::STRING], LogicalType::Any, Some(LogicalType::I32));
    assert!(sig.is_variadic());
    assert_eq!(sig.fixed_params(), &[LogicalType::STRING]);
    assert_eq!(sig.params().len(), 2);
    assert_eq!(sig.variadic_element(), Some(&LogicalType::Any));
    assert!(sig.validate_args(1));
    assert!(sig.validate_args(4));
    assert!(!sig.validate_args(0));
    assert_eq!(sig.to_string(), "i32 (string, any...)");

    let fixed = FunctionSignature::new(vec![LogicalType::I32, LogicalType::Pointer], None);
    assert!(!fixed.validate_args(1));
    assert!(fixed.accepts(&[Value::I32(1), Value::Null]));
    assert!(!fixed.accepts(&[Value::F64(1.0), Value::Null]));
    assert_eq!(fixed.to_string(), "void (i32, pointer)");
}

#[test]
fn test_descriptor_display() {
    let descriptor = CallDescriptor::new(vec![Layout::Address], Some(Layout::I32));
    assert!(!descriptor.is_variadic());
    assert_eq!(descriptor.to_string(), "(ptr) -> i32");

    let extended = descriptor.with_variadic(vec![Layout::I64, Layout::F64]);
    assert_eq!(extended.fixed_count(), 1);
    assert_eq!(extended.to_string(), "(ptr, ...i64, f64) -> i32");
}
