//! Integration tests for variadic calls
//!
//! Trailing arguments are typed from their runtime values on every call, so
//! each call with a different tail gets its own descriptor.

use std::sync::Arc;

use parking_lot::Mutex;

use ffinvoke::callsite::FunctionSignature;
use ffinvoke::ffi::{FnInvoker, SymbolTable};
use ffinvoke::{
    CallDescriptor, InvokerError, Layout, LogicalType, NativeContext, NativeValue, Value,
};

fn printf_signature() -> FunctionSignature {
    FunctionSignature::variadic(
        vec![LogicalType::STRING],
        LogicalType::Any,
        Some(LogicalType::I32),
    )
}

/// Context whose only symbol is `printf`, with every descriptor recorded
fn recording_context() -> (NativeContext, Arc<Mutex<Vec<CallDescriptor>>>) {
    let descriptors = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&descriptors);
    let invoker = FnInvoker::new(move |_, descriptor, args| {
        log.lock().push(descriptor.clone());
        Ok(NativeValue::I32(args.len() as i32))
    });
    let context = NativeContext::builder()
        .invoker(Arc::new(invoker))
        .symbols(Arc::new(SymbolTable::new().with("c", "printf", 0x4000)))
        .build()
        .unwrap();
    (context, descriptors)
}

#[test]
fn test_descriptor_follows_trailing_arguments() {
    let (context, descriptors) = recording_context();
    let sig = printf_signature();

    let result = context
        .call("c", "printf", &sig, &mut [Value::from("%d\n"), Value::I32(7)])
        .unwrap();
    assert_eq!(result, Some(Value::I32(2)));

    context
        .call(
            "c",
            "printf",
            &sig,
            &mut [Value::from("%s %f\n"), Value::from("x"), Value::F32(0.5)],
        )
        .unwrap();

    context
        .call("c", "printf", &sig, &mut [Value::from("plain\n")])
        .unwrap();

    let descriptors = descriptors.lock();
    assert_eq!(descriptors.len(), 3);
    assert_eq!(descriptors[0].args(), &[Layout::Address, Layout::I64]);
    assert_eq!(
        descriptors[1].args(),
        &[Layout::Address, Layout::Address, Layout::F64]
    );
    assert_eq!(descriptors[2].args(), &[Layout::Address]);
    assert!(descriptors.iter().all(|d| d.fixed_count() == 1));

    // Nothing variadic is cached
    assert!(context.call_sites().is_empty());
    assert_eq!(context.call_sites().descriptors_built(), 3);
}

#[test]
fn test_null_trailing_argument_is_a_pointer() {
    let (context, descriptors) = recording_context();

    context
        .call(
            "c",
            "printf",
            &printf_signature(),
            &mut [Value::from("%p\n"), Value::Null],
        )
        .unwrap();
    assert_eq!(
        descriptors.lock()[0].args(),
        &[Layout::Address, Layout::Address]
    );
}

#[test]
fn test_fixed_arguments_still_checked() {
    let (context, descriptors) = recording_context();

    assert!(matches!(
        context.call("c", "printf", &printf_signature(), &mut []),
        Err(InvokerError::ArgumentCount { .. })
    ));
    assert!(matches!(
        context.call("c", "printf", &printf_signature(), &mut [Value::I32(1)]),
        Err(InvokerError::Conversion(_))
    ));
    assert!(descriptors.lock().is_empty());
}

#[test]
fn test_typed_variadic_element() {
    let (context, _) = recording_context();
    let sig = FunctionSignature::variadic(
        vec![LogicalType::STRING],
        LogicalType::I64,
        Some(LogicalType::I32),
    );

    assert!(context
        .call("c", "printf", &sig, &mut [Value::from("%ld"), Value::I64(1)])
        .is_ok());
    assert!(matches!(
        context.call("c", "printf", &sig, &mut [Value::from("%ld"), Value::from("no")]),
        Err(InvokerError::Conversion(_))
    ));
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[test]
fn test_snprintf_through_libc() {
    let context = NativeContext::new().unwrap();
    let sig = FunctionSignature::variadic(
        vec![
            LogicalType::array_of(LogicalType::I8),
            LogicalType::I64,
            LogicalType::STRING,
        ],
        LogicalType::Any,
        Some(LogicalType::I32),
    );

    let mut args = [
        Value::from(vec![0i8; 32]),
        Value::I64(32),
        Value::from("%d-%s-%c"),
        Value::I32(42),
        Value::from("ok"),
        Value::I8(b'z' as i8),
    ];
    let written = context.call("c", "snprintf", &sig, &mut args).unwrap();
    assert_eq!(written, Some(Value::I32(7)));

    let text: Vec<u8> = match &args[0] {
        Value::Array(ffinvoke::PrimitiveArray::I8(bytes)) => bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as u8)
            .collect(),
        other => panic!("Expected byte array, got {:?}", other),
    };
    assert_eq!(String::from_utf8(text).unwrap(), "42-ok-z");
}

#[cfg(all(target_os = "linux", feature = "libffi"))]
#[test]
fn test_snprintf_floats_through_libffi() {
    let config = ffinvoke::InvokerConfig::from_toml("[invoker]\nbackend = \"libffi\"\n").unwrap();
    let context = NativeContext::from_config(config).unwrap();
    let sig = FunctionSignature::variadic(
        vec![
            LogicalType::array_of(LogicalType::I8),
            LogicalType::I64,
            LogicalType::STRING,
        ],
        LogicalType::Any,
        Some(LogicalType::I32),
    );

    let mut args = [
        Value::from(vec![0i8; 32]),
        Value::I64(32),
        Value::from("%.2f/%.1f"),
        Value::F32(1.5),
        Value::F64(2.3),
    ];
    let written = context.call("c", "snprintf", &sig, &mut args).unwrap();
    assert_eq!(written, Some(Value::I32(8)));

    if let Value::Array(ffinvoke::PrimitiveArray::I8(bytes)) = &args[0] {
        let text: String = bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as u8 as char)
            .collect();
        assert_eq!(text, "1.50/2.3");
    } else {
        panic!("Expected byte array");
    }
}
