//! Structure Engine Tests

use std::sync::Arc;

use super::*;
use crate::config::StructureConfig;
use crate::converter::ConverterRegistry;
use crate::error::InvokerError;
use crate::layout::{Layout, LayoutResolver};
use crate::types::{LogicalType, Memory, Pointer, PrimitiveKind, Value};

fn resolver() -> Arc<LayoutResolver> {
    LayoutResolver::new(
        Arc::new(ConverterRegistry::new()),
        Arc::new(StructureEngine::new()),
    )
}

fn point() -> StructType {
    // Declared y first; priorities put x first
    StructType::builder("Point")
        .ordered_field("y", LogicalType::I32, 1)
        .ordered_field("x", LogicalType::I32, 0)
        .build()
}

#[test]
fn test_priority_order() {
    let resolver = resolver();
    let descriptor = resolver.structures().describe(&point(), &resolver).unwrap();

    assert_eq!(descriptor.order_source(), FieldOrderSource::Priority);
    assert_eq!(descriptor.size(), 8);
    let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y"]);
    assert_eq!(descriptor.field("x").map(|f| f.offset), Some(0));
    assert_eq!(descriptor.field("y").map(|f| f.offset), Some(4));
    assert!(descriptor.field("x").unwrap().converter.is_none());
}

#[test]
fn test_partial_priorities_rejected() {
    let resolver = resolver();
    let ty = StructType::builder("Half")
        .ordered_field("a", LogicalType::I32, 0)
        .field("b", LogicalType::I32)
        .build();

    let err = resolver.structures().describe(&ty, &resolver).unwrap_err();
    assert!(matches!(err, InvokerError::StructureDefinition(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_duplicate_priorities_rejected() {
    let resolver = resolver();
    let ty = StructType::builder("Clash")
        .ordered_field("a", LogicalType::I32, 1)
        .ordered_field("b", LogicalType::I32, 1)
        .build();

    assert!(matches!(
        resolver.structures().describe(&ty, &resolver),
        Err(InvokerError::StructureDefinition(_))
    ));
}

#[test]
fn test_name_list_order() {
    let resolver = resolver();
    let ty = StructType::builder("Header")
        .field("length", LogicalType::I16)
        .field("magic", LogicalType::I32)
        .field_order(["magic", "length"])
        .build();

    let descriptor = resolver.structures().describe(&ty, &resolver).unwrap();
    assert_eq!(descriptor.order_source(), FieldOrderSource::NameList);
    assert_eq!(descriptor.index_of("magic"), Some(0));
    assert_eq!(descriptor.field("length").map(|f| f.offset), Some(4));
    assert_eq!(descriptor.size(), 8);
}

#[test]
fn test_name_list_mismatches() {
    let resolver = resolver();
    let engine = resolver.structures();

    let short = StructType::builder("Short")
        .field("a", LogicalType::I32)
        .field("b", LogicalType::I32)
        .field_order(["a"])
        .build();
    assert!(matches!(
        engine.describe(&short, &resolver),
        Err(InvokerError::StructureDefinition(_))
    ));

    let unknown = StructType::builder("Unknown")
        .field("a", LogicalType::I32)
        .field_order(["z"])
        .build();
    assert!(matches!(
        engine.describe(&unknown, &resolver),
        Err(InvokerError::StructureDefinition(_))
    ));

    let twice = StructType::builder("Twice")
        .field("a", LogicalType::I32)
        .field("b", LogicalType::I32)
        .field_order(["a", "a"])
        .build();
    assert!(matches!(
        engine.describe(&twice, &resolver),
        Err(InvokerError::StructureDefinition(_))
    ));
}

#[test]
fn test_declaration_order_fallback() {
    let resolver = resolver();
    let ty = StructType::builder("Loose")
        .field("flag", LogicalType::BOOL)
        .field("count", LogicalType::I64)
        .build();

    let descriptor = resolver.structures().describe(&ty, &resolver).unwrap();
    assert_eq!(descriptor.order_source(), FieldOrderSource::Declaration);
    assert_eq!(descriptor.field("count").map(|f| f.offset), Some(8));
    assert_eq!(descriptor.size(), 16);
    assert_eq!(descriptor.align(), 8);
}

#[test]
fn test_unsupported_field_type() {
    let resolver = resolver();
    let ty = StructType::builder("Bad")
        .field("names", LogicalType::array_of(LogicalType::STRING))
        .build();

    let err = resolver.structures().describe(&ty, &resolver).unwrap_err();
    assert!(matches!(err, InvokerError::StructureDefinition(_)));
}

#[test]
fn test_descriptor_cache() {
    let resolver = resolver();
    let engine = resolver.structures();
    let first = engine.describe(&point(), &resolver).unwrap();
    let second = engine.describe(&point(), &resolver).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cached(), 1);
}

#[test]
fn test_write_then_read() {
    let resolver = resolver();
    let mut instance = resolver
        .structures()
        .instantiate(&point(), &resolver)
        .unwrap();
    assert_eq!(instance.size(), 8);
    assert_eq!(instance.get("x").unwrap(), &Value::I32(0));

    instance.set("x", 10).unwrap();
    instance.set("y", 20i64).unwrap();
    instance.write().unwrap();

    let ptr = instance.pointer();
    unsafe {
        assert_eq!(ptr.read::<i32>(0), 10);
        assert_eq!(ptr.read::<i32>(4), 20);
        ptr.write::<i32>(4, -1);
    }
    instance.read().unwrap();
    assert_eq!(instance.get_i32("y").unwrap(), -1);
    assert_eq!(instance.get("y").unwrap(), &Value::I32(-1));
}

#[test]
fn test_set_validation() {
    let resolver = resolver();
    let mut instance = resolver
        .structures()
        .instantiate(&point(), &resolver)
        .unwrap();

    assert!(matches!(
        instance.set("x", "text"),
        Err(InvokerError::Conversion(_))
    ));
    assert!(instance.set("z", 1).is_err());
    assert!(instance.get("z").is_err());
    assert!(instance.set("x", Value::Null).is_err());
}

#[test]
fn test_reference_fields() {
    let resolver = resolver();
    let ty = StructType::builder("Record")
        .ordered_field("id", LogicalType::I32, 0)
        .ordered_field("label", LogicalType::STRING, 1)
        .ordered_field("next", LogicalType::Pointer, 2)
        .ordered_field("weight", LogicalType::boxed(PrimitiveKind::F64), 3)
        .build();

    let descriptor = resolver.structures().describe(&ty, &resolver).unwrap();
    let word = std::mem::size_of::<usize>();
    assert_eq!(descriptor.field("label").map(|f| f.offset), Some(word));
    assert!(descriptor.field("label").unwrap().converter.is_some());

    let mut instance = resolver.structures().instantiate(&ty, &resolver).unwrap();
    instance.set("id", 1).unwrap();
    instance.set("label", "first").unwrap();
    instance.set("next", Pointer::new(0x1000)).unwrap();
    instance.set("weight", 2.5).unwrap();
    instance.write().unwrap();

    // The string buffer stays alive with the instance
    let label = unsafe { instance.pointer().get_pointer(word) };
    assert!(!label.is_null());
    assert_eq!(unsafe { label.read_c_string() }.unwrap(), "first");

    instance.set("label", Value::Null).unwrap();
    instance.set("weight", Value::Null).unwrap();
    instance.write().unwrap();
    instance.read().unwrap();
    assert_eq!(instance.get("label").unwrap(), &Value::Null);
    assert_eq!(instance.get("weight").unwrap(), &Value::F64(0.0));
    assert_eq!(
        instance.get("next").unwrap(),
        &Value::Pointer(Pointer::new(0x1000))
    );
}

#[test]
fn test_array_field() {
    let resolver = resolver();
    let ty = StructType::builder("Samples")
        .ordered_field("count", LogicalType::I32, 0)
        .ordered_field("data", LogicalType::array_of(LogicalType::I16), 1)
        .build();

    let mut instance = resolver.structures().instantiate(&ty, &resolver).unwrap();
    instance.set("count", 3).unwrap();
    instance.set("data", vec![1i16, 2, 3]).unwrap();
    instance.write().unwrap();

    let offset = instance.descriptor().field("data").unwrap().offset;
    let data = unsafe { instance.pointer().get_pointer(offset) };
    unsafe { data.write::<i16>(2, 42) };

    instance.read().unwrap();
    assert_eq!(instance.get("data").unwrap(), &Value::from(vec![1i16, 42, 3]));
}

#[test]
fn test_nested_by_value() {
    let resolver = resolver();
    let inner = StructType::builder("Inner")
        .ordered_field("a", LogicalType::I8, 0)
        .ordered_field("b", LogicalType::I32, 1)
        .by_value()
        .build();
    let outer = StructType::builder("Outer")
        .ordered_field("tag", LogicalType::I16, 0)
        .ordered_field("inner", inner.logical(), 1)
        .build();

    let descriptor = resolver.structures().describe(&outer, &resolver).unwrap();
    let field = descriptor.field("inner").unwrap();
    assert_eq!(field.offset, 4);
    assert!(matches!(field.layout, Layout::Group(_)));
    assert_eq!(descriptor.size(), 12);

    let mut nested = resolver.structures().instantiate(&inner, &resolver).unwrap();
    nested.set("a", 7i8).unwrap();
    nested.set("b", 99).unwrap();

    let mut instance = resolver.structures().instantiate(&outer, &resolver).unwrap();
    instance.set("tag", 1i16).unwrap();
    instance.set("inner", nested).unwrap();
    instance.write().unwrap();

    // The nested instance was written first, then copied inline
    unsafe {
        assert_eq!(instance.pointer().read::<i8>(4), 7);
        assert_eq!(instance.pointer().read::<i32>(8), 99);
        instance.pointer().write::<i32>(8, 100);
    }
    instance.read().unwrap();
    let inner_value = instance.get("inner").unwrap().as_struct().unwrap();
    assert_eq!(inner_value.get_i32("b").unwrap(), 100);
}

#[test]
fn test_nested_by_value_read_keeps_instance() {
    let resolver = resolver();
    let inner = StructType::builder("Inner")
        .ordered_field("a", LogicalType::I8, 0)
        .ordered_field("b", LogicalType::I32, 1)
        .by_value()
        .build();
    let outer = StructType::builder("Outer")
        .ordered_field("tag", LogicalType::I16, 0)
        .ordered_field("inner", inner.logical(), 1)
        .build();

    let mut nested = resolver.structures().instantiate(&inner, &resolver).unwrap();
    nested.set_read_policy(UpdatePolicy::Never);
    nested.set_write_policy(UpdatePolicy::Always);
    let nested_address = nested.address();

    let mut instance = resolver.structures().instantiate(&outer, &resolver).unwrap();
    instance.set("inner", nested).unwrap();
    instance.write().unwrap();
    unsafe { instance.pointer().write::<i32>(8, -3) };
    instance.read().unwrap();

    let inner_value = instance.get("inner").unwrap().as_struct().unwrap();
    assert_eq!(inner_value.get_i32("b").unwrap(), -3);
    assert_eq!(inner_value.address(), nested_address);
    assert_eq!(inner_value.read_policy(), UpdatePolicy::Never);
    assert_eq!(inner_value.write_policy(), UpdatePolicy::Always);
    assert_eq!(unsafe { inner_value.pointer().read::<i32>(4) }, -3);
}

#[test]
fn test_nested_by_reference() {
    let resolver = resolver();
    let node = point();
    let holder = StructType::builder("Holder")
        .ordered_field("point", node.logical(), 0)
        .build();

    let descriptor = resolver.structures().describe(&holder, &resolver).unwrap();
    assert_eq!(descriptor.field("point").unwrap().layout, Layout::Address);

    let mut target = resolver.structures().instantiate(&node, &resolver).unwrap();
    target.set("x", 5).unwrap();
    let target_address = target.address();

    let mut instance = resolver.structures().instantiate(&holder, &resolver).unwrap();
    instance.set("point", target).unwrap();
    instance.write().unwrap();

    let stored = unsafe { instance.pointer().get_pointer(0) };
    assert_eq!(stored.address(), target_address);
    // Writing the holder wrote the nested structure too
    assert_eq!(unsafe { stored.read::<i32>(0) }, 5);
}

#[test]
fn test_view_existing_memory() {
    let resolver = resolver();
    let memory = Memory::allocate(8, 4).unwrap();
    unsafe {
        memory.pointer().write::<i32>(0, 11);
        memory.pointer().write::<i32>(4, 22);
    }

    let mut view = resolver
        .structures()
        .view(&point(), &resolver, memory.pointer())
        .unwrap();
    assert_eq!(view.address(), memory.address());
    // Nothing is read until asked
    assert_eq!(view.get_i32("x").unwrap(), 0);
    view.read().unwrap();
    assert_eq!(view.get_i32("x").unwrap(), 11);
    assert_eq!(view.get_i32("y").unwrap(), 22);
    assert_eq!(view.bytes(), memory.as_slice().to_vec());
}

#[test]
fn test_null_view() {
    let resolver = resolver();
    let mut view = resolver
        .structures()
        .view(&point(), &resolver, Pointer::NULL)
        .unwrap();
    assert!(view.is_null());
    assert!(view.bytes().is_empty());
    view.set("x", 1).unwrap();
    view.write().unwrap();
    view.read().unwrap();
    assert_eq!(view.get_i32("x").unwrap(), 1);
}

#[test]
fn test_from_bytes_size_check() {
    let resolver = resolver();
    let engine = resolver.structures();
    assert!(engine.from_bytes(&point(), &resolver, &[0; 4]).is_err());

    let mut bytes = 3i32.to_ne_bytes().to_vec();
    bytes.extend_from_slice(&4i32.to_ne_bytes());
    let mut copy = engine.from_bytes(&point(), &resolver, &bytes).unwrap();
    copy.read().unwrap();
    assert_eq!(copy.get_i32("y").unwrap(), 4);
}

#[test]
fn test_update_policies() {
    assert!(!UpdatePolicy::Never.applies(true));
    assert!(UpdatePolicy::Always.applies(false));
    assert!(UpdatePolicy::AfterUsed.applies(true));
    assert!(!UpdatePolicy::AfterUsed.applies(false));

    let resolver = resolver();
    let mut instance = resolver
        .structures()
        .instantiate(&point(), &resolver)
        .unwrap();
    instance.set("x", 8).unwrap();

    instance.set_write_policy(UpdatePolicy::Never);
    instance.auto_write(true).unwrap();
    assert_eq!(unsafe { instance.pointer().read::<i32>(0) }, 0);

    instance.set_write_policy(UpdatePolicy::AfterUsed);
    instance.auto_write(false).unwrap();
    assert_eq!(unsafe { instance.pointer().read::<i32>(0) }, 0);
    instance.auto_write(true).unwrap();
    assert_eq!(unsafe { instance.pointer().read::<i32>(0) }, 8);

    unsafe { instance.pointer().write::<i32>(0, 9) };
    instance.set_read_policy(UpdatePolicy::Never);
    instance.auto_read(true).unwrap();
    assert_eq!(instance.get_i32("x").unwrap(), 8);

    instance.set_read_policy(UpdatePolicy::Always);
    instance.auto_read(false).unwrap();
    assert_eq!(instance.get_i32("x").unwrap(), 9);
}

#[test]
fn test_configured_policies() {
    let config = StructureConfig {
        read_policy: UpdatePolicy::Always,
        write_policy: UpdatePolicy::Never,
        warn_on_declaration_order: false,
    };
    let resolver = LayoutResolver::new(
        Arc::new(ConverterRegistry::new()),
        Arc::new(StructureEngine::from_config(&config)),
    );
    let instance = resolver
        .structures()
        .instantiate(&point(), &resolver)
        .unwrap();
    assert_eq!(instance.read_policy(), UpdatePolicy::Always);
    assert_eq!(instance.write_policy(), UpdatePolicy::Never);
}

#[test]
fn test_struct_type_identity() {
    let a = point();
    let b = point();
    assert_eq!(a, b);
    assert_eq!(a.logical(), b.logical());
    assert_eq!(a.passing(), Passing::ByReference);
    assert_eq!(a.fields().len(), 2);
    assert_ne!(a, StructType::builder("Other").build());
}

#[test]
fn test_same_name_different_shape() {
    let resolver = resolver();
    let narrow = StructType::builder("S")
        .ordered_field("x", LogicalType::I32, 0)
        .by_value()
        .build();
    let wide = StructType::builder("S")
        .ordered_field("x", LogicalType::I64, 0)
        .ordered_field("y", LogicalType::I64, 1)
        .by_value()
        .build();
    assert_ne!(narrow, wide);
    assert_ne!(narrow.logical(), wide.logical());

    assert_eq!(resolver.layout_of(&narrow.logical()).unwrap().size(), 4);
    assert_eq!(resolver.layout_of(&wide.logical()).unwrap().size(), 16);
    assert_eq!(resolver.structures().describe(&wide, &resolver).unwrap().size(), 16);
    assert_eq!(resolver.structures().cached(), 2);

    // Passing mode is part of the declaration too
    let by_reference = StructType::builder("S")
        .ordered_field("x", LogicalType::I32, 0)
        .build();
    assert_ne!(narrow, by_reference);
}

#[test]
fn test_get_i32_rejects_wide_values() {
    let resolver = resolver();
    let stamp = StructType::builder("Stamp")
        .ordered_field("ticks", LogicalType::I64, 0)
        .build();
    let mut instance = resolver.structures().instantiate(&stamp, &resolver).unwrap();

    instance.set("ticks", 1i64 << 40).unwrap();
    assert!(matches!(
        instance.get_i32("ticks"),
        Err(InvokerError::Conversion(_))
    ));
    instance.set("ticks", -7i64).unwrap();
    assert_eq!(instance.get_i32("ticks").unwrap(), -7);
}
