//! Layout Module Tests

use std::sync::Arc;

use super::*;
use crate::converter::{ConversionContext, ConverterRegistry, TypeConverter};
use crate::error::{InvokerError, Result};
use crate::structure::{StructType, StructureEngine};
use crate::types::{LogicalType, NativeValue, PrimitiveKind, Value};

fn resolver() -> Arc<LayoutResolver> {
    LayoutResolver::new(
        Arc::new(ConverterRegistry::new()),
        Arc::new(StructureEngine::new()),
    )
}

#[derive(Debug)]
struct HandleConverter;

impl TypeConverter for HandleConverter {
    fn supported_types(&self) -> Vec<LogicalType> {
        vec![LogicalType::extension("Handle")]
    }

    fn layout(&self, _cx: &ConversionContext<'_>) -> Result<Layout> {
        Ok(Layout::I64)
    }

    fn to_native(&self, _value: &Value, _cx: &ConversionContext<'_>) -> Result<NativeValue> {
        Ok(NativeValue::I64(0))
    }

    fn to_logical(&self, _native: &NativeValue, _cx: &ConversionContext<'_>) -> Result<Value> {
        Ok(Value::Null)
    }
}

#[test]
fn test_boxed_primitives_share_layout() {
    let resolver = resolver();
    for kind in PrimitiveKind::ALL {
        let plain = resolver.layout_of(&LogicalType::Primitive(kind)).unwrap();
        let boxed = resolver.layout_of(&LogicalType::boxed(kind)).unwrap();
        assert_eq!(plain, boxed, "layouts differ for {}", kind);
        assert_eq!(plain.size(), kind.size());
    }
}

#[test]
fn test_reference_layouts() {
    let resolver = resolver();
    assert_eq!(resolver.layout_of(&LogicalType::STRING).unwrap(), Layout::Address);
    assert_eq!(resolver.layout_of(&LogicalType::WSTRING).unwrap(), Layout::Address);
    assert_eq!(resolver.layout_of(&LogicalType::Pointer).unwrap(), Layout::Address);
    assert_eq!(
        resolver
            .layout_of(&LogicalType::array_of(LogicalType::F64))
            .unwrap(),
        Layout::Address
    );
    assert_eq!(
        resolver
            .layout_of(&LogicalType::native::<crate::types::Integral>())
            .unwrap(),
        Layout::I32
    );
}

#[test]
fn test_unsupported_layouts() {
    let resolver = resolver();

    let err = resolver
        .layout_of(&LogicalType::extension("Unregistered"))
        .unwrap_err();
    assert!(matches!(err, InvokerError::UnsupportedType { .. }));

    let err = resolver
        .layout_of(&LogicalType::array_of(LogicalType::STRING))
        .unwrap_err();
    assert!(matches!(err, InvokerError::UnsupportedType { .. }));

    assert!(!resolver.is_supported(&LogicalType::Any));
}

#[test]
fn test_registered_extension_layout() {
    let registry = Arc::new(ConverterRegistry::new());
    registry.register_converter(Arc::new(HandleConverter)).unwrap();
    let resolver = LayoutResolver::new(registry, Arc::new(StructureEngine::new()));

    assert_eq!(
        resolver.layout_of(&LogicalType::extension("Handle")).unwrap(),
        Layout::I64
    );
}

#[test]
fn test_structure_layouts() {
    let resolver = resolver();
    let by_ref = StructType::builder("Span")
        .ordered_field("start", LogicalType::I32, 0)
        .ordered_field("end", LogicalType::I32, 1)
        .build();
    assert_eq!(resolver.layout_of(&by_ref.logical()).unwrap(), Layout::Address);

    let by_value = StructType::builder("Pair")
        .ordered_field("a", LogicalType::I32, 0)
        .ordered_field("b", LogicalType::F64, 1)
        .by_value()
        .build();
    let layout = resolver.layout_of(&by_value.logical()).unwrap();
    let group = layout.as_group().unwrap();
    assert_eq!(group.name(), Some("Pair"));
    assert_eq!(group.size(), 16);
    assert_eq!(group.member("b").map(|m| m.offset), Some(8));
}

#[test]
fn test_layout_cache() {
    let resolver = resolver();
    assert_eq!(resolver.cached(), 0);
    resolver.layout_of(&LogicalType::I32).unwrap();
    resolver.layout_of(&LogicalType::I32).unwrap();
    resolver.layout_of(&LogicalType::STRING).unwrap();
    assert_eq!(resolver.cached(), 2);

    // Failures are not cached
    let _ = resolver.layout_of(&LogicalType::Any);
    assert_eq!(resolver.cached(), 2);
}

#[test]
fn test_group_padding() {
    let group = GroupLayout::new(
        None,
        vec![
            ("tag".to_string(), Layout::I8),
            ("value".to_string(), Layout::I32),
            ("flags".to_string(), Layout::I16),
        ],
    );
    let offsets: Vec<usize> = group.members().iter().map(|m| m.offset).collect();
    assert_eq!(offsets, vec![0, 4, 8]);
    assert_eq!(group.size(), 12);
    assert_eq!(group.align(), 4);

    // Trailing padding rounds up to the strictest alignment
    let group = GroupLayout::new(
        None,
        vec![("wide".to_string(), Layout::I64), ("narrow".to_string(), Layout::I8)],
    );
    assert_eq!(group.size(), 16);

    let empty = GroupLayout::new(None, Vec::new());
    assert_eq!(empty.size(), 0);
    assert_eq!(empty.align(), 1);
}

#[test]
fn test_layout_promotion() {
    assert_eq!(Layout::BOOL.promoted(), Layout::I64);
    assert_eq!(Layout::U16.promoted(), Layout::I64);
    assert_eq!(Layout::I32.promoted(), Layout::I64);
    assert_eq!(Layout::F32.promoted(), Layout::F64);
    assert_eq!(Layout::Address.promoted(), Layout::Address);
}

#[test]
fn test_layout_classes() {
    assert!(Layout::I16.is_integer_class());
    assert!(Layout::Address.is_integer_class());
    assert!(!Layout::F64.is_integer_class());
    assert!(Layout::F32.is_float());
    assert_eq!(Layout::Address.size(), std::mem::size_of::<usize>());
    assert_eq!(Layout::from(PrimitiveKind::Char), Layout::U16);
}

#[test]
fn test_layout_display() {
    let group = GroupLayout::new(
        Some("Point".to_string()),
        vec![("x".to_string(), Layout::I32), ("y".to_string(), Layout::I32)],
    );
    assert_eq!(Layout::Group(group).to_string(), "Point{x@0: i32, y@4: i32}");
    assert_eq!(Layout::Address.to_string(), "ptr");
    assert_eq!(Layout::F32.to_string(), "f32");
}
