use super::*;
use crate::testutil::MockTransport;
use crate::transport::{ArrayDim, RawTypeDescriptor, WireKind};

fn raw(name: &str, kind: WireKind, byte_size: u32) -> RawTypeDescriptor {
    RawTypeDescriptor {
        name: name.to_string(),
        parent_name: String::new(),
        kind,
        byte_size,
        offset: 0,
        attributes: vec![],
        children: vec![],
        array_dimensions: vec![],
        enum_fields: None,
        rpc_method_names: vec![],
    }
}

fn transport_for(r: &RawTypeDescriptor) -> MockTransport {
    let mut t = MockTransport::new();
    t.add_type(r.clone());
    t
}

#[test]
fn constructs_numeric_leaf_with_natural_bounds() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let node = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    match node {
        TypeNode::Numeric(n) => {
            assert_eq!(n.lower, NumBound::Int(i16::MIN as i128));
            assert_eq!(n.upper, NumBound::Int(i16::MAX as i128));
        }
        other => panic!("expected Numeric, got {other:?}"),
    }
}

#[test]
fn constructs_string_leaf_with_maxlen_one_less_than_bytesize() {
    let r = raw("STRING(80)", WireKind::StringNarrow, 81);
    let t = transport_for(&r);
    let node = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    match node {
        TypeNode::String(s) => assert_eq!(s.max_len, 80),
        other => panic!("expected String, got {other:?}"),
    }
}

#[test]
fn bit_constructs_boolean_default_false() {
    let r = raw("BOOL", WireKind::Bit, 1);
    let t = transport_for(&r);
    let node = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    match node {
        TypeNode::Boolean(b) => assert_eq!(b.base.default_value, LeafValue::Bool(false)),
        other => panic!("expected Boolean, got {other:?}"),
    }
}

#[test]
fn clone_with_ignored_attribute_drops_node() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("member", WireKind::I16, 2);
    mutator.attributes.push(("Ignored".into(), "".into()));
    let cloned = base.clone_with(&t, Some(&mutator)).unwrap();
    assert!(cloned.is_none());
}

#[test]
fn clone_with_readonly_sets_flag_and_preserves_kind() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("member", WireKind::I16, 2);
    mutator.offset = 4;
    mutator.attributes.push(("ReadOnly".into(), "".into()));
    let cloned = base.clone_with(&t, Some(&mutator)).unwrap().unwrap();
    assert!(cloned.is_read_only());
    assert_eq!(cloned.offset(), 4);
}

#[test]
fn clone_with_default_attribute_narrows_and_reencodes() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("member", WireKind::I16, 2);
    mutator.attributes.push(("default".into(), "5".into()));
    let cloned = base.clone_with(&t, Some(&mutator)).unwrap().unwrap();
    match cloned {
        TypeNode::Numeric(n) => {
            assert_eq!(n.base.default_value, LeafValue::Num(NumBound::Int(5)));
            assert!(n.base.default_raw_bytes.is_some());
        }
        other => panic!("expected Numeric, got {other:?}"),
    }
}

#[test]
fn lowerborder_narrows_and_sets_default_when_unset() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("member", WireKind::I16, 2);
    mutator.attributes.push(("lowerBorder".into(), "10".into()));
    mutator.attributes.push(("upperBorder".into(), "20".into()));
    let cloned = base.clone_with(&t, Some(&mutator)).unwrap().unwrap();
    match cloned {
        TypeNode::Numeric(n) => {
            assert_eq!(n.lower, NumBound::Int(10));
            assert_eq!(n.upper, NumBound::Int(20));
            assert_eq!(n.base.default_value, LeafValue::Num(NumBound::Int(10)));
        }
        other => panic!("expected Numeric, got {other:?}"),
    }
}

#[test]
fn extend_wraps_in_array_when_dimensions_present() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("arr", WireKind::I16, 0);
    mutator.array_dimensions = vec![ArrayDim { start_index: 0, length: 10 }];
    let extended = base.extend(&t, &mutator).unwrap().unwrap();
    match extended {
        TypeNode::Array(a) => {
            assert_eq!(a.dimensions.len(), 1);
            assert_eq!(a.base.byte_size, 20);
            assert!(matches!(*a.element, TypeNode::Numeric(_)));
        }
        other => panic!("expected Array, got {other:?}"),
    }
}

#[test]
fn extend_promotes_numeric_to_enum_when_enum_fields_present() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    let mut mutator = raw("Color", WireKind::I16, 2);
    mutator.enum_fields =
        Some(vec![("Red".into(), Bytes::from_static(&[0, 0])), ("Blue".into(), Bytes::from_static(&[1, 0]))]);
    let extended = base.extend(&t, &mutator).unwrap().unwrap();
    match extended {
        TypeNode::Enum(e) => {
            assert_eq!(e.fields.len(), 2);
            assert_eq!(&*e.fields[0], "Color.Red");
            assert_eq!(e.encoding.get("Color.Blue").unwrap().as_ref(), &[1, 0]);
        }
        other => panic!("expected Enum, got {other:?}"),
    }
}

#[test]
fn to_raw_failure_propagates_as_error() {
    let r = raw("INT", WireKind::I16, 2);
    let t = transport_for(&r);
    let base = TypeNode::construct_leaf(&t, &r).unwrap().unwrap();
    t.set_fail_to_raw(true);
    let mut mutator = raw("member", WireKind::I16, 2);
    mutator.attributes.push(("default".into(), "5".into()));
    let err = base.clone_with(&t, Some(&mutator)).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::ToRawFailed);
}
