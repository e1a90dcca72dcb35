use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::testutil::MockTransport;
use crate::transport::{ArrayDim, RawTypeDescriptor, WireKind};
use crate::typ::registry::TypeRegistry;

fn leaf(name: &str, kind: WireKind, byte_size: u32) -> RawTypeDescriptor {
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

fn child(member_name: &str, type_name: &str, offset: u32) -> crate::transport::RawChild {
    crate::transport::RawChild {
        member_name: member_name.to_string(),
        type_name: type_name.to_string(),
        offset,
        attributes: vec![],
    }
}

async fn build_mirror(t: &MockTransport) -> (TypeRegistry, IndexMap<ArcStr, Arc<SymbolNode>>) {
    let registry = TypeRegistry::build(t, 1).await.unwrap();
    let graph = build_symbol_graph(t, &registry, 500, 1, Emitter::new()).await.unwrap();
    (registry, graph)
}

#[tokio::test]
async fn top_level_boolean_and_numeric_symbols_resolve_under_their_namespace() {
    let mut t = MockTransport::new();
    t.add_type(leaf("BOOL", WireKind::Bit, 1));
    t.add_type(leaf("INT", WireKind::I16, 2));
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.booleanValue".into(),
        type_name: "BOOL".into(),
        pointer: Pointer::new(1, 0, 1),
    });
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.numericValue".into(),
        type_name: "INT".into(),
        pointer: Pointer::new(1, 2, 2),
    });

    let (_registry, graph) = build_mirror(&t).await;
    let main = graph.get("MAIN").expect("MAIN namespace present");
    let boolean = main.child("booleanValue").expect("booleanValue present");
    let numeric = main.child("numericValue").expect("numericValue present");
    assert!(matches!(*boolean, SymbolNode::Boolean(_)));
    assert!(matches!(*numeric, SymbolNode::Numeric(_)));
}

#[tokio::test]
async fn struct_symbol_exposes_member_children_reachable_via_get() {
    let mut t = MockTransport::new();
    t.add_type(leaf("REAL", WireKind::F32, 4));
    t.add_type(leaf("STRING(10)", WireKind::StringNarrow, 11));
    let mut st = RawTypeDescriptor {
        name: "ST_Point".to_string(),
        parent_name: String::new(),
        kind: WireKind::Composite,
        byte_size: 15,
        offset: 0,
        attributes: vec![],
        children: vec![child("realValue", "REAL", 0), child("stringValue", "STRING(10)", 4)],
        array_dimensions: vec![],
        enum_fields: None,
        rpc_method_names: vec![],
    };
    t.add_type(std::mem::take(&mut st));
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.structuredValue".into(),
        type_name: "ST_Point".into(),
        pointer: Pointer::new(1, 10, 15),
    });
    t.set_memory(Pointer::new(1, 10, 4), 0f32.to_le_bytes().to_vec());
    t.set_memory(Pointer::new(1, 14, 11), b"hello world\0".to_vec());

    let (_registry, graph) = build_mirror(&t).await;
    let main = graph.get("MAIN").unwrap();
    let structured = main.child("structuredValue").unwrap();
    assert!(matches!(*structured, SymbolNode::Struct(_)));
    let value = structured.get(&t, 1).await.unwrap();
    match value {
        Value::Struct(m) => {
            assert_eq!(m.get("realValue"), Some(&Value::Num(crate::typ::NumBound::Float(0.0))));
            assert!(matches!(m.get("stringValue"), Some(Value::Str(s)) if s == "hello world"));
        }
        other => panic!("expected Struct, got {other:?}"),
    }
}

#[tokio::test]
async fn array_symbol_exposes_elements_by_caller_index() {
    let mut t = MockTransport::new();
    t.add_type(leaf("BYTE", WireKind::U8, 1));
    let arr = RawTypeDescriptor {
        name: "arrayValue".to_string(),
        parent_name: "BYTE".to_string(),
        kind: WireKind::U8,
        byte_size: 1,
        offset: 0,
        attributes: vec![],
        children: vec![],
        array_dimensions: vec![ArrayDim { start_index: 0, length: 4 }],
        enum_fields: None,
        rpc_method_names: vec![],
    };
    t.add_type(arr);
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.arrayValue".into(),
        type_name: "arrayValue".into(),
        pointer: Pointer::new(1, 20, 4),
    });
    for i in 0..4u32 {
        t.set_memory(Pointer::new(1, 20 + i, 1), vec![i as u8 + 1]);
    }

    let (_registry, graph) = build_mirror(&t).await;
    let main = graph.get("MAIN").unwrap();
    let array = main.child("arrayValue").unwrap();
    let elem2 = array.index(2).expect("index 2 present");
    let value = elem2.get(&t, 1).await.unwrap();
    assert_eq!(value, Value::Num(crate::typ::NumBound::UInt(3)));
}

#[tokio::test]
async fn event_bubbles_from_member_up_to_namespace_root() {
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.numericValue".into(),
        type_name: "INT".into(),
        pointer: Pointer::new(1, 0, 2),
    });

    let (_registry, graph) = build_mirror(&t).await;
    let main = graph.get("MAIN").unwrap();
    let numeric = main.child("numericValue").unwrap();

    let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let seen2 = Arc::clone(&seen);
    main.on("set", Box::new(move |_| { seen2.store(true, std::sync::atomic::Ordering::SeqCst); }));

    numeric.set(&t, Value::Num(crate::typ::NumBound::Int(7)), 1).await.unwrap();
    assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn invalidated_namespace_cascades_to_every_member() {
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    t.add_symbol(RawSymbolDescriptor {
        full_path: "MAIN.numericValue".into(),
        type_name: "INT".into(),
        pointer: Pointer::new(1, 0, 2),
    });

    let (_registry, graph) = build_mirror(&t).await;
    let main = graph.get("MAIN").unwrap();
    let numeric = main.child("numericValue").unwrap();

    main.invalidate();
    assert!(!main.is_valid());
    assert!(!numeric.is_valid());
    let err = numeric.get(&t, 1).await.unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::InvalidBinding);
}
