use super::*;
use crate::testutil::MockTransport;
use crate::transport::{RawChild, RawTypeDescriptor, WireKind};

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

#[tokio::test]
async fn resolves_simple_struct_with_two_members() {
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    t.add_type(leaf("REAL", WireKind::F32, 4));
    t.add_type(RawTypeDescriptor {
        children: vec![
            RawChild { member_name: "a".into(), type_name: "INT".into(), offset: 0, attributes: vec![] },
            RawChild { member_name: "b".into(), type_name: "REAL".into(), offset: 2, attributes: vec![] },
        ],
        byte_size: 6,
        ..leaf("ST_Point", WireKind::Composite, 0)
    });
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    let node = registry.get("ST_Point").unwrap();
    match &*node {
        TypeNode::Struct(s) => {
            assert_eq!(s.members.len(), 2);
            assert_eq!(&*s.members[0].0, "a");
            assert_eq!(s.members[1].1.offset(), 2);
        }
        other => panic!("expected Struct, got {other:?}"),
    }
}

#[tokio::test]
async fn struct_with_only_pointer_members_disappears_but_siblings_remain() {
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    t.add_type(RawTypeDescriptor {
        name: "POINTER TO INT".into(),
        kind: WireKind::Pointer,
        ..leaf("POINTER TO INT", WireKind::Pointer, 4)
    });
    t.add_type(RawTypeDescriptor {
        children: vec![RawChild {
            member_name: "p".into(),
            type_name: "POINTER TO INT".into(),
            offset: 0,
            attributes: vec![],
        }],
        byte_size: 4,
        ..leaf("ST_OnlyPointer", WireKind::Composite, 0)
    });
    t.add_type(RawTypeDescriptor {
        children: vec![RawChild {
            member_name: "x".into(),
            type_name: "INT".into(),
            offset: 0,
            attributes: vec![],
        }],
        byte_size: 2,
        ..leaf("ST_Sibling", WireKind::Composite, 0)
    });
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    assert!(registry.get("ST_OnlyPointer").is_none());
    assert!(registry.get("ST_Sibling").is_some());
}

#[tokio::test]
async fn parent_extension_inherits_and_overrides() {
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    let mut child = leaf("TON_TIME", WireKind::I16, 2);
    child.parent_name = "INT".into();
    child.attributes.push(("readonly".into(), "".into()));
    t.add_type(child);
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    let node = registry.get("TON_TIME").unwrap();
    assert!(node.is_read_only());
    match &*node {
        TypeNode::Numeric(_) => {}
        other => panic!("expected Numeric, got {other:?}"),
    }
}

#[tokio::test]
async fn self_referential_type_does_not_recurse_forever() {
    let mut t = MockTransport::new();
    t.add_type(RawTypeDescriptor {
        children: vec![RawChild {
            member_name: "next".into(),
            type_name: "ST_Node".into(),
            offset: 0,
            attributes: vec![],
        }],
        byte_size: 8,
        ..leaf("ST_Node", WireKind::Composite, 0)
    });
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    assert!(registry.get("ST_Node").is_none());
}

#[tokio::test]
async fn ignored_type_is_dropped_from_registry() {
    let mut t = MockTransport::new();
    let mut ty = leaf("INT", WireKind::I16, 2);
    ty.attributes.push(("ignored".into(), "".into()));
    t.add_type(ty);
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    assert!(registry.get("INT").is_none());
}

#[tokio::test]
async fn name_collision_first_registration_wins() {
    // Two independent top-level entries sharing a name is not representable
    // in a `HashMap`-backed catalogue; instead we exercise the memoization
    // path directly: resolving the same name twice returns the same `Arc`.
    let mut t = MockTransport::new();
    t.add_type(leaf("INT", WireKind::I16, 2));
    let registry = TypeRegistry::build(&t, 1).await.unwrap();
    let a = registry.get("INT").unwrap();
    let b = registry.get("int").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
