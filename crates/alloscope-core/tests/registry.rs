//! Tests for cross-component canonical type resolution

use alloscope_core::error::AlloscopeError;
use alloscope_core::table::TableBuilder;
use alloscope_core::types::{Address, TypeKind, TypeRef};
use alloscope_core::Alloscope;

/// A component declaring `struct s2 { int x; }`, as each test component
/// would have had it independently emitted at build time.
fn s2_section() -> Vec<u8>
{
    let mut builder = TableBuilder::new();
    let int32 = builder.primitive("int$32", 4);
    builder.strukt("s2", 4, &[(0, "x", int32)]);
    builder.encode()
}

#[test]
fn test_same_type_resolves_to_same_canonical()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    let b = scope.load_component_bytes("lib_b", &s2_section()).unwrap();

    let from_a = scope.resolve_canonical(a, "s2").unwrap();
    let from_b = scope.resolve_canonical(b, "s2").unwrap();
    assert_eq!(from_a, from_b);

    // The contained primitive unifies too.
    assert_eq!(
        scope.resolve_canonical(a, "int$32").unwrap(),
        scope.resolve_canonical(b, "int$32").unwrap()
    );
}

#[test]
fn test_canonical_count_deduplicates()
{
    let scope = Alloscope::new();
    scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    scope.load_component_bytes("lib_b", &s2_section()).unwrap();

    let stats = scope.stats();
    assert_eq!(stats.components, 2);
    // int$32 and s2, once each, despite two declarations of both.
    assert_eq!(stats.canonical_types, 2);
}

#[test]
fn test_different_layouts_stay_distinct()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();

    let mut builder = TableBuilder::new();
    let int64 = builder.primitive("int$64", 8);
    builder.strukt("s2", 8, &[(0, "x", int64)]);
    let b = scope.load_component_bytes("lib_b", &builder.encode()).unwrap();

    // Same name, different layout: each component sees its own canonical.
    assert_ne!(
        scope.resolve_canonical(a, "s2").unwrap(),
        scope.resolve_canonical(b, "s2").unwrap()
    );
}

#[test]
fn test_resolution_falls_through_to_other_components()
{
    let scope = Alloscope::new();
    let provider = scope.load_component_bytes("provider", &s2_section()).unwrap();

    let mut builder = TableBuilder::new();
    builder.primitive("char$8", 1);
    let consumer = scope.load_component_bytes("consumer", &builder.encode()).unwrap();

    // `consumer` never declared s2, but the registry-wide lookup finds the
    // canonical one `provider` donated.
    let via_consumer = scope.resolve_canonical(consumer, "s2").unwrap();
    assert_eq!(via_consumer, scope.resolve_canonical(provider, "s2").unwrap());
}

#[test]
fn test_unresolved_name_is_recoverable()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();

    let err = scope.resolve_canonical(a, "late_type").unwrap_err();
    assert!(matches!(err, AlloscopeError::TypeNotFound(name) if name == "late_type"));

    // A later load providing the type makes the same call succeed.
    let mut builder = TableBuilder::new();
    builder.primitive("late_type", 2);
    scope.load_component_bytes("lib_late", &builder.encode()).unwrap();
    assert!(scope.resolve_canonical(a, "late_type").is_ok());
}

#[test]
fn test_resolve_hook_is_last_resort()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    let s2 = scope.resolve_canonical(a, "s2").unwrap();

    scope.set_resolve_hook(move |_, name| if name == "aliased_s2" { Some(s2) } else { None });

    assert_eq!(scope.resolve_canonical(a, "aliased_s2").unwrap(), s2);
    // The hook is only reached when everything else misses.
    assert!(matches!(
        scope.resolve_canonical(a, "still_missing"),
        Err(AlloscopeError::TypeNotFound(_))
    ));
}

#[test]
fn test_unknown_component_id()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    scope.unload_component(a).unwrap();

    assert!(matches!(
        scope.resolve_canonical(a, "s2"),
        Err(AlloscopeError::ComponentNotFound(_))
    ));
    assert!(matches!(
        scope.unload_component(a),
        Err(AlloscopeError::ComponentNotFound(_))
    ));
}

#[test]
fn test_unload_rehomes_shared_types()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    let b = scope.load_component_bytes("lib_b", &s2_section()).unwrap();
    let s2 = scope.resolve_canonical(a, "s2").unwrap();

    // The donor unloads, but lib_b still provides the type: the canonical
    // survives with its id intact.
    scope.unload_component(a).unwrap();
    assert_eq!(scope.resolve_canonical(b, "s2").unwrap(), s2);
    assert!(scope.type_info(s2).is_some());
}

#[test]
fn test_unload_retires_sole_provider()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();

    let mut builder = TableBuilder::new();
    builder.primitive("char$8", 1);
    let b = scope.load_component_bytes("lib_b", &builder.encode()).unwrap();

    let s2 = scope.resolve_canonical(a, "s2").unwrap();
    scope.unload_component(a).unwrap();

    assert!(scope.type_info(s2).is_none());
    assert!(matches!(
        scope.resolve_canonical(b, "s2"),
        Err(AlloscopeError::TypeNotFound(_))
    ));
}

#[test]
fn test_unload_untypes_orphaned_units()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    let s2 = scope.resolve_canonical(a, "s2").unwrap();

    let base = Address::from(0x1000);
    let unit = scope.notify_alloc(base, 4).unwrap();
    scope.assign_type(unit, Some(s2)).unwrap();

    scope.unload_component(a).unwrap();

    // The memory is still live and still tracked; only the type knowledge
    // died with the component.
    let found = scope.find_unit(base).unwrap();
    assert_eq!(found.ty, None);
    let result = scope.query(base).unwrap();
    assert_eq!(result.ty, None);
}

#[test]
fn test_recursive_type_unifies_across_components()
{
    let node_section = || {
        let mut builder = TableBuilder::new();
        let int32 = builder.primitive("int$32", 4);
        let node_ptr = builder.pointer("node*", TypeRef(2));
        builder.strukt("node", 16, &[(0, "value", int32), (8, "next", node_ptr)]);
        builder.encode()
    };

    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &node_section()).unwrap();
    let b = scope.load_component_bytes("lib_b", &node_section()).unwrap();

    let node_a = scope.resolve_canonical(a, "node").unwrap();
    let node_b = scope.resolve_canonical(b, "node").unwrap();
    assert_eq!(node_a, node_b);

    // The canonical cycle closes on itself: node.next -> node* -> node.
    let node = scope.type_info(node_a).unwrap();
    let next_ptr = scope.type_info(node.members[1].ty).unwrap();
    assert_eq!(next_ptr.kind, TypeKind::Pointer);
    assert_eq!(next_ptr.element, Some(node_a));
}

#[test]
fn test_component_names()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("main_exe", &s2_section()).unwrap();
    assert_eq!(scope.component_name(a).as_deref(), Some("main_exe"));

    scope.unload_component(a).unwrap();
    assert_eq!(scope.component_name(a), None);
}

#[test]
fn test_type_info_snapshot()
{
    let scope = Alloscope::new();
    let a = scope.load_component_bytes("lib_a", &s2_section()).unwrap();
    let s2 = scope.resolve_canonical(a, "s2").unwrap();

    let info = scope.type_info(s2).unwrap();
    assert_eq!(info.name, "s2");
    assert_eq!(info.kind, TypeKind::Struct);
    assert_eq!(info.size, Some(4));
    assert_eq!(info.members.len(), 1);
    assert_eq!(info.members[0].name.as_deref(), Some("x"));

    let member = scope.type_info(info.members[0].ty).unwrap();
    assert_eq!(member.name, "int$32");
    assert_eq!(member.kind, TypeKind::Primitive);
}
