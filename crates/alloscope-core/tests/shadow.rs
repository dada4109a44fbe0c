//! Tests for allocation unit tracking and point lookup

use alloscope_core::error::AlloscopeError;
use alloscope_core::table::TableBuilder;
use alloscope_core::types::Address;
use alloscope_core::Alloscope;

fn scope_with_int32() -> (Alloscope, alloscope_core::TypeId)
{
    let scope = Alloscope::new();
    let mut builder = TableBuilder::new();
    builder.primitive("int$32", 4);
    let id = scope.load_component_bytes("lib", &builder.encode()).unwrap();
    let int32 = scope.resolve_canonical(id, "int$32").unwrap();
    (scope, int32)
}

#[test]
fn test_alloc_find_free_cycle()
{
    let scope = Alloscope::new();
    let base = Address::from(0x7000_0000_1000u64);
    let unit = scope.notify_alloc(base, 64).unwrap();

    // Every byte of the unit is found; neighbors are not.
    for probe in [base, base + 1, base + 63] {
        let info = scope.find_unit(probe).unwrap();
        assert_eq!(info.id, unit);
        assert_eq!(info.base, base);
        assert_eq!(info.extent, 64);
        assert_eq!(info.ty, None);
    }
    assert!(scope.find_unit(base + 64).is_none());
    assert!(scope.find_unit(Address::from(0x1000)).is_none());

    scope.notify_free(unit).unwrap();
    assert!(scope.find_unit(base).is_none());
}

#[test]
fn test_overlap_is_rejected()
{
    let scope = Alloscope::new();
    let base = Address::from(0x1000);
    scope.notify_alloc(base, 64).unwrap();

    // Exact duplicate, partial overlap from both sides, and full containment
    // all lose to the prior unit.
    for (other, extent) in [(0x1000, 64), (0x1020, 64), (0x0fe0, 64), (0x0ff0, 0x100)] {
        let err = scope.notify_alloc(Address::from(other), extent).unwrap_err();
        match err {
            AlloscopeError::OverlapViolation { existing, .. } => assert_eq!(existing, base),
            other => panic!("expected OverlapViolation, got {other:?}"),
        }
    }

    // The prior unit is untouched.
    assert_eq!(scope.find_unit(base).unwrap().extent, 64);
    assert_eq!(scope.stats().live_units, 1);
}

#[test]
fn test_adjacent_units_do_not_overlap()
{
    let scope = Alloscope::new();
    scope.notify_alloc(Address::from(0x1000), 0x100).unwrap();
    // End-exclusive: [0x1000, 0x1100) and [0x1100, 0x1200) touch but do not
    // intersect.
    scope.notify_alloc(Address::from(0x1100), 0x100).unwrap();
    assert_eq!(scope.stats().live_units, 2);
}

#[test]
fn test_page_spanning_unit_is_found_on_every_page()
{
    let scope = Alloscope::new();
    // Three 4 KiB pages, starting mid-page.
    let base = Address::from(0x1800);
    let unit = scope.notify_alloc(base, 0x2000).unwrap();

    for probe in [0x1800u64, 0x2000, 0x2fff, 0x3000, 0x37ff] {
        assert_eq!(scope.find_unit(Address::from(probe)).unwrap().id, unit);
    }
    assert!(scope.find_unit(Address::from(0x3800)).is_none());

    // Overlap detection sees it from a middle page too.
    assert!(matches!(
        scope.notify_alloc(Address::from(0x2100), 8),
        Err(AlloscopeError::OverlapViolation { .. })
    ));
}

#[test]
fn test_huge_unit_lifecycle()
{
    let scope = Alloscope::new();
    // A 1 TiB mapping: far beyond anything per-page bucketing could absorb.
    let base = Address::from(0x100_0000_0000u64);
    let extent = 1u64 << 40;
    let unit = scope.notify_alloc(base, extent).unwrap();

    for probe in [base, base + (extent / 2), base + (extent - 1)] {
        let info = scope.find_unit(probe).unwrap();
        assert_eq!(info.id, unit);
        assert_eq!(info.extent, extent);
    }
    assert!(scope.find_unit(base + extent).is_none());
    assert!(scope.find_unit(base - 1).is_none());

    scope.notify_free(unit).unwrap();
    assert!(scope.find_unit(base + (extent / 2)).is_none());
    assert_eq!(scope.stats().live_units, 0);
}

#[test]
fn test_huge_and_small_units_see_each_other()
{
    let scope = Alloscope::new();
    let huge_base = Address::from(0x100_0000_0000u64);
    scope.notify_alloc(huge_base, 1u64 << 40).unwrap();

    // A small registration deep inside the huge range is an overlap.
    assert!(matches!(
        scope.notify_alloc(huge_base + (1u64 << 39), 64),
        Err(AlloscopeError::OverlapViolation { .. })
    ));

    // And a huge registration over an existing small unit is too.
    let small_base = Address::from(0x9000_0000_0000u64);
    scope.notify_alloc(small_base, 64).unwrap();
    assert!(matches!(
        scope.notify_alloc(small_base - (1u64 << 30), 1u64 << 40),
        Err(AlloscopeError::OverlapViolation { .. })
    ));
}

#[test]
fn test_zero_extent_is_invalid()
{
    let scope = Alloscope::new();
    assert!(matches!(
        scope.notify_alloc(Address::from(0x1000), 0),
        Err(AlloscopeError::InvalidArgument(_))
    ));
}

#[test]
fn test_wrapping_range_is_invalid()
{
    let scope = Alloscope::new();
    assert!(matches!(
        scope.notify_alloc(Address::from(u64::MAX - 3), 16),
        Err(AlloscopeError::InvalidArgument(_))
    ));
}

#[test]
fn test_double_free_is_stale()
{
    let scope = Alloscope::new();
    let unit = scope.notify_alloc(Address::from(0x1000), 16).unwrap();
    scope.notify_free(unit).unwrap();
    assert!(matches!(scope.notify_free(unit), Err(AlloscopeError::StaleUnit)));
    assert!(matches!(scope.unit_type(unit), Err(AlloscopeError::StaleUnit)));
    assert!(scope.unit_info(unit).is_none());
}

#[test]
fn test_recycled_slot_does_not_resurrect_old_id()
{
    let (scope, int32) = scope_with_int32();
    let base = Address::from(0x1000);

    let first = scope.notify_alloc(base, 4).unwrap();
    scope.assign_type(first, Some(int32)).unwrap();
    scope.notify_free(first).unwrap();

    // The slot is recycled for a new tenant at the same address.
    let second = scope.notify_alloc(base, 4).unwrap();
    assert_ne!(first, second);

    // The old handle stays dead, and the new tenant starts untyped: no
    // leakage from the previous occupant.
    assert!(matches!(scope.assign_type(first, None), Err(AlloscopeError::StaleUnit)));
    assert_eq!(scope.unit_type(second).unwrap(), None);
    assert_eq!(scope.find_unit(base).unwrap().ty, None);
}

#[test]
fn test_assign_and_reassign_type()
{
    let (scope, int32) = scope_with_int32();
    let base = Address::from(0x1000);
    let unit = scope.notify_alloc(base, 4).unwrap();
    assert_eq!(scope.unit_type(unit).unwrap(), None);

    scope.assign_type(unit, Some(int32)).unwrap();
    assert_eq!(scope.unit_type(unit).unwrap(), Some(int32));
    // Idempotent.
    scope.assign_type(unit, Some(int32)).unwrap();
    assert_eq!(scope.unit_type(unit).unwrap(), Some(int32));

    // Back to untyped.
    scope.assign_type(unit, None).unwrap();
    assert_eq!(scope.unit_type(unit).unwrap(), None);
    assert_eq!(scope.find_unit(base).unwrap().ty, None);
}

#[test]
fn test_stats_track_live_units()
{
    let scope = Alloscope::new();
    assert_eq!(scope.stats().live_units, 0);

    let a = scope.notify_alloc(Address::from(0x1000), 16).unwrap();
    let b = scope.notify_alloc(Address::from(0x2000), 16).unwrap();
    assert_eq!(scope.stats().live_units, 2);

    scope.notify_free(a).unwrap();
    assert_eq!(scope.stats().live_units, 1);
    scope.notify_free(b).unwrap();
    assert_eq!(scope.stats().live_units, 0);
}
