//! # Allocation Shadow Map
//!
//! Spatially indexed record of every currently-live tracked allocation unit
//! and its current type.
//!
//! The index is two layers: a page-granular bucket map (4 KiB pages, one
//! small vector of unit handles per page the unit touches) over a
//! generational slab of units. A point lookup hashes one page and scans the
//! handful of units on it, which is expected O(1). Units too large for
//! per-page bucketing live on a separate short list scanned linearly.
//!
//! Unit handles are generational: freeing a unit bumps its slot's
//! generation, so a stale [`UnitId`] held across a free can never observe or
//! mutate whatever allocation later recycles the slot. "Not found" after
//! free is a hard guarantee, not a best effort.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{AlloscopeError, AlloscopeResult};
use crate::types::{Address, TypeId};

/// Units spanning more than this many pages (4 MiB) skip the page buckets
/// and live on a separate list scanned linearly. Without the cutoff, one
/// multi-TiB mapping would insert a bucket entry per covered page.
const LARGE_UNIT_PAGES: u64 = 1024;

/// Handle to one live allocation unit.
///
/// Issued by [`ShadowMap::notify_alloc`]; becomes permanently stale at
/// `notify_free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId
{
    index: u32,
    generation: u32,
}

/// Caller-facing snapshot of one allocation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitInfo
{
    /// Handle of the unit
    pub id: UnitId,
    /// First byte of the unit
    pub base: Address,
    /// Length in bytes
    pub extent: u64,
    /// Canonical type currently assigned; `None` is the ordinary "untyped"
    /// state of freshly allocated memory
    pub ty: Option<TypeId>,
}

impl UnitInfo
{
    /// Whether `address` falls inside this unit.
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.base && address.value() - self.base.value() < self.extent
    }
}

struct LiveUnit
{
    base: Address,
    extent: u64,
    ty: Option<TypeId>,
}

impl LiveUnit
{
    fn contains(&self, address: Address) -> bool
    {
        address >= self.base && address.value() - self.base.value() < self.extent
    }

    fn intersects(&self, base: Address, extent: u64) -> bool
    {
        let self_end = self.base.value().saturating_add(self.extent);
        let other_end = base.value().saturating_add(extent);
        base.value() < self_end && self.base.value() < other_end
    }
}

struct UnitSlot
{
    generation: u32,
    unit: Option<LiveUnit>,
}

/// The shadow map itself.
///
/// Interior to [`crate::Alloscope`], which serializes mutations behind its
/// write lock; the map performs no locking of its own.
pub(crate) struct ShadowMap
{
    pages: HashMap<u64, SmallVec<[u32; 4]>>,
    // Units too large for per-page bucketing; rarely more than a handful.
    large: Vec<u32>,
    slots: Vec<UnitSlot>,
    free: Vec<u32>,
    live: usize,
}

impl ShadowMap
{
    pub(crate) fn new() -> Self
    {
        ShadowMap {
            pages: HashMap::new(),
            large: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Register a new, untyped unit.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument` for zero extent or a range that wraps the address
    ///   space
    /// - `OverlapViolation` if any byte of the range is already claimed by a
    ///   live unit; the registration is rejected and the prior unit wins
    pub(crate) fn notify_alloc(&mut self, base: Address, extent: u64) -> AlloscopeResult<UnitId>
    {
        if extent == 0 {
            return Err(AlloscopeError::InvalidArgument(format!(
                "zero-extent allocation at {base}"
            )));
        }
        let last = base.checked_add(extent - 1).ok_or_else(|| {
            AlloscopeError::InvalidArgument(format!("allocation [{base}, +{extent}) wraps the address space"))
        })?;

        let span = last.page() - base.page() + 1;
        if span > LARGE_UNIT_PAGES {
            // One pass over every live unit beats touching millions of
            // buckets for a registration this size.
            for slot in &self.slots {
                if let Some(unit) = slot.unit.as_ref() {
                    if unit.intersects(base, extent) {
                        return Err(AlloscopeError::OverlapViolation {
                            base,
                            extent,
                            existing: unit.base,
                        });
                    }
                }
            }
        } else {
            for page in base.page()..=last.page() {
                if let Some(bucket) = self.pages.get(&page) {
                    for &slot_index in bucket {
                        if let Some(unit) = self.slots[slot_index as usize].unit.as_ref() {
                            if unit.intersects(base, extent) {
                                return Err(AlloscopeError::OverlapViolation {
                                    base,
                                    extent,
                                    existing: unit.base,
                                });
                            }
                        }
                    }
                }
            }
            for &slot_index in &self.large {
                if let Some(unit) = self.slots[slot_index as usize].unit.as_ref() {
                    if unit.intersects(base, extent) {
                        return Err(AlloscopeError::OverlapViolation {
                            base,
                            extent,
                            existing: unit.base,
                        });
                    }
                }
            }
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(UnitSlot {
                    generation: 0,
                    unit: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.unit = Some(LiveUnit {
            base,
            extent,
            ty: None,
        });
        let id = UnitId {
            index,
            generation: slot.generation,
        };

        if span > LARGE_UNIT_PAGES {
            self.large.push(index);
        } else {
            for page in base.page()..=last.page() {
                self.pages.entry(page).or_default().push(index);
            }
        }
        self.live += 1;

        trace!(%base, extent, "allocation registered");
        Ok(id)
    }

    /// Destroy a unit; all future queries in its former range miss.
    pub(crate) fn notify_free(&mut self, id: UnitId) -> AlloscopeResult<()>
    {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(AlloscopeError::StaleUnit)?;
        let unit = slot.unit.take().ok_or(AlloscopeError::StaleUnit)?;
        // Recycled slots hand out a fresh generation, so `id` is now inert.
        slot.generation = slot.generation.wrapping_add(1);

        let last = unit.base.saturating_add(unit.extent - 1);
        if last.page() - unit.base.page() + 1 > LARGE_UNIT_PAGES {
            self.large.retain(|slot_index| *slot_index != id.index);
        } else {
            for page in unit.base.page()..=last.page() {
                if let Some(bucket) = self.pages.get_mut(&page) {
                    bucket.retain(|slot_index| *slot_index != id.index);
                    if bucket.is_empty() {
                        self.pages.remove(&page);
                    }
                }
            }
        }
        self.free.push(id.index);
        self.live -= 1;

        trace!(base = %unit.base, extent = unit.extent, "allocation retired");
        Ok(())
    }

    /// Set or overwrite the unit's type.
    ///
    /// Re-typing is ordinary (placement construction, unions reused for
    /// different contents) and idempotent. No extent-versus-size validation
    /// happens here; callers may under- or over-size on purpose, and the
    /// query engine reports the mismatch when it matters.
    pub(crate) fn assign_type(&mut self, id: UnitId, ty: Option<TypeId>) -> AlloscopeResult<()>
    {
        self.unit_mut(id)?.ty = ty;
        Ok(())
    }

    /// Current type of the unit, used by instrumentation to decide whether
    /// re-typing is needed.
    pub(crate) fn unit_type(&self, id: UnitId) -> AlloscopeResult<Option<TypeId>>
    {
        self.unit(id).map(|unit| unit.ty)
    }

    /// Snapshot of the unit behind `id`, if it is still live.
    pub(crate) fn unit_info(&self, id: UnitId) -> Option<UnitInfo>
    {
        self.unit(id).ok().map(|unit| UnitInfo {
            id,
            base: unit.base,
            extent: unit.extent,
            ty: unit.ty,
        })
    }

    /// Which unit, if any, contains `address`.
    pub(crate) fn find_unit(&self, address: Address) -> Option<UnitInfo>
    {
        if let Some(bucket) = self.pages.get(&address.page()) {
            for &slot_index in bucket {
                if let Some(info) = self.unit_at(slot_index, address) {
                    return Some(info);
                }
            }
        }
        for &slot_index in &self.large {
            if let Some(info) = self.unit_at(slot_index, address) {
                return Some(info);
            }
        }
        None
    }

    fn unit_at(&self, slot_index: u32, address: Address) -> Option<UnitInfo>
    {
        let slot = &self.slots[slot_index as usize];
        let unit = slot.unit.as_ref()?;
        if !unit.contains(address) {
            return None;
        }
        Some(UnitInfo {
            id: UnitId {
                index: slot_index,
                generation: slot.generation,
            },
            base: unit.base,
            extent: unit.extent,
            ty: unit.ty,
        })
    }

    /// Drop type assignments that point at retired canonical descriptors.
    ///
    /// Called during component unload: the memory is still live, only the
    /// type knowledge died with the component, so affected units revert to
    /// untyped rather than disappearing.
    pub(crate) fn invalidate_types(&mut self, retired: &[TypeId])
    {
        if retired.is_empty() {
            return;
        }
        let retired: HashSet<TypeId> = retired.iter().copied().collect();
        for slot in &mut self.slots {
            if let Some(unit) = slot.unit.as_mut() {
                if unit.ty.is_some_and(|ty| retired.contains(&ty)) {
                    unit.ty = None;
                }
            }
        }
    }

    /// Number of currently live units.
    pub(crate) fn live_units(&self) -> usize
    {
        self.live
    }

    fn unit(&self, id: UnitId) -> AlloscopeResult<&LiveUnit>
    {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.unit.as_ref())
            .ok_or(AlloscopeError::StaleUnit)
    }

    fn unit_mut(&mut self, id: UnitId) -> AlloscopeResult<&mut LiveUnit>
    {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.unit.as_mut())
            .ok_or(AlloscopeError::StaleUnit)
    }
}
