//! Isolated memory manager.
//!
//! Regions are owned buffers keyed by [`RegionId`] in a slot table.
//! No raw addresses cross the API: every access goes through
//! [`MemoryManager::validate_access`], which checks the caller against
//! the region's boundary entries.
//!
//! Ownership rules:
//!
//! - A region has exactly one owner, fixed at allocation.
//! - Sharing registers a boundary for the recipient with possibly
//!   narrower permissions and bumps the refcount.
//! - Only the owner frees. While the refcount is above one, a free
//!   merely decrements it; the final free zeroes the buffer (when
//!   configured), drops every boundary, and releases the slot.

use crate::error::{AdapterError, Result};
use enclave_types::{ComponentId, IsolationLevel, Permission, RegionId};
use std::collections::HashMap;
use tracing::debug;

/// An isolated memory region.
#[derive(Debug)]
pub struct Region {
    /// Slot key.
    pub id: RegionId,
    /// Buffer size in bytes.
    pub size: usize,
    /// Permissions the owner holds on the region.
    pub permissions: Permission,
    /// Owning component. Fixed for the region's lifetime.
    pub owner: ComponentId,
    /// Live references: the owner plus one per active share.
    pub refcount: u32,
    /// Whether the region has ever been shared and still has holders.
    pub shared: bool,
    /// Whether the region is guard-protected.
    pub guarded: bool,
    buf: Vec<u8>,
}

impl Region {
    /// Read-only view of the buffer.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Access grant binding a component to a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Component granted access.
    pub component: ComponentId,
    /// Region the grant covers.
    pub region: RegionId,
    /// Permissions granted. May be narrower than the owner's.
    pub permissions: Permission,
}

/// Counters maintained by the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes allocated over the manager's lifetime.
    pub total_allocated: u64,
    /// Bytes freed over the manager's lifetime.
    pub total_freed: u64,
    /// High-water mark of live bytes.
    pub peak_usage: u64,
    /// Number of allocations.
    pub allocation_count: u64,
    /// Number of final frees.
    pub free_count: u64,
    /// Access attempts refused at a boundary.
    pub boundary_violations: u64,
}

/// The memory manager's view of a participating component.
#[derive(Debug, Clone, Copy)]
pub struct OwnerView<'a> {
    /// Component id.
    pub id: &'a ComponentId,
    /// Isolation level from the component's policy.
    pub isolation: IsolationLevel,
    /// Permissions granted by the component's policy.
    pub allowed: Permission,
    /// The component's allocation ceiling in bytes.
    pub max_memory_bytes: u64,
}

/// Slot-table memory manager.
#[derive(Debug)]
pub struct MemoryManager {
    regions: HashMap<RegionId, Region>,
    boundaries: Vec<Boundary>,
    next_slot: u64,
    zero_on_free: bool,
    guard_pages: bool,
    stats: MemoryStats,
}

impl MemoryManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(zero_on_free: bool, guard_pages: bool) -> Self {
        Self {
            regions: HashMap::new(),
            boundaries: Vec::new(),
            next_slot: 0,
            zero_on_free,
            guard_pages,
            stats: MemoryStats::default(),
        }
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Looks up a region by id.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// Bytes currently allocated to regions owned by a component.
    #[must_use]
    pub fn usage_of(&self, owner: &ComponentId) -> u64 {
        self.regions
            .values()
            .filter(|r| &r.owner == owner)
            .map(|r| r.size as u64)
            .sum()
    }

    /// Region ids owned by a component.
    #[must_use]
    pub fn regions_of(&self, owner: &ComponentId) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self
            .regions
            .values()
            .filter(|r| &r.owner == owner)
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Allocates a zero-filled region for `owner`.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for a zero size
    /// - `PermissionDenied` when the owner lacks `MEMORY_WRITE` or
    ///   requests permissions outside its policy
    /// - `IsolationBreach` when the allocation would push the owner
    ///   over its memory ceiling
    pub fn allocate(
        &mut self,
        owner: &OwnerView<'_>,
        size: usize,
        permissions: Permission,
    ) -> Result<RegionId> {
        if size == 0 {
            return Err(AdapterError::InvalidParameter(
                "allocation size must be greater than zero".into(),
            ));
        }

        if !owner.allowed.contains(Permission::MEMORY_WRITE) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} lacks MEMORY_WRITE",
                owner.id
            )));
        }
        if !owner.allowed.contains(permissions) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} requested permissions outside its policy",
                owner.id
            )));
        }

        let usage = self.usage_of(owner.id);
        if usage + size as u64 > owner.max_memory_bytes {
            return Err(AdapterError::IsolationBreach(format!(
                "{}: allocation of {size} bytes would exceed ceiling {} (currently {usage})",
                owner.id, owner.max_memory_bytes
            )));
        }

        let id = RegionId::from_raw(self.next_slot);
        self.next_slot += 1;

        let guarded = self.guard_pages && owner.isolation.requires_guards();
        self.regions.insert(
            id,
            Region {
                id,
                size,
                permissions,
                owner: owner.id.clone(),
                refcount: 1,
                shared: false,
                guarded,
                buf: vec![0; size],
            },
        );
        self.boundaries.push(Boundary {
            component: owner.id.clone(),
            region: id,
            permissions,
        });

        self.stats.total_allocated += size as u64;
        self.stats.allocation_count += 1;
        let live = self.stats.total_allocated - self.stats.total_freed;
        self.stats.peak_usage = self.stats.peak_usage.max(live);

        debug!(owner = %owner.id, %id, size, guarded, "region allocated");
        Ok(id)
    }

    /// Frees a region, or drops one reference while shares remain.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for an unknown region id
    /// - `PermissionDenied` when the caller is not the owner
    pub fn free(&mut self, caller: &ComponentId, id: RegionId) -> Result<()> {
        let region = self
            .regions
            .get_mut(&id)
            .ok_or_else(|| AdapterError::InvalidParameter(format!("unknown region {id}")))?;

        if &region.owner != caller {
            return Err(AdapterError::PermissionDenied(format!(
                "{caller} does not own {id}"
            )));
        }

        if region.refcount > 1 {
            region.refcount -= 1;
            debug!(%id, refcount = region.refcount, "region reference dropped");
            return Ok(());
        }

        if self.zero_on_free {
            region.buf.fill(0);
        }
        let size = region.size as u64;
        self.regions.remove(&id);
        self.boundaries.retain(|b| b.region != id);

        self.stats.total_freed += size;
        self.stats.free_count += 1;

        debug!(%id, size, "region freed");
        Ok(())
    }

    /// Shares a region owned by `source` with `target`.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for an unknown region id
    /// - `PermissionDenied` when `source` does not own the region,
    ///   lacks `MEMORY_READ`, or `target`'s policy does not allow the
    ///   requested permissions
    /// - `IsolationBreach` when either party runs at `Paranoid`
    ///   isolation, which forbids sharing entirely
    pub fn share(
        &mut self,
        source: &OwnerView<'_>,
        target: &OwnerView<'_>,
        id: RegionId,
        permissions: Permission,
    ) -> Result<()> {
        let region = self
            .regions
            .get(&id)
            .ok_or_else(|| AdapterError::InvalidParameter(format!("unknown region {id}")))?;

        if &region.owner != source.id {
            return Err(AdapterError::PermissionDenied(format!(
                "{} does not own {id}",
                source.id
            )));
        }
        if !source.allowed.contains(Permission::MEMORY_READ) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} lacks MEMORY_READ",
                source.id
            )));
        }
        if !target.allowed.contains(permissions) {
            return Err(AdapterError::PermissionDenied(format!(
                "{} policy does not allow the requested permissions",
                target.id
            )));
        }
        if !source.isolation.allows_sharing() || !target.isolation.allows_sharing() {
            return Err(AdapterError::IsolationBreach(format!(
                "sharing {id} between {} and {} refused at paranoid isolation",
                source.id, target.id
            )));
        }

        {
            let region = self
                .regions
                .get_mut(&id)
                .ok_or_else(|| AdapterError::InvalidParameter(format!("unknown region {id}")))?;
            region.refcount += 1;
            region.shared = true;
        }

        self.boundaries.push(Boundary {
            component: target.id.clone(),
            region: id,
            permissions,
        });

        debug!(%id, source = %source.id, target = %target.id, "region shared");
        Ok(())
    }

    /// Revokes a share previously granted to `holder`, dropping its
    /// boundary and one reference. Used when a sharing component is
    /// unregistered.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the region is unknown or `holder` has
    /// no share on it.
    pub fn revoke_share(&mut self, holder: &ComponentId, id: RegionId) -> Result<()> {
        let region = self
            .regions
            .get_mut(&id)
            .ok_or_else(|| AdapterError::InvalidParameter(format!("unknown region {id}")))?;
        if &region.owner == holder {
            return Err(AdapterError::InvalidParameter(format!(
                "{holder} owns {id}, use free"
            )));
        }

        let pos = self
            .boundaries
            .iter()
            .position(|b| b.region == id && &b.component == holder)
            .ok_or_else(|| {
                AdapterError::InvalidParameter(format!("{holder} holds no share on {id}"))
            })?;
        self.boundaries.remove(pos);

        region.refcount -= 1;
        if region.refcount <= 1 {
            region.shared = false;
        }
        Ok(())
    }

    /// Regions a component holds a share on without owning them.
    #[must_use]
    pub fn shares_held_by(&self, holder: &ComponentId) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self
            .boundaries
            .iter()
            .filter(|b| &b.component == holder)
            .filter(|b| {
                self.regions
                    .get(&b.region)
                    .is_some_and(|r| &r.owner != holder)
            })
            .map(|b| b.region)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Regions shared to components other than their owner.
    #[must_use]
    pub fn external_holders(&self, owner: &ComponentId) -> usize {
        self.regions
            .values()
            .filter(|r| &r.owner == owner && r.refcount > 1)
            .count()
    }

    /// Validates an access by `component` to `[offset, offset+len)`
    /// of a region with the given permissions.
    ///
    /// # Errors
    ///
    /// `IsolationBreach` when the region is unknown, the range is out
    /// of bounds, no boundary grants the component access, or the
    /// granted permissions do not cover the request. Every refusal
    /// bumps the `boundary_violations` counter.
    pub fn validate_access(
        &mut self,
        component: &ComponentId,
        id: RegionId,
        offset: usize,
        len: usize,
        permissions: Permission,
    ) -> Result<()> {
        let refused = |stats: &mut MemoryStats, detail: String| {
            stats.boundary_violations += 1;
            Err(AdapterError::IsolationBreach(detail))
        };

        let Some(region) = self.regions.get(&id) else {
            return refused(&mut self.stats, format!("unknown region {id}"));
        };

        match offset.checked_add(len) {
            Some(end) if end <= region.size => {}
            _ => {
                return refused(
                    &mut self.stats,
                    format!(
                        "{component}: range {offset}+{len} outside {id} ({} bytes)",
                        region.size
                    ),
                );
            }
        }

        let Some(boundary) = self
            .boundaries
            .iter()
            .find(|b| b.region == id && &b.component == component)
        else {
            return refused(
                &mut self.stats,
                format!("{component} has no boundary on {id}"),
            );
        };

        if !boundary.permissions.contains(permissions) {
            return refused(
                &mut self.stats,
                format!("{component}: {permissions} not granted on {id}"),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner<'a>(id: &'a ComponentId, isolation: IsolationLevel, allowed: Permission) -> OwnerView<'a> {
        OwnerView {
            id,
            isolation,
            allowed,
            max_memory_bytes: 1024,
        }
    }

    fn rw() -> Permission {
        Permission::MEMORY_READ | Permission::MEMORY_WRITE
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let id = ComponentId::new("comp").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&id, IsolationLevel::Standard, rw());

        let region = mgr.allocate(&view, 256, rw()).unwrap();
        assert_eq!(mgr.usage_of(&id), 256);
        assert_eq!(mgr.region(region).unwrap().refcount, 1);
        assert_eq!(mgr.stats().allocation_count, 1);
        assert_eq!(mgr.stats().peak_usage, 256);

        mgr.free(&id, region).unwrap();
        assert_eq!(mgr.usage_of(&id), 0);
        assert!(mgr.region(region).is_none());
        assert_eq!(mgr.stats().free_count, 1);
        assert_eq!(mgr.stats().total_freed, 256);
    }

    #[test]
    fn zero_size_rejected() {
        let id = ComponentId::new("comp").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&id, IsolationLevel::Standard, rw());
        assert!(matches!(
            mgr.allocate(&view, 0, rw()),
            Err(AdapterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn allocation_requires_memory_write() {
        let id = ComponentId::new("comp").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&id, IsolationLevel::Standard, Permission::MEMORY_READ);
        assert!(matches!(
            mgr.allocate(&view, 64, Permission::MEMORY_READ),
            Err(AdapterError::PermissionDenied(_))
        ));
    }

    #[test]
    fn ceiling_enforced_across_allocations() {
        let id = ComponentId::new("comp").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&id, IsolationLevel::Standard, rw());

        mgr.allocate(&view, 600, rw()).unwrap();
        let err = mgr.allocate(&view, 600, rw()).unwrap_err();
        assert!(matches!(err, AdapterError::IsolationBreach(_)));

        // Usage never exceeded the ceiling.
        assert!(mgr.usage_of(&id) <= view.max_memory_bytes);

        // Freeing makes room again.
        let regions = mgr.regions_of(&id);
        mgr.free(&id, regions[0]).unwrap();
        assert!(mgr.allocate(&view, 600, rw()).is_ok());
    }

    #[test]
    fn guard_flag_follows_isolation() {
        let id = ComponentId::new("comp").unwrap();
        let mut mgr = MemoryManager::new(true, true);

        let standard = owner(&id, IsolationLevel::Standard, rw());
        let r1 = mgr.allocate(&standard, 32, rw()).unwrap();
        assert!(!mgr.region(r1).unwrap().guarded);

        let strict = owner(&id, IsolationLevel::Strict, rw());
        let r2 = mgr.allocate(&strict, 32, rw()).unwrap();
        assert!(mgr.region(r2).unwrap().guarded);

        // Guard pages disabled globally.
        let mut unguarded = MemoryManager::new(true, false);
        let r3 = unguarded.allocate(&strict, 32, rw()).unwrap();
        assert!(!unguarded.region(r3).unwrap().guarded);
    }

    #[test]
    fn only_owner_frees() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&a, IsolationLevel::Standard, rw());
        let region = mgr.allocate(&view, 64, rw()).unwrap();

        assert!(matches!(
            mgr.free(&b, region),
            Err(AdapterError::PermissionDenied(_))
        ));
        assert!(mgr.region(region).is_some());
    }

    #[test]
    fn share_then_free_sequence() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let src = owner(&a, IsolationLevel::Standard, rw());
        let dst = owner(&b, IsolationLevel::Standard, Permission::MEMORY_READ);

        let region = mgr.allocate(&src, 64, rw()).unwrap();
        mgr.share(&src, &dst, region, Permission::MEMORY_READ).unwrap();

        let r = mgr.region(region).unwrap();
        assert_eq!(r.refcount, 2);
        assert!(r.shared);

        // Target can read within its boundary.
        assert!(mgr
            .validate_access(&b, region, 0, 64, Permission::MEMORY_READ)
            .is_ok());
        // But not write: its boundary is narrower than the owner's.
        assert!(mgr
            .validate_access(&b, region, 0, 64, Permission::MEMORY_WRITE)
            .is_err());

        // Owner's first free drops one reference, region survives.
        mgr.free(&a, region).unwrap();
        assert_eq!(mgr.region(region).unwrap().refcount, 1);
        assert_eq!(mgr.stats().free_count, 0);

        // Second free releases it.
        mgr.free(&a, region).unwrap();
        assert!(mgr.region(region).is_none());
        assert_eq!(mgr.stats().free_count, 1);
    }

    #[test]
    fn share_refused_at_paranoid() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let src = owner(&a, IsolationLevel::Paranoid, rw());
        let dst = owner(&b, IsolationLevel::Standard, Permission::MEMORY_READ);

        let region = mgr.allocate(&src, 64, rw()).unwrap();
        let err = mgr
            .share(&src, &dst, region, Permission::MEMORY_READ)
            .unwrap_err();
        assert!(matches!(err, AdapterError::IsolationBreach(_)));

        // No refcount or boundary leaked by the refusal.
        let r = mgr.region(region).unwrap();
        assert_eq!(r.refcount, 1);
        assert!(!r.shared);
        assert!(mgr
            .validate_access(&b, region, 0, 64, Permission::MEMORY_READ)
            .is_err());
    }

    #[test]
    fn share_requires_target_policy_coverage() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let src = owner(&a, IsolationLevel::Standard, rw());
        let dst = owner(&b, IsolationLevel::Standard, Permission::MEMORY_READ);

        let region = mgr.allocate(&src, 64, rw()).unwrap();
        let err = mgr.share(&src, &dst, region, rw()).unwrap_err();
        assert!(matches!(err, AdapterError::PermissionDenied(_)));
    }

    #[test]
    fn share_requires_source_ownership() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let c = ComponentId::new("c").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let src = owner(&a, IsolationLevel::Standard, rw());
        let interloper = owner(&b, IsolationLevel::Standard, rw());
        let dst = owner(&c, IsolationLevel::Standard, Permission::MEMORY_READ);

        let region = mgr.allocate(&src, 64, rw()).unwrap();
        let err = mgr
            .share(&interloper, &dst, region, Permission::MEMORY_READ)
            .unwrap_err();
        assert!(matches!(err, AdapterError::PermissionDenied(_)));
    }

    #[test]
    fn revoke_share_drops_reference_and_boundary() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let src = owner(&a, IsolationLevel::Standard, rw());
        let dst = owner(&b, IsolationLevel::Standard, Permission::MEMORY_READ);

        let region = mgr.allocate(&src, 64, rw()).unwrap();
        mgr.share(&src, &dst, region, Permission::MEMORY_READ).unwrap();
        assert_eq!(mgr.external_holders(&a), 1);

        mgr.revoke_share(&b, region).unwrap();
        assert_eq!(mgr.external_holders(&a), 0);
        let r = mgr.region(region).unwrap();
        assert_eq!(r.refcount, 1);
        assert!(!r.shared);
    }

    #[test]
    fn access_validation_bumps_violation_counter() {
        let a = ComponentId::new("a").unwrap();
        let b = ComponentId::new("b").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&a, IsolationLevel::Standard, rw());
        let region = mgr.allocate(&view, 64, rw()).unwrap();

        // Out of bounds.
        assert!(mgr
            .validate_access(&a, region, 32, 64, Permission::MEMORY_READ)
            .is_err());
        // No boundary.
        assert!(mgr
            .validate_access(&b, region, 0, 16, Permission::MEMORY_READ)
            .is_err());
        // In bounds, granted.
        assert!(mgr
            .validate_access(&a, region, 0, 64, Permission::MEMORY_READ)
            .is_ok());

        assert_eq!(mgr.stats().boundary_violations, 2);
    }

    #[test]
    fn offset_overflow_refused() {
        let a = ComponentId::new("a").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&a, IsolationLevel::Standard, rw());
        let region = mgr.allocate(&view, 64, rw()).unwrap();

        assert!(mgr
            .validate_access(&a, region, usize::MAX, 2, Permission::MEMORY_READ)
            .is_err());
    }

    #[test]
    fn peak_usage_tracks_high_water_mark() {
        let a = ComponentId::new("a").unwrap();
        let mut mgr = MemoryManager::new(true, true);
        let view = owner(&a, IsolationLevel::Standard, rw());

        let r1 = mgr.allocate(&view, 400, rw()).unwrap();
        let _r2 = mgr.allocate(&view, 300, rw()).unwrap();
        assert_eq!(mgr.stats().peak_usage, 700);

        mgr.free(&a, r1).unwrap();
        let _r3 = mgr.allocate(&view, 100, rw()).unwrap();
        // Peak is retained even after usage falls.
        assert_eq!(mgr.stats().peak_usage, 700);
    }
}
