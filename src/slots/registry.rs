//! Process-wide registry of live slots.
//!
//! The registry is the single source of truth for "is this container
//! defined". Each registered container owns one [`SlotCell`]; queued library
//! operations hold the same cell, so they keep updating it even after the
//! container was unregistered, without ever touching a newer registration
//! for the same id.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::identifiers::{ContainerId, NavigationId, SlotHandle};

// ============================================================================
// SlotState
// ============================================================================

/// Lifecycle state of one slot.
///
/// ```text
/// Unmounted → Defining → Displayed ⇄ Refreshing
///                 │          │
///                 └──────────┴──► Destroying → Unmounted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No live slot.
    Unmounted,
    /// Registered; definition queued or running.
    Defining,
    /// Defined and displayed.
    Displayed,
    /// Refresh queued.
    Refreshing,
    /// Destroy queued.
    Destroying,
}

impl SlotState {
    /// Returns `true` for every state but [`SlotState::Unmounted`].
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Unmounted)
    }
}

/// What kind of placement a slot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Bound to an in-page container.
    Content,
    /// Page-level (interstitial, anchor).
    OutOfPage,
}

// ============================================================================
// RegistryEntry
// ============================================================================

/// Snapshot of a registered slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Container the slot belongs to.
    pub container_id: ContainerId,
    /// Library handle, once the definition ran.
    pub handle: Option<SlotHandle>,
    /// Whether the one display call was issued.
    pub displayed: bool,
    /// Navigation that created the slot.
    pub navigation_id: NavigationId,
    /// Current lifecycle state.
    pub state: SlotState,
    /// Placement kind.
    pub kind: SlotKind,
}

// ============================================================================
// SlotCell
// ============================================================================

/// Mutable part of a cell.
#[derive(Debug)]
struct CellState {
    state: SlotState,
    handle: Option<SlotHandle>,
    displayed: bool,
}

/// Shared state of one registered slot.
pub struct SlotCell {
    container_id: ContainerId,
    kind: SlotKind,
    navigation_id: NavigationId,
    inner: Mutex<CellState>,
}

impl fmt::Debug for SlotCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SlotCell")
            .field("container_id", &self.container_id)
            .field("kind", &self.kind)
            .field("navigation_id", &self.navigation_id)
            .field("state", &inner.state)
            .field("handle", &inner.handle)
            .finish()
    }
}

impl SlotCell {
    fn new(container_id: ContainerId, kind: SlotKind, navigation_id: NavigationId) -> Self {
        Self {
            container_id,
            kind,
            navigation_id,
            inner: Mutex::new(CellState {
                state: SlotState::Defining,
                handle: None,
                displayed: false,
            }),
        }
    }

    /// Returns the container id.
    #[inline]
    #[must_use]
    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Returns the placement kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Returns the navigation that created this slot.
    #[inline]
    #[must_use]
    pub fn navigation_id(&self) -> NavigationId {
        self.navigation_id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.inner.lock().state
    }

    /// Returns the library handle, if defined.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<SlotHandle> {
        self.inner.lock().handle
    }

    /// Returns `true` once the display call was issued.
    #[inline]
    #[must_use]
    pub fn is_displayed(&self) -> bool {
        self.inner.lock().displayed
    }

    /// Returns a snapshot of this cell.
    #[must_use]
    pub fn entry(&self) -> RegistryEntry {
        let inner = self.inner.lock();
        RegistryEntry {
            container_id: self.container_id.clone(),
            handle: inner.handle,
            displayed: inner.displayed,
            navigation_id: self.navigation_id,
            state: inner.state,
            kind: self.kind,
        }
    }

    /// Moves `from` → `to`. Returns `false` if the cell was not in `from`.
    pub(crate) fn transition(&self, from: SlotState, to: SlotState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != from {
            return false;
        }
        inner.state = to;
        true
    }

    /// Stores the handle produced by the definition.
    pub(crate) fn attach(&self, handle: SlotHandle) {
        let mut inner = self.inner.lock();
        if inner.handle.is_none() {
            inner.handle = Some(handle);
        }
    }

    /// Records the display call. Returns `false` if it was already issued.
    pub(crate) fn mark_displayed(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.displayed {
            return false;
        }
        inner.displayed = true;
        if inner.state == SlotState::Defining {
            inner.state = SlotState::Displayed;
        }
        true
    }

    /// Starts teardown. Returns `false` if already tearing down or gone.
    pub(crate) fn begin_destroy(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SlotState::Unmounted | SlotState::Destroying => false,
            _ => {
                inner.state = SlotState::Destroying;
                true
            }
        }
    }

    /// Finishes the cell, returning the handle still to be destroyed.
    pub(crate) fn finish(&self) -> Option<SlotHandle> {
        let mut inner = self.inner.lock();
        inner.state = SlotState::Unmounted;
        inner.handle.take()
    }
}

// ============================================================================
// SlotRegistry
// ============================================================================

/// Map from container id to its live slot.
///
/// Holds at most one entry per container id. Only the slot controllers
/// mutate it; everything else reads snapshots.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: RwLock<FxHashMap<ContainerId, Arc<SlotCell>>>,
}

impl SlotRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `container_id`.
    ///
    /// Returns `None` if the id is already registered; the caller must skip
    /// redefinition.
    pub(crate) fn register(
        &self,
        container_id: &ContainerId,
        kind: SlotKind,
        navigation_id: NavigationId,
    ) -> Option<Arc<SlotCell>> {
        let mut slots = self.slots.write();
        if slots.contains_key(container_id) {
            return None;
        }

        let cell = Arc::new(SlotCell::new(container_id.clone(), kind, navigation_id));
        slots.insert(container_id.clone(), Arc::clone(&cell));
        Some(cell)
    }

    /// Removes `container_id`, returning its cell.
    pub(crate) fn unregister(&self, container_id: &ContainerId) -> Option<Arc<SlotCell>> {
        self.slots.write().remove(container_id)
    }

    /// Removes `cell` only if it is still the registered cell for its id.
    pub(crate) fn unregister_cell(&self, cell: &Arc<SlotCell>) -> bool {
        let mut slots = self.slots.write();
        match slots.get(cell.container_id()) {
            Some(current) if Arc::ptr_eq(current, cell) => {
                slots.remove(cell.container_id());
                true
            }
            _ => false,
        }
    }

    /// Returns the cell registered for `container_id`.
    pub(crate) fn cell(&self, container_id: &ContainerId) -> Option<Arc<SlotCell>> {
        self.slots.read().get(container_id).cloned()
    }

    /// Removes every content slot created before `navigation_id`.
    pub(crate) fn take_stale(&self, navigation_id: NavigationId) -> Vec<Arc<SlotCell>> {
        let mut slots = self.slots.write();
        let stale: Vec<ContainerId> = slots
            .values()
            .filter(|cell| cell.kind() == SlotKind::Content && cell.navigation_id() < navigation_id)
            .map(|cell| cell.container_id().clone())
            .collect();

        let mut cells: Vec<Arc<SlotCell>> =
            stale.iter().filter_map(|id| slots.remove(id)).collect();
        cells.sort_by(|a, b| a.container_id().cmp(b.container_id()));
        cells
    }

    /// Removes and returns every cell.
    pub(crate) fn drain(&self) -> Vec<Arc<SlotCell>> {
        let mut cells: Vec<Arc<SlotCell>> = self.slots.write().drain().map(|(_, c)| c).collect();
        cells.sort_by(|a, b| a.container_id().cmp(b.container_id()));
        cells
    }

    /// Returns a snapshot of the entry for `container_id`.
    #[must_use]
    pub fn get(&self, container_id: &ContainerId) -> Option<RegistryEntry> {
        self.slots.read().get(container_id).map(|cell| cell.entry())
    }

    /// Returns `true` if `container_id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, container_id: &ContainerId) -> bool {
        self.slots.read().contains_key(container_id)
    }

    /// Returns the number of registered slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns snapshots of every entry, ordered by container id.
    #[must_use]
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> =
            self.slots.read().values().map(|cell| cell.entry()).collect();
        entries.sort_by(|a, b| a.container_id.cmp(&b.container_id));
        entries
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rustc_hash::FxHashSet;

    fn id(name: &str) -> ContainerId {
        ContainerId::new(name).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = SlotRegistry::new();
        let nav = NavigationId::INITIAL;

        assert!(registry.register(&id("X"), SlotKind::Content, nav).is_some());
        assert!(registry.register(&id("X"), SlotKind::Content, nav).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_unknown_is_none() {
        let registry = SlotRegistry::new();
        assert!(registry.unregister(&id("never")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_cell_ignores_newer_registration() {
        let registry = SlotRegistry::new();
        let nav = NavigationId::INITIAL;

        let old = registry.register(&id("X"), SlotKind::Content, nav).unwrap();
        registry.unregister(&id("X"));
        let new = registry.register(&id("X"), SlotKind::Content, nav).unwrap();

        assert!(!registry.unregister_cell(&old));
        assert!(registry.contains(&id("X")));
        assert!(registry.unregister_cell(&new));
        assert!(!registry.contains(&id("X")));
    }

    #[test]
    fn test_cell_lifecycle() {
        let registry = SlotRegistry::new();
        let cell = registry
            .register(&id("X"), SlotKind::Content, NavigationId::INITIAL)
            .unwrap();
        assert_eq!(cell.state(), SlotState::Defining);

        let handle = SlotHandle::next();
        cell.attach(handle);
        assert!(cell.mark_displayed());
        assert!(!cell.mark_displayed());
        assert_eq!(cell.state(), SlotState::Displayed);

        assert!(cell.transition(SlotState::Displayed, SlotState::Refreshing));
        assert!(!cell.transition(SlotState::Displayed, SlotState::Refreshing));
        assert!(cell.transition(SlotState::Refreshing, SlotState::Displayed));

        assert!(cell.begin_destroy());
        assert!(!cell.begin_destroy());
        assert_eq!(cell.finish(), Some(handle));
        assert_eq!(cell.finish(), None);
        assert_eq!(cell.state(), SlotState::Unmounted);
    }

    #[test]
    fn test_take_stale_only_takes_old_content() {
        let registry = SlotRegistry::new();
        let first = NavigationId::INITIAL.next();
        let second = first.next();

        registry.register(&id("old"), SlotKind::Content, first);
        registry.register(&id("new"), SlotKind::Content, second);
        registry.register(&ContainerId::page_slot("anchor"), SlotKind::OutOfPage, first);

        let stale = registry.take_stale(second);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].container_id(), &id("old"));
        assert!(registry.contains(&id("new")));
        assert!(registry.contains(&ContainerId::page_slot("anchor")));
    }

    #[test]
    fn test_entries_snapshot() {
        let registry = SlotRegistry::new();
        registry.register(&id("b"), SlotKind::Content, NavigationId::INITIAL);
        registry.register(&id("a"), SlotKind::Content, NavigationId::INITIAL);

        let entries = registry.entries();
        assert_eq!(entries[0].container_id, id("a"));
        assert_eq!(entries[1].container_id, id("b"));
        assert_eq!(entries[0].handle, None);
        assert!(!entries[0].displayed);
        assert_eq!(registry.get(&id("a")).unwrap().state, SlotState::Defining);
    }

    proptest! {
        #[test]
        fn prop_at_most_one_entry_per_id(ops in prop::collection::vec((any::<bool>(), 0u8..4), 0..64)) {
            let registry = SlotRegistry::new();
            let mut model: FxHashSet<u8> = FxHashSet::default();

            for (register, n) in ops {
                let container = id(&format!("c{n}"));
                if register {
                    let reserved = registry
                        .register(&container, SlotKind::Content, NavigationId::INITIAL)
                        .is_some();
                    prop_assert_eq!(reserved, model.insert(n));
                } else {
                    let removed = registry.unregister(&container).is_some();
                    prop_assert_eq!(removed, model.remove(&n));
                }

                prop_assert_eq!(registry.len(), model.len());
                prop_assert!(registry.entries().windows(2).all(|w| w[0].container_id != w[1].container_id));
            }
        }
    }
}
