//! Page-level (out-of-page) slots.
//!
//! The interstitial and anchor placements are not bound to a container the
//! host renders. They are defined, displayed and destroyed together, as one
//! unit per page: either every configured placement is live or none is.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ContainerId, NavigationId, SlotHandle, UnitPath};
use crate::protocol::{DisplayTarget, OutOfPageFormat};
use crate::transport::{CommandQueue, Completion, TagLibrary};

use super::{PageSlotConfig, SlotCell, SlotContext, SlotEvent, SlotKind};

// ============================================================================
// PageSlots
// ============================================================================

/// The page-level slots mounted for one navigation.
///
/// Cloning is cheap; clones refer to the same set. Tearing down is
/// idempotent across clones.
#[derive(Clone)]
pub struct PageSlots {
    inner: Arc<PageSlotsInner>,
}

struct PageSlotsInner {
    navigation_id: NavigationId,
    cells: Vec<Arc<SlotCell>>,
    torn_down: AtomicBool,
    failed: AtomicBool,
}

impl fmt::Debug for PageSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSlots")
            .field("navigation_id", &self.inner.navigation_id)
            .field("containers", &self.container_ids())
            .field("torn_down", &self.is_torn_down())
            .field("failed", &self.is_failed())
            .finish()
    }
}

impl PageSlots {
    fn new(navigation_id: NavigationId, cells: Vec<Arc<SlotCell>>) -> Self {
        Self {
            inner: Arc::new(PageSlotsInner {
                navigation_id,
                cells,
                torn_down: AtomicBool::new(false),
                failed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the navigation these slots were mounted for.
    #[inline]
    #[must_use]
    pub fn navigation_id(&self) -> NavigationId {
        self.inner.navigation_id
    }

    /// Returns `true` if no placement was configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.cells.is_empty()
    }

    /// Returns the synthetic container ids, in definition order.
    #[must_use]
    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.inner
            .cells
            .iter()
            .map(|cell| cell.container_id().clone())
            .collect()
    }

    /// Returns the handles defined so far.
    #[must_use]
    pub fn handles(&self) -> Vec<SlotHandle> {
        self.inner.cells.iter().filter_map(|cell| cell.handle()).collect()
    }

    /// Returns `true` once every placement was displayed.
    #[must_use]
    pub fn is_displayed(&self) -> bool {
        self.inner.cells.iter().all(|cell| cell.is_displayed())
    }

    /// Returns `true` once teardown was requested.
    #[inline]
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Returns `true` if the library rejected the set and it was rolled back.
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    /// Returns `true` once the definition ran, successfully or not.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_failed() || self.is_displayed()
    }

    /// Returns `true` once no placement holds a live slot anymore.
    pub(crate) fn is_released(&self) -> bool {
        self.inner
            .cells
            .iter()
            .all(|cell| !cell.state().is_live())
    }
}

// ============================================================================
// Mount
// ============================================================================

/// Registers every configured placement and queues their definition.
///
/// Nothing is registered if any synthetic container is already taken or the
/// queue is closed.
pub(crate) fn mount(
    ctx: &SlotContext,
    queue: &CommandQueue,
    config: &PageSlotConfig,
    navigation_id: NavigationId,
) -> Result<PageSlots> {
    if queue.is_closed() {
        return Err(Error::QueueClosed);
    }

    let placements = config.placements();
    let mut cells = Vec::with_capacity(placements.len());

    for (container_id, _, _) in &placements {
        match ctx
            .registry
            .register(container_id, SlotKind::OutOfPage, navigation_id)
        {
            Some(cell) => cells.push(cell),
            None => {
                for cell in &cells {
                    ctx.registry.unregister_cell(cell);
                }
                warn!(%container_id, "Page slot already registered, skipping page slots");
                return Err(Error::duplicate_mount(container_id.clone()));
            }
        }
    }

    let slots = PageSlots::new(navigation_id, cells);
    if slots.is_empty() {
        debug!(%navigation_id, "No page slots configured");
        return Ok(slots);
    }

    let units: Vec<(Arc<SlotCell>, UnitPath, OutOfPageFormat)> = slots
        .inner
        .cells
        .iter()
        .cloned()
        .zip(placements)
        .map(|(cell, (_, unit_path, format))| (cell, unit_path, format))
        .collect();

    debug!(%navigation_id, count = units.len(), "Page slots queued");

    let ctx = ctx.clone();
    let set = slots.clone();
    let _defined = queue.when_ready(move |library| {
        let defined = define_all(library, &ctx, &units);
        if defined.is_err() {
            set.inner.failed.store(true, Ordering::SeqCst);
        }
        defined
    });
    Ok(slots)
}

/// Defines, attaches and displays every placement, or none.
fn define_all(
    library: &dyn TagLibrary,
    ctx: &SlotContext,
    units: &[(Arc<SlotCell>, UnitPath, OutOfPageFormat)],
) -> Result<Vec<SlotHandle>> {
    let mut handles = Vec::with_capacity(units.len());

    for (cell, unit_path, format) in units {
        match library.define_out_of_page_slot(unit_path, *format) {
            Ok(handle) => {
                cell.attach(handle);
                handles.push(handle);
                ctx.events.emit(SlotEvent::Defined {
                    container_id: cell.container_id().clone(),
                    handle,
                });
            }
            Err(e) => return Err(abandon_all(library, ctx, units, e)),
        }
    }

    for &handle in &handles {
        if let Err(e) = library.add_service(handle) {
            return Err(abandon_all(library, ctx, units, e));
        }
    }

    for ((cell, _, format), &handle) in units.iter().zip(&handles) {
        if !cell.mark_displayed() {
            continue;
        }
        if let Err(e) = library.display(DisplayTarget::Slot(handle)) {
            return Err(abandon_all(library, ctx, units, e));
        }
        ctx.events.emit(SlotEvent::Displayed {
            container_id: cell.container_id().clone(),
            handle,
        });
        debug!(format = format.as_str(), %handle, "Page slot displayed");
    }

    info!(count = handles.len(), "Page slots displayed");
    Ok(handles)
}

/// Rolls back a partially defined set.
fn abandon_all(
    library: &dyn TagLibrary,
    ctx: &SlotContext,
    units: &[(Arc<SlotCell>, UnitPath, OutOfPageFormat)],
    error: Error,
) -> Error {
    let reason = match error {
        Error::DefineFailed { reason, .. } => reason,
        other => other.to_string(),
    };
    warn!(%reason, "Page slots failed, rolling back");

    let mut handles = Vec::new();
    for (cell, _, _) in units {
        ctx.registry.unregister_cell(cell);
        handles.extend(cell.finish());
        ctx.events.emit(SlotEvent::DefineFailed {
            container_id: cell.container_id().clone(),
            reason: reason.clone(),
        });
    }

    if !handles.is_empty()
        && let Err(e) = library.destroy_slots(&handles)
    {
        debug!(error = %e, "Destroy of partial page slots failed");
    }

    let container_id = units
        .first()
        .map(|(cell, _, _)| cell.container_id().clone())
        .unwrap_or_else(|| ContainerId::page_slot("page"));
    Error::define_failed(container_id, reason)
}

// ============================================================================
// Teardown
// ============================================================================

/// Unregisters the set now and queues one destroy for every handle.
///
/// Idempotent; later calls resolve immediately. Destroy errors are
/// swallowed.
pub(crate) fn teardown(ctx: &SlotContext, queue: &CommandQueue, slots: &PageSlots) -> Completion<()> {
    if slots.inner.torn_down.swap(true, Ordering::SeqCst) || slots.is_empty() {
        return Completion::ready(());
    }

    for cell in &slots.inner.cells {
        ctx.registry.unregister_cell(cell);
        cell.begin_destroy();
    }

    debug!(navigation_id = %slots.navigation_id(), "Page slots teardown queued");

    let cells = slots.inner.cells.clone();
    let events = ctx.events.clone();
    queue.when_ready(move |library| {
        let finished: Vec<(&Arc<SlotCell>, Option<SlotHandle>)> =
            cells.iter().map(|cell| (cell, cell.finish())).collect();
        let handles: Vec<SlotHandle> = finished.iter().filter_map(|(_, h)| *h).collect();

        if !handles.is_empty()
            && let Err(e) = library.destroy_slots(&handles)
        {
            debug!(error = %e, "Page slot destroy failed, ignoring");
        }

        for (cell, handle) in finished {
            events.emit(SlotEvent::Destroyed {
                container_id: cell.container_id().clone(),
                handle,
            });
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
