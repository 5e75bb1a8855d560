//! Container-bound slot lifecycle.
//!
//! A [`SlotController`] drives one container through
//! mount → define → display → (refresh) → destroy. It never blocks the
//! caller: every library call is queued through the readiness gate, and
//! registry reservations happen synchronously so repeated mounts of the
//! same container are detected before anything is queued.
//!
//! # Example
//!
//! ```ignore
//! let slot = manager.slot(ContainerId::new("home-top")?);
//! let defined = slot.mount(config)?;
//!
//! // Later, when the container goes away.
//! if let Some(done) = slot.unmount() {
//!     done.await?;
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ContainerId, SlotHandle};
use crate::manager::core::ManagerInner;
use crate::protocol::{DisplayTarget, SizeMapping};
use crate::transport::{CommandQueue, Completion, TagLibrary};

use super::{ContainerView, SlotCell, SlotConfig, SlotContext, SlotEvent, SlotKind, SlotState};

// ============================================================================
// SlotController
// ============================================================================

/// Lifecycle controller for one container.
///
/// Controllers are cheap handles; the slot itself lives in the registry.
/// Two controllers for the same container id observe the same slot.
#[derive(Clone)]
pub struct SlotController {
    container_id: ContainerId,
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for SlotController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotController")
            .field("container_id", &self.container_id)
            .field("state", &self.state())
            .finish()
    }
}

impl SlotController {
    pub(crate) fn new(container_id: ContainerId, inner: Arc<ManagerInner>) -> Self {
        Self {
            container_id,
            inner,
        }
    }

    /// Returns the container id.
    #[inline]
    #[must_use]
    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Returns the slot's current state.
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.inner
            .ctx
            .registry
            .cell(&self.container_id)
            .map_or(SlotState::Unmounted, |cell| cell.state())
    }

    /// Returns the library handle, once the definition ran.
    #[must_use]
    pub fn handle(&self) -> Option<SlotHandle> {
        self.inner
            .ctx
            .registry
            .cell(&self.container_id)
            .and_then(|cell| cell.handle())
    }

    /// Returns `true` if a slot is registered for this container.
    #[inline]
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.ctx.registry.contains(&self.container_id)
    }
}

// ============================================================================
// SlotController - Mount
// ============================================================================

impl SlotController {
    /// Registers the container and queues define → display.
    ///
    /// Returns as soon as the work is queued. The completion resolves to
    /// the new handle once the library ran the definition, or to
    /// [`Error::DefineFailed`] if it could not.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `config` is for another container or
    ///   fails validation
    /// - [`Error::ContainerNotFound`] if the host has no such container
    /// - [`Error::DuplicateMount`] if the container already has a slot
    /// - [`Error::QueueClosed`] if the manager was shut down
    pub fn mount(&self, config: SlotConfig) -> Result<Completion<Result<SlotHandle>>> {
        if config.container_id != self.container_id {
            return Err(Error::invalid_argument(format!(
                "config for {} passed to controller for {}",
                config.container_id, self.container_id
            )));
        }
        config.validate()?;
        if self.inner.queue.is_closed() {
            return Err(Error::QueueClosed);
        }

        let ctx = &self.inner.ctx;
        if !ctx.host.container_exists(&self.container_id) {
            debug!(container_id = %self.container_id, "Container not present, mount skipped");
            return Err(Error::container_not_found(self.container_id.clone()));
        }

        let navigation_id = self.inner.navigation_id();
        let Some(cell) = ctx
            .registry
            .register(&self.container_id, SlotKind::Content, navigation_id)
        else {
            warn!(container_id = %self.container_id, "Slot already registered, skipping mount");
            return Err(Error::duplicate_mount(self.container_id.clone()));
        };

        if let Some(min_height) = config.min_height {
            ctx.host.reserve_height(&self.container_id, min_height);
        }
        ctx.host.set_view(&self.container_id, ContainerView::Loading);

        let size_mapping = config
            .size_mapping
            .as_ref()
            .and_then(|name| self.inner.size_mapping(name));
        let plan = MountPlan {
            config,
            size_mapping,
            refresh_after_display: self.inner.refreshes_after_display(),
        };

        debug!(
            container_id = %self.container_id,
            unit_path = %plan.config.unit_path,
            %navigation_id,
            "Slot definition queued"
        );

        let ctx = ctx.clone();
        Ok(self
            .inner
            .queue
            .when_ready(move |library| define_and_display(library, &ctx, &cell, plan)))
    }
}

// ============================================================================
// SlotController - Refresh / Unmount
// ============================================================================

impl SlotController {
    /// Queues a refresh of a displayed slot.
    ///
    /// Returns `None` (and does nothing) unless the slot is
    /// [`SlotState::Displayed`].
    pub fn refresh(&self) -> Option<Completion<()>> {
        let cell = self.inner.ctx.registry.cell(&self.container_id)?;
        let handle = cell.handle()?;

        if !cell.transition(SlotState::Displayed, SlotState::Refreshing) {
            trace!(container_id = %self.container_id, state = ?cell.state(), "Refresh ignored");
            return None;
        }

        let events = self.inner.ctx.events.clone();
        Some(self.inner.queue.when_ready(move |library| {
            if cell.state() != SlotState::Refreshing {
                return;
            }

            match library.refresh(&[handle]) {
                Ok(()) => events.emit(SlotEvent::Refreshed {
                    container_id: cell.container_id().clone(),
                    handle,
                }),
                Err(e) => {
                    debug!(container_id = %cell.container_id(), error = %e, "Refresh rejected");
                }
            }
            cell.transition(SlotState::Refreshing, SlotState::Displayed);
        }))
    }

    /// Unregisters the slot, clears the container and queues the destroy.
    ///
    /// Returns `None` if nothing was mounted. The registry entry is gone
    /// when this returns, whatever the library later does with the destroy.
    pub fn unmount(&self) -> Option<Completion<()>> {
        let Some(cell) = self.inner.ctx.registry.unregister(&self.container_id) else {
            trace!(container_id = %self.container_id, "Unmount of unmounted slot ignored");
            return None;
        };

        debug!(container_id = %self.container_id, state = ?cell.state(), "Unmounting slot");
        Some(release(&self.inner.ctx, &self.inner.queue, cell))
    }
}

// ============================================================================
// Queued Operations
// ============================================================================

/// Everything the queued definition needs, resolved at mount time.
struct MountPlan {
    config: SlotConfig,
    size_mapping: Option<Arc<SizeMapping>>,
    refresh_after_display: bool,
}

/// Tears down an already unregistered content cell.
///
/// Clears the container now and queues the destroy behind whatever is
/// already queued for the slot.
pub(crate) fn release(ctx: &SlotContext, queue: &CommandQueue, cell: Arc<SlotCell>) -> Completion<()> {
    cell.begin_destroy();
    ctx.host.clear_container(cell.container_id());
    ctx.host.set_view(cell.container_id(), ContainerView::Placeholder);

    let events = ctx.events.clone();
    queue.when_ready(move |library| {
        let handle = cell.finish();
        if let Some(handle) = handle {
            if let Err(e) = library.destroy_slots(&[handle]) {
                debug!(container_id = %cell.container_id(), error = %e, "Destroy failed, ignoring");
            }
        }
        events.emit(SlotEvent::Destroyed {
            container_id: cell.container_id().clone(),
            handle,
        });
    })
}

/// Defines, configures and displays one slot.
fn define_and_display(
    library: &dyn TagLibrary,
    ctx: &SlotContext,
    cell: &Arc<SlotCell>,
    plan: MountPlan,
) -> Result<SlotHandle> {
    let container_id = cell.container_id();

    if cell.state() != SlotState::Defining {
        debug!(%container_id, "Slot unmounted before the library was ready");
        return Err(Error::define_failed(
            container_id.clone(),
            "unmounted before definition",
        ));
    }

    let config = &plan.config;
    let handle = match library.define_slot(&config.unit_path, &config.sizes, container_id) {
        Ok(handle) => handle,
        Err(e) => return Err(abandon(library, ctx, cell, e)),
    };
    cell.attach(handle);
    ctx.events.emit(SlotEvent::Defined {
        container_id: container_id.clone(),
        handle,
    });

    if let Some(mapping) = &plan.size_mapping
        && let Err(e) = library.define_size_mapping(handle, mapping)
    {
        debug!(%container_id, error = %e, "Size mapping rejected");
    }

    for (key, values) in config.targeting.pairs() {
        if let Err(e) = library.set_slot_targeting(handle, key, values) {
            debug!(%container_id, key, error = %e, "Slot targeting rejected");
        }
    }

    if let Err(e) = library.add_service(handle) {
        return Err(abandon(library, ctx, cell, e));
    }

    if !cell.mark_displayed() {
        return Ok(handle);
    }

    if let Err(e) = library.display(DisplayTarget::Container(container_id.clone())) {
        return Err(abandon(library, ctx, cell, e));
    }
    ctx.events.emit(SlotEvent::Displayed {
        container_id: container_id.clone(),
        handle,
    });

    if cell.state() == SlotState::Displayed {
        ctx.host.set_view(container_id, ContainerView::Requested);
    }

    if plan.refresh_after_display {
        match library.refresh(&[handle]) {
            Ok(()) => ctx.events.emit(SlotEvent::Refreshed {
                container_id: container_id.clone(),
                handle,
            }),
            Err(e) => debug!(%container_id, error = %e, "Initial refresh rejected"),
        }
    }

    info!(%container_id, %handle, unit_path = %config.unit_path, "Slot displayed");
    Ok(handle)
}

/// Rolls back a failed definition and leaves the container neutral.
fn abandon(library: &dyn TagLibrary, ctx: &SlotContext, cell: &Arc<SlotCell>, error: Error) -> Error {
    let container_id = cell.container_id().clone();
    let reason = match error {
        Error::DefineFailed { reason, .. } => reason,
        other => other.to_string(),
    };
    warn!(%container_id, %reason, "Slot definition failed");

    let still_registered = ctx.registry.unregister_cell(cell);
    if let Some(handle) = cell.finish()
        && let Err(e) = library.destroy_slots(&[handle])
    {
        debug!(%container_id, error = %e, "Destroy of partial slot failed");
    }
    if still_registered {
        ctx.host.set_view(&container_id, ContainerView::Unavailable);
    }

    ctx.events.emit(SlotEvent::DefineFailed {
        container_id: container_id.clone(),
        reason: reason.clone(),
    });
    Error::define_failed(container_id, reason)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::sleep;

    use crate::identifiers::{SizeMappingRef, UnitPath};
    use crate::manager::AdManager;
    use crate::protocol::{SlotSize, TagCommand};
    use crate::slots::host::recording::RecordingHost;
    use crate::transport::fake::FakeLibrary;

    fn id(value: &str) -> ContainerId {
        ContainerId::new(value).unwrap()
    }

    fn config(container: &str) -> SlotConfig {
        SlotConfig::new(id(container), UnitPath::new("/net/site/unit").unwrap())
    }

    fn manager(library: &Arc<FakeLibrary>, host: &Arc<RecordingHost>) -> AdManager {
        AdManager::builder()
            .library(library.clone())
            .host(host.clone())
            .refresh_after_display(false)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_waits_for_library_then_displays_once() {
        let library = FakeLibrary::not_ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let defined = slot.mount(config("X")).unwrap();
        assert_eq!(slot.state(), SlotState::Defining);
        assert_eq!(host.view(&id("X")), Some(ContainerView::Loading));

        sleep(Duration::from_millis(500)).await;
        assert!(library.commands().is_empty());

        library.set_ready(true);
        let handle = defined.await.unwrap().unwrap();

        assert_eq!(
            library.methods(),
            vec!["googletag.defineSlot", "slot.addService", "googletag.display"]
        );
        assert_eq!(slot.state(), SlotState::Displayed);
        assert_eq!(slot.handle(), Some(handle));
        assert_eq!(host.view(&id("X")), Some(ContainerView::Requested));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_mount_is_rejected() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let first = slot.mount(config("X")).unwrap();
        let second = slot.mount(config("X"));
        assert!(matches!(second, Err(Error::DuplicateMount { .. })));

        first.await.unwrap().unwrap();
        assert_eq!(library.count("googletag.defineSlot"), 1);
        assert_eq!(library.count("googletag.display"), 1);
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_of_unknown_container_is_noop() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);

        assert!(manager.slot(id("never")).unmount().is_none());
        manager.settled().await.unwrap();

        assert!(library.commands().is_empty());
        assert!(host.cleared().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_library_keeps_container_neutral() {
        let library = FakeLibrary::not_ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let config = config("X").with_sizes([
            SlotSize::Fixed(300, 250),
            SlotSize::Fixed(336, 280),
            SlotSize::Fluid,
        ]);
        let _defined = slot.mount(config).unwrap();
        sleep(Duration::from_secs(600)).await;

        assert!(library.commands().is_empty());
        assert_eq!(slot.state(), SlotState::Defining);
        assert_eq!(host.view(&id("X")), Some(ContainerView::Loading));
        assert_eq!(manager.pending_operations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_container_is_not_registered() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        host.remove_container(&id("X"));
        let manager = manager(&library, &host);

        let result = manager.slot(id("X")).mount(config("X"));

        assert!(matches!(result, Err(Error::ContainerNotFound { .. })));
        assert!(manager.registry().is_empty());
        assert!(library.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_config_is_rejected() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);

        let result = manager.slot(id("X")).mount(config("Y"));
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_definition_leaves_container_unavailable() {
        let library = FakeLibrary::ready();
        library.decline_path("/net/site/unit");
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let result = slot.mount(config("X")).unwrap().await.unwrap();

        assert!(matches!(result, Err(Error::DefineFailed { .. })));
        assert!(!slot.is_mounted());
        assert_eq!(host.view(&id("X")), Some(ContainerView::Unavailable));
        assert_eq!(library.count("googletag.display"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_display_destroys_partial_slot() {
        let library = FakeLibrary::ready();
        library.fail_method("googletag.display");
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let result = slot.mount(config("X")).unwrap().await.unwrap();

        assert!(result.is_err());
        assert!(!slot.is_mounted());
        assert_eq!(library.destroyed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_survives_failing_destroy() {
        let library = FakeLibrary::ready();
        library.fail_method("googletag.destroySlots");
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let handle = slot.mount(config("X")).unwrap().await.unwrap().unwrap();
        let done = slot.unmount().expect("slot was mounted");

        assert!(!slot.is_mounted());
        assert_eq!(slot.state(), SlotState::Unmounted);
        assert_eq!(host.cleared(), vec![id("X")]);
        assert_eq!(host.view(&id("X")), Some(ContainerView::Placeholder));

        done.await.unwrap();
        assert_eq!(library.destroyed(), vec![handle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_before_ready_issues_nothing() {
        let library = FakeLibrary::not_ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let defined = slot.mount(config("X")).unwrap();
        let destroyed = slot.unmount().unwrap();
        assert!(slot.unmount().is_none());

        library.set_ready(true);
        assert!(defined.await.unwrap().is_err());
        destroyed.await.unwrap();

        assert!(library.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_after_unmount() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        let first = slot.mount(config("X")).unwrap().await.unwrap().unwrap();
        slot.unmount().unwrap().await.unwrap();
        let second = slot.mount(config("X")).unwrap().await.unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(library.count("googletag.defineSlot"), 2);
        assert_eq!(library.destroyed(), vec![first]);
        assert_eq!(slot.handle(), Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_only_from_displayed() {
        let library = FakeLibrary::not_ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let slot = manager.slot(id("X"));

        assert!(slot.refresh().is_none());

        let defined = slot.mount(config("X")).unwrap();
        assert!(slot.refresh().is_none());

        library.set_ready(true);
        defined.await.unwrap().unwrap();

        let refreshed = slot.refresh().expect("displayed slot refreshes");
        assert_eq!(slot.state(), SlotState::Refreshing);
        assert!(slot.refresh().is_none());

        refreshed.await.unwrap();
        assert_eq!(slot.state(), SlotState::Displayed);
        assert_eq!(library.count("pubads.refresh"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_height_and_targeting() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);

        let config = config("X")
            .with_min_height(280)
            .with_targeting("section", "home");
        manager.slot(id("X")).mount(config).unwrap().await.unwrap().unwrap();

        assert_eq!(host.height(&id("X")), Some(280));
        let targeting = library
            .commands()
            .into_iter()
            .find_map(|c| match c {
                TagCommand::SetSlotTargeting { key, values, .. } => Some((key, values)),
                _ => None,
            })
            .unwrap();
        assert_eq!(targeting, ("section".to_string(), vec!["home".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_named_size_mapping_is_attached() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        manager.bootstrap("https://site.test/").unwrap();

        let config = config("X").with_size_mapping(SizeMappingRef::rect());
        manager.slot(id("X")).mount(config).unwrap().await.unwrap().unwrap();

        let config = self::config("Y").with_size_mapping(SizeMappingRef::new("missing"));
        manager.slot(id("Y")).mount(config).unwrap().await.unwrap().unwrap();

        assert_eq!(library.count("slot.defineSizeMapping"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_display_in_single_request_mode() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = AdManager::builder()
            .library(library.clone())
            .host(host.clone())
            .build()
            .unwrap();

        manager.slot(id("X")).mount(config("X")).unwrap().await.unwrap().unwrap();

        assert_eq!(
            library.methods(),
            vec![
                "googletag.defineSlot",
                "slot.addService",
                "googletag.display",
                "pubads.refresh"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_lifecycle() {
        let library = FakeLibrary::ready();
        let host = Arc::new(RecordingHost::default());
        let manager = manager(&library, &host);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        manager.set_event_handler(Box::new(move |event| {
            seen_clone.lock().push(event.name());
        }));

        let slot = manager.slot(id("X"));
        slot.mount(config("X")).unwrap().await.unwrap().unwrap();
        slot.unmount().unwrap().await.unwrap();

        assert_eq!(*seen.lock(), vec!["defined", "displayed", "destroyed"]);
    }
}
