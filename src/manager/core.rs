//! Ad manager coordinator.
//!
//! The [`AdManager`] owns everything that is page-wide: the command queue in
//! front of the tag library, the slot registry, the bootstrap-once state and
//! the current navigation. Slot controllers and the route coordinator are
//! cheap handles onto it.
//!
//! # Example
//!
//! ```ignore
//! let manager = AdManager::builder()
//!     .library(library)
//!     .host(host)
//!     .build()?;
//!
//! manager.bootstrap("https://site.test/?utm_source=news")?;
//! manager.routes().navigate_url("/")?;
//! manager.slot(ContainerId::new("home-top")?).mount(config)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ContainerId, NavigationId, SizeMappingRef};
use crate::protocol::SizeMapping;
use crate::slots::navigation::RouteState;
use crate::slots::{
    EventHandler, EventSink, NavigationIdentity, PageHost, PageSlotConfig, PageSlotResolver,
    PageSlots, RouteCoordinator, SlotContext, SlotController, SlotKind, SlotRegistry, content,
    page,
};
use crate::transport::{CommandQueue, Completion, TagLibrary};

use super::bootstrap::{self, PageGlobals};
use super::builder::AdManagerBuilder;
use super::config::ManagerConfig;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the manager.
pub(crate) struct ManagerInner {
    /// Page-wide settings.
    pub config: ManagerConfig,

    /// Readiness-gated queue in front of the library.
    pub queue: CommandQueue,

    /// Registry, host and event sink shared with queued ops.
    pub ctx: SlotContext,

    /// Set once by bootstrap.
    pub globals: OnceLock<Arc<PageGlobals>>,

    /// Current navigation id.
    pub navigation: AtomicU64,

    /// Route coordinator state.
    pub routes: Mutex<RouteState>,

    /// Page slot sets mounted directly through the manager.
    pub page_slots: Mutex<Vec<PageSlots>>,

    /// Optional per-route page slot choice.
    pub resolver: Option<PageSlotResolver>,
}

impl ManagerInner {
    /// Returns the current navigation id.
    #[inline]
    pub(crate) fn navigation_id(&self) -> NavigationId {
        NavigationId::from(self.navigation.load(Ordering::SeqCst))
    }

    /// Moves to the next navigation id and returns it.
    pub(crate) fn advance_navigation(&self) -> NavigationId {
        NavigationId::from(self.navigation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Resolves a named size mapping, logging unknown names.
    pub(crate) fn size_mapping(&self, name: &SizeMappingRef) -> Option<Arc<SizeMapping>> {
        let Some(globals) = self.globals.get() else {
            warn!(size_mapping = %name, "Size mapping requested before bootstrap, ignoring");
            return None;
        };

        let mapping = globals.size_mapping(name);
        if mapping.is_none() {
            warn!(size_mapping = %name, "Unknown size mapping, ignoring");
        }
        mapping
    }

    /// Returns `true` if displays are followed by a batched refresh.
    #[inline]
    pub(crate) fn refreshes_after_display(&self) -> bool {
        self.config.refreshes_after_display()
    }

    /// Chooses the page slots for a route.
    pub(crate) fn page_slot_config(&self, identity: &NavigationIdentity) -> PageSlotConfig {
        match &self.resolver {
            Some(resolver) => resolver(identity),
            None => self.config.page_slots.clone(),
        }
    }
}

// ============================================================================
// AdManager
// ============================================================================

/// Page-wide ad slot manager.
///
/// Cloning is cheap; clones share the same state. Every mutating call
/// returns immediately and queues its library work; the returned
/// [`Completion`] can be awaited or dropped.
#[derive(Clone)]
pub struct AdManager {
    pub(crate) inner: Arc<ManagerInner>,
}

// ============================================================================
// AdManager - Display
// ============================================================================

impl fmt::Debug for AdManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdManager")
            .field("navigation_id", &self.navigation_id())
            .field("slot_count", &self.inner.ctx.registry.len())
            .field("bootstrapped", &self.is_bootstrapped())
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AdManager - Construction
// ============================================================================

impl AdManager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> AdManagerBuilder {
        AdManagerBuilder::new()
    }

    /// Creates the manager and spawns its queue.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(
        library: Arc<dyn TagLibrary>,
        host: Arc<dyn PageHost>,
        config: ManagerConfig,
        resolver: Option<PageSlotResolver>,
    ) -> Self {
        let queue = CommandQueue::new(library, config.poll_interval());
        let ctx = SlotContext {
            registry: Arc::new(SlotRegistry::new()),
            host,
            events: EventSink::default(),
        };

        debug!(
            poll_interval_ms = config.poll_interval_ms,
            single_request = config.single_request,
            "Ad manager created"
        );

        Self {
            inner: Arc::new(ManagerInner {
                config,
                queue,
                ctx,
                globals: OnceLock::new(),
                navigation: AtomicU64::new(NavigationId::INITIAL.as_u64()),
                routes: Mutex::new(RouteState::default()),
                page_slots: Mutex::new(Vec::new()),
                resolver,
            }),
        }
    }
}

// ============================================================================
// AdManager - Bootstrap
// ============================================================================

impl AdManager {
    /// Configures the library for this page, once.
    ///
    /// The first call reads targeting from `page_url`, freezes the size
    /// mapping table and queues the global configuration. Later calls return
    /// `Ok(None)` and do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `page_url` is not a URL.
    pub fn bootstrap(&self, page_url: &str) -> Result<Option<Completion<Result<()>>>> {
        let url = bootstrap::parse_page_url(page_url)?;

        let mut created = false;
        let globals = self.inner.globals.get_or_init(|| {
            created = true;
            Arc::new(PageGlobals::build(&self.inner.config, &url))
        });

        if !created {
            debug!("Already bootstrapped, ignoring");
            return Ok(None);
        }

        info!(page = %url, targeting = globals.targeting().len(), "Bootstrapping tag library");

        let globals = Arc::clone(globals);
        let config = self.inner.config.clone();
        Ok(Some(self.inner.queue.when_ready(move |library| {
            bootstrap::configure(library, &globals, &config)
        })))
    }

    /// Returns `true` once bootstrap ran.
    #[inline]
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.inner.globals.get().is_some()
    }

    /// Returns the page globals, once bootstrapped.
    #[must_use]
    pub fn globals(&self) -> Option<Arc<PageGlobals>> {
        self.inner.globals.get().cloned()
    }
}

// ============================================================================
// AdManager - Slots
// ============================================================================

impl AdManager {
    /// Returns the controller for a container.
    #[inline]
    #[must_use]
    pub fn slot(&self, container_id: ContainerId) -> SlotController {
        SlotController::new(container_id, Arc::clone(&self.inner))
    }

    /// Mounts interstitial and anchor for the current navigation.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateMount`] if page slots are already mounted
    /// - [`Error::QueueClosed`] after [`shutdown`](Self::shutdown)
    pub fn mount_page_slots(&self, config: &PageSlotConfig) -> Result<PageSlots> {
        let slots = page::mount(
            &self.inner.ctx,
            &self.inner.queue,
            config,
            self.inner.navigation_id(),
        )?;

        if !slots.is_empty() {
            let mut mounted = self.inner.page_slots.lock();
            mounted.retain(|set| !set.is_torn_down());
            mounted.push(slots.clone());
        }
        Ok(slots)
    }

    /// Tears down page slots. Idempotent; destroy errors are swallowed.
    pub fn unmount_page_slots(&self, slots: &PageSlots) -> Completion<()> {
        page::teardown(&self.inner.ctx, &self.inner.queue, slots)
    }

    /// Returns the route coordinator.
    #[inline]
    #[must_use]
    pub fn routes(&self) -> RouteCoordinator {
        RouteCoordinator::new(Arc::clone(&self.inner))
    }

    /// Returns the current navigation id.
    #[inline]
    #[must_use]
    pub fn navigation_id(&self) -> NavigationId {
        self.inner.navigation_id()
    }

    /// Returns the registry, read-only.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SlotRegistry {
        &self.inner.ctx.registry
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }
}

// ============================================================================
// AdManager - Events
// ============================================================================

impl AdManager {
    /// Installs the lifecycle event handler, replacing any previous one.
    pub fn set_event_handler(&self, handler: EventHandler) {
        self.inner.ctx.events.set(handler);
    }

    /// Removes the lifecycle event handler.
    pub fn clear_event_handler(&self) {
        self.inner.ctx.events.clear();
    }
}

// ============================================================================
// AdManager - Queue
// ============================================================================

impl AdManager {
    /// Returns `true` once the library has reported ready.
    #[inline]
    #[must_use]
    pub fn is_library_ready(&self) -> bool {
        self.inner.queue.is_ready()
    }

    /// Returns the number of queued library operations not yet run.
    #[inline]
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.inner.queue.pending_count()
    }

    /// Resolves once everything queued before this call has run.
    pub fn settled(&self) -> Completion<()> {
        self.inner.queue.when_ready(|_| ())
    }

    /// Waits up to `limit` for the library and the current backlog.
    ///
    /// Nothing is queued until the library is ready, so a host may poll
    /// this while the library is missing.
    ///
    /// # Errors
    ///
    /// - [`Error::LibraryUnavailable`] if the library did not load in time;
    ///   queued work stays queued
    /// - [`Error::QueueClosed`] if the manager shut down first
    pub async fn wait_for_library(&self, limit: Duration) -> Result<()> {
        let waited = tokio::time::timeout(limit, async {
            self.inner.queue.ready().await?;
            self.settled().await
        })
        .await;

        match waited {
            Ok(settled) => settled,
            Err(_) => Err(Error::LibraryUnavailable),
        }
    }

    /// Tears everything down and stops the queue.
    ///
    /// Page slots and every registered content slot are destroyed; the
    /// returned completion resolves once the destroys ran. If the library
    /// never loaded, nothing is issued and the completion errors.
    pub fn shutdown(&self) -> Completion<()> {
        let _page = self.routes().shutdown();

        let mounted = std::mem::take(&mut *self.inner.page_slots.lock());
        for slots in &mounted {
            let _page = page::teardown(&self.inner.ctx, &self.inner.queue, slots);
        }

        let cells = self.inner.ctx.registry.drain();
        info!(count = cells.len(), "Shutting down ad manager");

        let (content_cells, page_cells): (Vec<_>, Vec<_>) = cells
            .into_iter()
            .partition(|cell| cell.kind() == SlotKind::Content);

        for cell in content_cells {
            let _released = content::release(&self.inner.ctx, &self.inner.queue, cell);
        }

        if !page_cells.is_empty() {
            warn!(count = page_cells.len(), "Untracked page slots at shutdown");
            for cell in &page_cells {
                cell.begin_destroy();
            }
            let _released = self.inner.queue.when_ready(move |library| {
                let handles: Vec<_> = page_cells.iter().filter_map(|cell| cell.finish()).collect();
                if !handles.is_empty()
                    && let Err(e) = library.destroy_slots(&handles)
                {
                    debug!(error = %e, "Destroy during shutdown failed, ignoring");
                }
            });
        }

        let done = self.settled();
        self.inner.queue.shutdown();
        done
    }
}

// ============================================================================
// Tests
// ============================================================================
