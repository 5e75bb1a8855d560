//! Route transition coordination.
//!
//! The host notifies the [`RouteCoordinator`] of every client-side
//! navigation. Each distinct route gets a fresh [`NavigationId`]; the
//! previous navigation's page slots (and any content slot it left behind)
//! are torn down before the new navigation mounts anything, so slots never
//! outlive their page.
//!
//! # Phases
//!
//! ```text
//! Idle ──navigate──► Mounting(N) ──page slots settled──► Active(N)
//!                        ▲                                   │
//!                        └──── TearingDown(N) ◄──navigate────┘
//! ```
//!
//! `TearingDown(N)` lasts until the queued destroy of navigation N's page
//! slots ran. A page slot set the library rejected counts as settled.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::NavigationId;
use crate::manager::core::ManagerInner;
use crate::transport::Completion;

use super::{PageSlotConfig, PageSlots, content, page};

// ============================================================================
// Constants
// ============================================================================

/// Base used to resolve path-only navigation targets.
const RELATIVE_BASE: &str = "http://localhost/";

// ============================================================================
// NavigationIdentity
// ============================================================================

/// What makes two navigations "the same page": path plus raw query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NavigationIdentity {
    path: String,
    query: String,
}

impl NavigationIdentity {
    /// Creates an identity from a path and a query string (without `?`).
    #[must_use]
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }

    /// Parses an absolute URL or a path-only target such as `/a?b=1`.
    ///
    /// The fragment is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `target` is not a URL.
    pub fn from_url(target: &str) -> Result<Self> {
        let parsed = match Url::parse(target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
                .and_then(|base| base.join(target))
                .map_err(|e| Error::invalid_argument(format!("bad route {target}: {e}")))?,
            Err(e) => {
                return Err(Error::invalid_argument(format!("bad route {target}: {e}")));
            }
        };

        Ok(Self::new(parsed.path(), parsed.query().unwrap_or_default()))
    }

    /// Returns the path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string.
    #[inline]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl fmt::Display for NavigationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            f.write_str(&self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query)
        }
    }
}

// ============================================================================
// RoutePhase
// ============================================================================

/// Where the coordinator is in the current transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutePhase {
    /// No navigation yet, or shut down.
    Idle,
    /// Page slots of navigation N are queued.
    Mounting(NavigationId),
    /// Page slots of navigation N are displayed or were rejected.
    Active(NavigationId),
    /// Page slots of navigation N are queued for destruction.
    TearingDown(NavigationId),
}

/// Chooses the page slots for a route.
pub type PageSlotResolver = Box<dyn Fn(&NavigationIdentity) -> PageSlotConfig + Send + Sync>;

/// Mutable coordinator state, owned by the manager.
#[derive(Debug)]
pub(crate) struct RouteState {
    current: Option<NavigationIdentity>,
    phase: RoutePhase,
    page_slots: Option<PageSlots>,
    retiring: Option<PageSlots>,
}

impl Default for RouteState {
    fn default() -> Self {
        Self {
            current: None,
            phase: RoutePhase::Idle,
            page_slots: None,
            retiring: None,
        }
    }
}

// ============================================================================
// RouteCoordinator
// ============================================================================

/// Tears down and remounts slots on client-side navigation.
///
/// All coordinators of one manager share the same state.
#[derive(Clone)]
pub struct RouteCoordinator {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for RouteCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteCoordinator")
            .field("phase", &self.phase())
            .field("current", &self.current())
            .finish()
    }
}

impl RouteCoordinator {
    pub(crate) fn new(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> RoutePhase {
        let routes = self.inner.routes.lock();
        if let Some(retiring) = &routes.retiring
            && !retiring.is_released()
        {
            return RoutePhase::TearingDown(retiring.navigation_id());
        }

        match routes.phase {
            RoutePhase::Mounting(id)
                if routes.page_slots.as_ref().is_none_or(PageSlots::is_settled) =>
            {
                RoutePhase::Active(id)
            }
            phase => phase,
        }
    }

    /// Returns the identity of the current route.
    #[must_use]
    pub fn current(&self) -> Option<NavigationIdentity> {
        self.inner.routes.lock().current.clone()
    }

    /// Returns the page slots of the current route.
    #[must_use]
    pub fn page_slots(&self) -> Option<PageSlots> {
        self.inner.routes.lock().page_slots.clone()
    }

    /// Returns the current navigation id.
    #[inline]
    #[must_use]
    pub fn navigation_id(&self) -> NavigationId {
        self.inner.navigation_id()
    }

    /// Handles a navigation to `identity`.
    ///
    /// Returns `None` if `identity` is the current route. Otherwise bumps
    /// the navigation id, queues teardown of everything the previous route
    /// left, queues the new route's page slots, and returns the new id.
    /// Every step is queued before this returns, in that order.
    ///
    /// The [`PageSlotResolver`] runs before any coordinator state is locked.
    pub fn navigate(&self, identity: NavigationIdentity) -> Option<NavigationId> {
        if self.inner.routes.lock().current.as_ref() == Some(&identity) {
            debug!(route = %identity, "Same route, navigation ignored");
            return None;
        }
        let config = self.inner.page_slot_config(&identity);

        let mut routes = self.inner.routes.lock();
        if routes.current.as_ref() == Some(&identity) {
            debug!(route = %identity, "Same route, navigation ignored");
            return None;
        }

        let next = self.inner.advance_navigation();

        if let Some(slots) = routes.page_slots.take() {
            let _torn_down = page::teardown(&self.inner.ctx, &self.inner.queue, &slots);
            routes.retiring = Some(slots);
        }

        if routes.current.is_some() && self.inner.config.sweep_stale_slots {
            let stale = self.inner.ctx.registry.take_stale(next);
            if !stale.is_empty() {
                warn!(
                    count = stale.len(),
                    "Content slots outlived their route, destroying"
                );
            }
            for cell in stale {
                let _released = content::release(&self.inner.ctx, &self.inner.queue, cell);
            }
        }

        routes.phase = RoutePhase::Mounting(next);
        match page::mount(&self.inner.ctx, &self.inner.queue, &config, next) {
            Ok(slots) => routes.page_slots = Some(slots),
            Err(e) => warn!(error = %e, navigation_id = %next, "Page slots not mounted"),
        }

        info!(route = %identity, navigation_id = %next, "Navigated");
        routes.current = Some(identity);
        Some(next)
    }

    /// Parses `target` and navigates to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `target` is not a URL.
    pub fn navigate_url(&self, target: &str) -> Result<Option<NavigationId>> {
        Ok(self.navigate(NavigationIdentity::from_url(target)?))
    }

    /// Tears down the current route's page slots and returns to idle.
    pub fn shutdown(&self) -> Completion<()> {
        let mut routes = self.inner.routes.lock();
        routes.current = None;
        routes.phase = RoutePhase::Idle;
        routes.retiring = None;

        match routes.page_slots.take() {
            Some(slots) => page::teardown(&self.inner.ctx, &self.inner.queue, &slots),
            None => Completion::ready(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::{ContainerId, SlotHandle, UnitPath};
    use crate::manager::AdManager;
    use crate::protocol::TagCommand;
    use crate::slots::SlotConfig;
    use crate::transport::fake::FakeLibrary;

    fn page_config() -> PageSlotConfig {
        PageSlotConfig::new()
            .with_interstitial(UnitPath::new("/net/site/interstitial").unwrap())
            .with_anchor(
                UnitPath::new("/net/site/anchor").unwrap(),
                Default::default(),
            )
    }

    fn manager(library: &Arc<FakeLibrary>) -> AdManager {
        AdManager::builder()
            .library(library.clone())
            .page_slots(page_config())
            .build()
            .unwrap()
    }

    fn route(path: &str) -> NavigationIdentity {
        NavigationIdentity::new(path, "")
    }

    #[test]
    fn test_identity_from_url() {
        let absolute = NavigationIdentity::from_url("https://site.test/a/b?x=1#top").unwrap();
        assert_eq!(absolute.path(), "/a/b");
        assert_eq!(absolute.query(), "x=1");

        let relative = NavigationIdentity::from_url("/a/b?x=1").unwrap();
        assert_eq!(relative, absolute);
        assert_eq!(relative.to_string(), "/a/b?x=1");

        assert!(NavigationIdentity::from_url("http://[::1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_route_is_ignored() {
        let library = FakeLibrary::ready();
        let manager = manager(&library);
        let routes = manager.routes();

        assert_eq!(routes.phase(), RoutePhase::Idle);
        let first = routes.navigate(route("/a")).unwrap();
        assert_eq!(routes.navigate(route("/a")), None);
        manager.settled().await.unwrap();

        assert_eq!(first, NavigationId::from(1));
        assert_eq!(library.count("googletag.defineOutOfPageSlot"), 2);
        assert_eq!(routes.phase(), RoutePhase::Active(first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_change_is_a_new_route() {
        let library = FakeLibrary::ready();
        let manager = manager(&library);
        let routes = manager.routes();

        routes.navigate_url("/a?page=1").unwrap().unwrap();
        let second = routes.navigate_url("/a?page=2").unwrap().unwrap();
        manager.settled().await.unwrap();

        assert_eq!(second, NavigationId::from(2));
        assert_eq!(library.count("googletag.destroySlots"), 1);
        assert_eq!(library.count("googletag.defineOutOfPageSlot"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_navigation_tears_down_each_route_in_order() {
        let library = FakeLibrary::not_ready();
        let manager = manager(&library);
        let routes = manager.routes();

        routes.navigate(route("/a"));
        routes.navigate(route("/b"));
        let last = routes.navigate(route("/c")).unwrap();
        assert_eq!(routes.phase(), RoutePhase::TearingDown(NavigationId::from(2)));
        assert_eq!(manager.registry().len(), 2);

        library.set_ready(true);
        manager.settled().await.unwrap();
        assert_eq!(routes.phase(), RoutePhase::Active(last));

        let methods: Vec<&str> = library
            .methods()
            .into_iter()
            .filter(|m| *m == "googletag.defineOutOfPageSlot" || *m == "googletag.destroySlots")
            .collect();
        assert_eq!(
            methods,
            vec![
                "googletag.defineOutOfPageSlot",
                "googletag.defineOutOfPageSlot",
                "googletag.destroySlots",
                "googletag.defineOutOfPageSlot",
                "googletag.defineOutOfPageSlot",
                "googletag.destroySlots",
                "googletag.defineOutOfPageSlot",
                "googletag.defineOutOfPageSlot",
            ]
        );

        let live = routes.page_slots().unwrap();
        assert_eq!(live.navigation_id(), last);
        assert_eq!(library.destroyed().len(), 4);
        assert!(live.handles().iter().all(|h| !library.destroyed().contains(h)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_content_slots_are_swept() {
        let library = FakeLibrary::ready();
        let manager = manager(&library);
        let routes = manager.routes();

        routes.navigate(route("/a"));
        let container_id = ContainerId::new("article-top").unwrap();
        let config = SlotConfig::new(container_id.clone(), UnitPath::new("/net/site/top").unwrap());
        let handle: SlotHandle = manager
            .slot(container_id.clone())
            .mount(config)
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        routes.navigate(route("/b"));
        assert!(!manager.registry().contains(&container_id));
        manager.settled().await.unwrap();

        assert!(library.destroyed().contains(&handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_tears_down_page_slots() {
        let library = FakeLibrary::ready();
        let manager = manager(&library);
        let routes = manager.routes();

        routes.navigate(route("/a"));
        routes.shutdown().await.unwrap();

        assert_eq!(routes.phase(), RoutePhase::Idle);
        assert!(routes.current().is_none());
        assert!(manager.registry().is_empty());
        let destroy_calls = library
            .commands()
            .into_iter()
            .filter(|c| matches!(c, TagCommand::DestroySlots { handles } if handles.len() == 2))
            .count();
        assert_eq!(destroy_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_page_slots_still_activate_route() {
        let library = FakeLibrary::ready();
        library.decline_path("/net/site/anchor");
        let manager = manager(&library);
        let routes = manager.routes();

        let first = routes.navigate(route("/a")).unwrap();
        assert_eq!(routes.phase(), RoutePhase::Mounting(first));
        manager.settled().await.unwrap();

        assert_eq!(routes.phase(), RoutePhase::Active(first));
        assert!(routes.page_slots().unwrap().is_failed());
        assert!(manager.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_may_read_route_state() {
        let library = FakeLibrary::ready();
        let handle: Arc<std::sync::OnceLock<AdManager>> = Arc::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let resolver_handle = Arc::clone(&handle);
        let resolver_seen = Arc::clone(&seen);
        let manager = AdManager::builder()
            .library(library.clone())
            .page_slot_resolver(move |_: &NavigationIdentity| {
                if let Some(manager) = resolver_handle.get() {
                    let previous = manager.routes().current().map(|r| r.to_string());
                    resolver_seen.lock().push(previous);
                }
                page_config()
            })
            .build()
            .unwrap();
        handle.set(manager.clone()).unwrap();
        let routes = manager.routes();

        routes.navigate(route("/a"));
        routes.navigate(route("/b"));
        manager.settled().await.unwrap();

        assert_eq!(*seen.lock(), vec![None, Some("/a".to_string())]);
        assert_eq!(routes.current().unwrap().path(), "/b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_picks_page_slots_per_route() {
        let library = FakeLibrary::ready();
        let manager = AdManager::builder()
            .library(library.clone())
            .page_slot_resolver(|identity: &NavigationIdentity| {
                if identity.path().starts_with("/checkout") {
                    PageSlotConfig::new()
                } else {
                    page_config()
                }
            })
            .build()
            .unwrap();
        let routes = manager.routes();

        routes.navigate(route("/checkout"));
        manager.settled().await.unwrap();
        assert_eq!(library.count("googletag.defineOutOfPageSlot"), 0);

        routes.navigate(route("/home"));
        manager.settled().await.unwrap();
        assert_eq!(library.count("googletag.defineOutOfPageSlot"), 2);
    }
}
