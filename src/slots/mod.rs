//! Slot lifecycle.
//!
//! Everything that decides *when* a slot is defined, displayed, refreshed or
//! destroyed lives here. The library calls themselves go through the
//! [`transport`](crate::transport) queue.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | One live slot per container id |
//! | `content` | Container-bound slot controller |
//! | `page` | Interstitial and anchor, as one unit |
//! | `navigation` | Teardown and remount on route change |
//! | `config` | Per-placement configuration |
//! | `host` | Page-side boundary |
//! | `events` | Lifecycle notifications |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

// ============================================================================
// Submodules
// ============================================================================

/// Per-placement configuration.
pub mod config;

/// Container-bound slot controller.
pub mod content;

/// Lifecycle notifications.
pub mod events;

/// Page-side boundary.
pub mod host;

/// Route transition coordination.
pub mod navigation;

/// Page-level slots.
pub mod page;

/// Live slot registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{AnchorPosition, PageSlotConfig, SlotConfig};
pub use content::SlotController;
pub use events::{EventHandler, SlotEvent};
pub use host::{ContainerView, DetachedHost, PageHost};
pub use navigation::{NavigationIdentity, PageSlotResolver, RouteCoordinator, RoutePhase};
pub use page::PageSlots;
pub use registry::{RegistryEntry, SlotCell, SlotKind, SlotRegistry, SlotState};

pub(crate) use events::EventSink;

// ============================================================================
// SlotContext
// ============================================================================

/// What queued slot operations touch besides the library.
///
/// Queued closures capture this, so it must never hold a queue sender.
#[derive(Clone)]
pub(crate) struct SlotContext {
    pub(crate) registry: Arc<SlotRegistry>,
    pub(crate) host: Arc<dyn PageHost>,
    pub(crate) events: EventSink,
}

impl fmt::Debug for SlotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotContext")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
