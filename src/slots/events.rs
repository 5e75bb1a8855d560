//! Slot lifecycle notifications.
//!
//! A single optional [`EventHandler`] receives every [`SlotEvent`] as the
//! queued library operations run. Useful for debug overlays and tests.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::identifiers::{ContainerId, SlotHandle};

// ============================================================================
// SlotEvent
// ============================================================================

/// Something that happened to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// The library defined the slot.
    Defined {
        /// Container the slot belongs to.
        container_id: ContainerId,
        /// New handle.
        handle: SlotHandle,
    },
    /// The one display call was issued.
    Displayed {
        /// Container the slot belongs to.
        container_id: ContainerId,
        /// Displayed handle.
        handle: SlotHandle,
    },
    /// A refresh was issued.
    Refreshed {
        /// Container the slot belongs to.
        container_id: ContainerId,
        /// Refreshed handle.
        handle: SlotHandle,
    },
    /// The slot was torn down.
    Destroyed {
        /// Container the slot belonged to.
        container_id: ContainerId,
        /// Destroyed handle, if the definition had run.
        handle: Option<SlotHandle>,
    },
    /// The library rejected the definition.
    DefineFailed {
        /// Container the slot was meant for.
        container_id: ContainerId,
        /// Failure description.
        reason: String,
    },
}

impl SlotEvent {
    /// Returns the container the event is about.
    #[must_use]
    pub fn container_id(&self) -> &ContainerId {
        match self {
            Self::Defined { container_id, .. }
            | Self::Displayed { container_id, .. }
            | Self::Refreshed { container_id, .. }
            | Self::Destroyed { container_id, .. }
            | Self::DefineFailed { container_id, .. } => container_id,
        }
    }

    /// Returns a short event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Defined { .. } => "defined",
            Self::Displayed { .. } => "displayed",
            Self::Refreshed { .. } => "refreshed",
            Self::Destroyed { .. } => "destroyed",
            Self::DefineFailed { .. } => "defineFailed",
        }
    }
}

// ============================================================================
// EventHandler
// ============================================================================

/// Event handler callback type.
///
/// Runs on the command queue task, outside any manager lock.
pub type EventHandler = Box<dyn Fn(&SlotEvent) + Send + Sync>;

/// Installed form of an [`EventHandler`].
type SharedHandler = Arc<dyn Fn(&SlotEvent) + Send + Sync>;

/// Shared slot for the current handler.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    handler: Arc<Mutex<Option<SharedHandler>>>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("installed", &self.handler.lock().is_some())
            .finish()
    }
}

impl EventSink {
    pub(crate) fn set(&self, handler: EventHandler) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    pub(crate) fn clear(&self) {
        *self.handler.lock() = None;
    }

    pub(crate) fn emit(&self, event: SlotEvent) {
        trace!(event = event.name(), container_id = %event.container_id(), "Slot event");
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(&event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
