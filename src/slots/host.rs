//! Host page boundary.
//!
//! The host owns rendering. It tells the manager which containers exist and
//! receives the few layout effects slots have: a reserved minimum height, a
//! cleared container, and a neutral view state.

use crate::identifiers::ContainerId;

/// What a container should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerView {
    /// Nothing requested; neutral placeholder.
    Placeholder,
    /// Slot requested; waiting for the library or the creative.
    Loading,
    /// Display issued; the creative renders into the container.
    Requested,
    /// The slot could not be set up; neutral "unavailable" panel.
    Unavailable,
}

/// Page-side collaborator.
///
/// All methods are infallible: the host applies the effect if it can and
/// ignores it otherwise.
pub trait PageHost: Send + Sync {
    /// Returns `true` if the container is present on the page.
    fn container_exists(&self, container_id: &ContainerId) -> bool;

    /// Reserves vertical space so the creative does not shift layout.
    fn reserve_height(&self, container_id: &ContainerId, min_height: u32);

    /// Removes whatever the library rendered into the container.
    fn clear_container(&self, container_id: &ContainerId);

    /// Switches the container's neutral view.
    fn set_view(&self, container_id: &ContainerId, view: ContainerView);
}

/// Host that assumes every container exists and ignores layout effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHost;

impl PageHost for DetachedHost {
    fn container_exists(&self, _container_id: &ContainerId) -> bool {
        true
    }

    fn reserve_height(&self, _container_id: &ContainerId, _min_height: u32) {}

    fn clear_container(&self, _container_id: &ContainerId) {}

    fn set_view(&self, _container_id: &ContainerId, _view: ContainerView) {}
}

// ============================================================================
// Test Host
// ============================================================================
