//! The tag library boundary.
//!
//! [`TagLibrary`] is the only way this crate talks to the ad-serving tag
//! library. Implementations execute one [`TagCommand`] at a time; the typed
//! provided methods turn each library call into a `Result` so that callers
//! never see a panic or an untyped failure.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::identifiers::{ContainerId, SlotHandle, UnitPath};
use crate::protocol::{
    DisplayTarget, LazyLoadConfig, OutOfPageFormat, SizeMapping, SlotSize, TagCommand,
};

// ============================================================================
// Output
// ============================================================================

/// What the library returned for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Command accepted.
    Done,
    /// Definition succeeded and produced this slot.
    Defined(SlotHandle),
    /// Definition returned no slot (bad path, bad sizes, duplicate div).
    Declined,
}

// ============================================================================
// TagLibrary
// ============================================================================

/// A global, command-queue based ad-serving tag library.
///
/// Commands are only executed once [`is_ready`](Self::is_ready) reports the
/// library's queue exists; [`CommandQueue`](super::CommandQueue) enforces
/// that and preserves push order.
pub trait TagLibrary: Send + Sync {
    /// Returns `true` once the library's command queue exists.
    fn is_ready(&self) -> bool;

    /// Executes one command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Library`] (or a more specific variant) if the
    /// library threw.
    fn execute(&self, command: TagCommand) -> Result<Output>;

    // ========================================================================
    // Typed Calls
    // ========================================================================

    /// Defines a container-bound slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefineFailed`] if the library declined or threw.
    fn define_slot(
        &self,
        unit_path: &UnitPath,
        sizes: &[SlotSize],
        container_id: &ContainerId,
    ) -> Result<SlotHandle> {
        let command = TagCommand::DefineSlot {
            unit_path: unit_path.clone(),
            sizes: sizes.to_vec(),
            container_id: container_id.clone(),
        };

        match self.execute(command) {
            Ok(Output::Defined(handle)) => Ok(handle),
            Ok(_) => Err(Error::define_failed(
                container_id.clone(),
                format!("library returned no slot for {unit_path}"),
            )),
            Err(e) => Err(Error::define_failed(container_id.clone(), e.to_string())),
        }
    }

    /// Defines a page-level slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefineFailed`] if the library declined or threw.
    fn define_out_of_page_slot(
        &self,
        unit_path: &UnitPath,
        format: OutOfPageFormat,
    ) -> Result<SlotHandle> {
        let command = TagCommand::DefineOutOfPageSlot {
            unit_path: unit_path.clone(),
            format,
        };
        let container_id = ContainerId::page_slot(format.as_str());

        match self.execute(command) {
            Ok(Output::Defined(handle)) => Ok(handle),
            Ok(_) => Err(Error::define_failed(
                container_id,
                format!("library returned no slot for {unit_path}"),
            )),
            Err(e) => Err(Error::define_failed(container_id, e.to_string())),
        }
    }

    /// Attaches a size mapping to a slot.
    fn define_size_mapping(&self, handle: SlotHandle, mapping: &SizeMapping) -> Result<()> {
        self.execute(TagCommand::DefineSizeMapping {
            handle,
            mapping: mapping.clone(),
        })
        .map(drop)
    }

    /// Sets one targeting key on a slot.
    fn set_slot_targeting(&self, handle: SlotHandle, key: &str, values: Vec<String>) -> Result<()> {
        self.execute(TagCommand::SetSlotTargeting {
            handle,
            key: key.to_string(),
            values,
        })
        .map(drop)
    }

    /// Attaches a slot to the shared ad service.
    fn add_service(&self, handle: SlotHandle) -> Result<()> {
        self.execute(TagCommand::AddService { handle }).map(drop)
    }

    /// Displays a slot.
    fn display(&self, target: DisplayTarget) -> Result<()> {
        self.execute(TagCommand::Display { target }).map(drop)
    }

    /// Requests new creatives for slots.
    fn refresh(&self, handles: &[SlotHandle]) -> Result<()> {
        self.execute(TagCommand::Refresh {
            handles: handles.to_vec(),
        })
        .map(drop)
    }

    /// Destroys slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestroyFailed`] if the library threw.
    fn destroy_slots(&self, handles: &[SlotHandle]) -> Result<()> {
        self.execute(TagCommand::DestroySlots {
            handles: handles.to_vec(),
        })
        .map(drop)
        .map_err(|e| Error::destroy_failed(e.to_string()))
    }

    /// Sets one page-level targeting key.
    fn set_page_targeting(&self, key: &str, values: Vec<String>) -> Result<()> {
        self.execute(TagCommand::SetPageTargeting {
            key: key.to_string(),
            values,
        })
        .map(drop)
    }

    /// Configures lazy loading.
    fn enable_lazy_load(&self, config: LazyLoadConfig) -> Result<()> {
        self.execute(TagCommand::EnableLazyLoad { config }).map(drop)
    }

    /// Collapses containers that received no creative.
    fn collapse_empty_divs(&self, collapse_before_fetch: bool) -> Result<()> {
        self.execute(TagCommand::CollapseEmptyDivs {
            collapse_before_fetch,
        })
        .map(drop)
    }

    /// Turns on single-request (batched) mode.
    fn enable_single_request(&self) -> Result<()> {
        self.execute(TagCommand::EnableSingleRequest).map(drop)
    }

    /// Enables services. Must be called once per page load.
    fn enable_services(&self) -> Result<()> {
        self.execute(TagCommand::EnableServices).map(drop)
    }
}
