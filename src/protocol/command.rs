//! Commands understood by the tag library.
//!
//! Commands follow the library's own `object.methodName` naming so that a
//! serialized command can be replayed verbatim by a browser-side shim.
//!
//! # Command Groups
//!
//! | Object | Commands |
//! |--------|----------|
//! | `googletag` | `defineSlot`, `defineOutOfPageSlot`, `display`, `destroySlots`, `enableServices` |
//! | `slot` | `defineSizeMapping`, `setTargeting`, `addService` |
//! | `pubads` | `refresh`, `setTargeting`, `enableLazyLoad`, `collapseEmptyDivs`, `enableSingleRequest` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{ContainerId, SlotHandle, UnitPath};

use super::types::{DisplayTarget, LazyLoadConfig, OutOfPageFormat, SizeMapping, SlotSize};

// ============================================================================
// TagCommand
// ============================================================================

/// A single call into the tag library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TagCommand {
    /// Define a container-bound slot.
    #[serde(rename = "googletag.defineSlot")]
    DefineSlot {
        /// Ad unit path.
        #[serde(rename = "unitPath")]
        unit_path: UnitPath,
        /// Accepted sizes.
        sizes: Vec<SlotSize>,
        /// Container the slot renders into.
        #[serde(rename = "containerId")]
        container_id: ContainerId,
    },

    /// Define a page-level slot.
    #[serde(rename = "googletag.defineOutOfPageSlot")]
    DefineOutOfPageSlot {
        /// Ad unit path.
        #[serde(rename = "unitPath")]
        unit_path: UnitPath,
        /// Page-level format.
        format: OutOfPageFormat,
    },

    /// Attach a size mapping to a slot.
    #[serde(rename = "slot.defineSizeMapping")]
    DefineSizeMapping {
        /// Target slot.
        handle: SlotHandle,
        /// Mapping to attach.
        mapping: SizeMapping,
    },

    /// Set one targeting key on a slot.
    #[serde(rename = "slot.setTargeting")]
    SetSlotTargeting {
        /// Target slot.
        handle: SlotHandle,
        /// Targeting key.
        key: String,
        /// Targeting values.
        values: Vec<String>,
    },

    /// Attach a slot to the shared ad service.
    #[serde(rename = "slot.addService")]
    AddService {
        /// Target slot.
        handle: SlotHandle,
    },

    /// Display a slot.
    #[serde(rename = "googletag.display")]
    Display {
        /// Container or slot to display.
        target: DisplayTarget,
    },

    /// Request new creatives for slots.
    #[serde(rename = "pubads.refresh")]
    Refresh {
        /// Slots to refresh.
        handles: Vec<SlotHandle>,
    },

    /// Destroy slots and release their containers.
    #[serde(rename = "googletag.destroySlots")]
    DestroySlots {
        /// Slots to destroy.
        handles: Vec<SlotHandle>,
    },

    /// Set one page-level targeting key.
    #[serde(rename = "pubads.setTargeting")]
    SetPageTargeting {
        /// Targeting key.
        key: String,
        /// Targeting values.
        values: Vec<String>,
    },

    /// Configure lazy loading.
    #[serde(rename = "pubads.enableLazyLoad")]
    EnableLazyLoad {
        /// Thresholds.
        config: LazyLoadConfig,
    },

    /// Collapse containers whose slot returned no creative.
    #[serde(rename = "pubads.collapseEmptyDivs")]
    CollapseEmptyDivs {
        /// Whether to collapse before the ad is fetched.
        #[serde(rename = "collapseBeforeAdFetch")]
        collapse_before_fetch: bool,
    },

    /// Batch slot requests into one round trip.
    #[serde(rename = "pubads.enableSingleRequest")]
    EnableSingleRequest,

    /// Enable the configured services. Called once per page load.
    #[serde(rename = "googletag.enableServices")]
    EnableServices,
}

impl TagCommand {
    /// Returns the library method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::DefineSlot { .. } => "googletag.defineSlot",
            Self::DefineOutOfPageSlot { .. } => "googletag.defineOutOfPageSlot",
            Self::DefineSizeMapping { .. } => "slot.defineSizeMapping",
            Self::SetSlotTargeting { .. } => "slot.setTargeting",
            Self::AddService { .. } => "slot.addService",
            Self::Display { .. } => "googletag.display",
            Self::Refresh { .. } => "pubads.refresh",
            Self::DestroySlots { .. } => "googletag.destroySlots",
            Self::SetPageTargeting { .. } => "pubads.setTargeting",
            Self::EnableLazyLoad { .. } => "pubads.enableLazyLoad",
            Self::CollapseEmptyDivs { .. } => "pubads.collapseEmptyDivs",
            Self::EnableSingleRequest => "pubads.enableSingleRequest",
            Self::EnableServices => "googletag.enableServices",
        }
    }

    /// Returns `true` if the command creates a slot.
    #[inline]
    #[must_use]
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Self::DefineSlot { .. } | Self::DefineOutOfPageSlot { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_define_slot_serialization() {
        let command = TagCommand::DefineSlot {
            unit_path: UnitPath::new("/net/unit").unwrap(),
            sizes: vec![SlotSize::Fixed(300, 250), SlotSize::Fluid],
            container_id: ContainerId::new("X").unwrap(),
        };

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "googletag.defineSlot",
                "params": {
                    "unitPath": "/net/unit",
                    "sizes": [[300, 250], "fluid"],
                    "containerId": "X"
                }
            })
        );
    }

    #[test]
    fn test_unit_command_serialization() {
        let value = serde_json::to_value(TagCommand::EnableServices).unwrap();
        assert_eq!(value["method"], "googletag.enableServices");
    }

    #[test]
    fn test_method_matches_serialized_name() {
        let handle = SlotHandle::next();
        let commands = [
            TagCommand::Refresh {
                handles: vec![handle],
            },
            TagCommand::DestroySlots {
                handles: vec![handle],
            },
            TagCommand::CollapseEmptyDivs {
                collapse_before_fetch: true,
            },
            TagCommand::EnableSingleRequest,
        ];

        for command in commands {
            let value = serde_json::to_value(&command).unwrap();
            assert_eq!(value["method"], command.method());
        }
    }

    #[test]
    fn test_is_definition() {
        let define = TagCommand::DefineOutOfPageSlot {
            unit_path: UnitPath::new("/u/int").unwrap(),
            format: OutOfPageFormat::Interstitial,
        };
        assert!(define.is_definition());
        assert!(!TagCommand::EnableServices.is_definition());
    }
}
