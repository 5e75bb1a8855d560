//! Per-placement configuration.
//!
//! Everything that varies between placements (unit path, sizes, targeting,
//! reserved height) is supplied by the caller at mount time.
//!
//! # Example
//!
//! ```ignore
//! let config = SlotConfig::new(ContainerId::new("home-top")?, UnitPath::new("/1234/site/home_top")?)
//!     .with_sizes([SlotSize::Fixed(300, 250), SlotSize::Fixed(336, 280), SlotSize::Fluid])
//!     .with_size_mapping(SizeMappingRef::rect())
//!     .with_targeting("section", "home")
//!     .with_min_height(280);
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::{ContainerId, SizeMappingRef, UnitPath};
use crate::protocol::{OutOfPageFormat, SlotSize, Targeting, TargetingValue};

// ============================================================================
// Constants
// ============================================================================

/// Sizes used when a placement does not list its own.
const DEFAULT_SIZES: [SlotSize; 4] = [
    SlotSize::Fluid,
    SlotSize::Fixed(336, 280),
    SlotSize::Fixed(300, 250),
    SlotSize::Fixed(250, 250),
];

fn default_sizes() -> Vec<SlotSize> {
    DEFAULT_SIZES.to_vec()
}

// ============================================================================
// SlotConfig
// ============================================================================

/// Configuration of one container-bound placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConfig {
    /// Container the slot renders into.
    pub container_id: ContainerId,

    /// Ad unit path.
    pub unit_path: UnitPath,

    /// Accepted sizes, in preference order.
    #[serde(default = "default_sizes")]
    pub sizes: Vec<SlotSize>,

    /// Shared size mapping to attach, by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mapping: Option<SizeMappingRef>,

    /// Slot-level targeting.
    #[serde(default, skip_serializing_if = "Targeting::is_empty")]
    pub targeting: Targeting,

    /// Height to reserve before the creative arrives, in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
}

impl SlotConfig {
    /// Creates a configuration with the default size list.
    #[must_use]
    pub fn new(container_id: ContainerId, unit_path: UnitPath) -> Self {
        Self {
            container_id,
            unit_path,
            sizes: default_sizes(),
            size_mapping: None,
            targeting: Targeting::new(),
            min_height: None,
        }
    }

    /// Replaces the size list.
    #[must_use]
    pub fn with_sizes(mut self, sizes: impl IntoIterator<Item = SlotSize>) -> Self {
        self.sizes = sizes.into_iter().collect();
        self
    }

    /// Attaches a shared size mapping.
    #[must_use]
    pub fn with_size_mapping(mut self, mapping: SizeMappingRef) -> Self {
        self.size_mapping = Some(mapping);
        self
    }

    /// Adds a targeting key.
    #[must_use]
    pub fn with_targeting(
        mut self,
        key: impl Into<String>,
        value: impl Into<TargetingValue>,
    ) -> Self {
        self.targeting.insert(key, value);
        self
    }

    /// Reserves a minimum height.
    #[must_use]
    pub fn with_min_height(mut self, min_height: u32) -> Self {
        self.min_height = Some(min_height);
        self
    }

    /// Checks the configuration before anything is queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if there are no sizes or a fixed
    /// size has a zero dimension.
    pub fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() {
            return Err(Error::invalid_argument(format!(
                "slot {} has no sizes",
                self.container_id
            )));
        }

        if let Some(size) = self
            .sizes
            .iter()
            .find(|s| matches!(s.dimensions(), Some((0, _)) | Some((_, 0))))
        {
            return Err(Error::invalid_argument(format!(
                "slot {} has an empty size: {size}",
                self.container_id
            )));
        }

        Ok(())
    }
}

// ============================================================================
// PageSlotConfig
// ============================================================================

/// Where an anchor banner is pinned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorPosition {
    /// Top of the viewport.
    Top,
    /// Bottom of the viewport.
    #[default]
    Bottom,
}

impl AnchorPosition {
    /// Returns the library format for this position.
    #[inline]
    #[must_use]
    pub fn format(self) -> OutOfPageFormat {
        match self {
            Self::Top => OutOfPageFormat::TopAnchor,
            Self::Bottom => OutOfPageFormat::BottomAnchor,
        }
    }
}

/// Out-of-page placements for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSlotConfig {
    /// Interstitial unit path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interstitial: Option<UnitPath>,

    /// Anchor unit path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<UnitPath>,

    /// Anchor position.
    pub anchor_position: AnchorPosition,
}

impl PageSlotConfig {
    /// Creates an empty configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interstitial unit.
    #[must_use]
    pub fn with_interstitial(mut self, unit_path: UnitPath) -> Self {
        self.interstitial = Some(unit_path);
        self
    }

    /// Sets the anchor unit.
    #[must_use]
    pub fn with_anchor(mut self, unit_path: UnitPath, position: AnchorPosition) -> Self {
        self.anchor = Some(unit_path);
        self.anchor_position = position;
        self
    }

    /// Returns `true` if no placement is configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interstitial.is_none() && self.anchor.is_none()
    }

    /// Lists the configured placements with their synthetic containers.
    pub(crate) fn placements(&self) -> Vec<(ContainerId, UnitPath, OutOfPageFormat)> {
        let interstitial = self.interstitial.as_ref().map(|path| {
            let format = OutOfPageFormat::Interstitial;
            (ContainerId::page_slot(format.as_str()), path.clone(), format)
        });
        let anchor = self.anchor.as_ref().map(|path| {
            let format = self.anchor_position.format();
            (ContainerId::page_slot(format.as_str()), path.clone(), format)
        });

        interstitial.into_iter().chain(anchor).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
