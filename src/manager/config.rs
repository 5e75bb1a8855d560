//! Manager configuration.
//!
//! Everything here has a sensible default, so an empty JSON object is a
//! valid configuration.
//!
//! # JSON Shape
//!
//! ```json
//! {
//!   "pollIntervalMs": 50,
//!   "lazyLoad": { "fetchMarginPercent": 20, "renderMarginPercent": 10, "mobileScaling": 2.0 },
//!   "collapseEmptyDivs": true,
//!   "collapseBeforeFetch": false,
//!   "singleRequest": true,
//!   "refreshAfterDisplay": true,
//!   "targetingQueryKeys": ["utm_source", "utm_medium", "utm_campaign"],
//!   "sizeMappings": { "rect": [{ "viewport": [0, 0], "sizes": ["fluid", [300, 250]] }] },
//!   "pageSlots": { "interstitial": "/123/site/interstitial", "anchor": "/123/site/anchor" },
//!   "sweepStaleSlots": true
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{LazyLoadConfig, SizeMapping};
use crate::slots::PageSlotConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default readiness poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Upper bound for the readiness poll interval in milliseconds.
const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Query keys copied into page-level targeting by default.
pub const DEFAULT_TARGETING_QUERY_KEYS: [&str; 3] = ["utm_source", "utm_medium", "utm_campaign"];

/// Name of the size mapping registered by default.
pub const RECT_SIZE_MAPPING: &str = "rect";

// ============================================================================
// ManagerConfig
// ============================================================================

/// Page-wide settings for an [`AdManager`](super::AdManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// How often to check whether the library loaded, in milliseconds.
    pub poll_interval_ms: u64,

    /// Lazy-load thresholds; `None` leaves lazy loading off.
    pub lazy_load: Option<LazyLoadConfig>,

    /// Collapse containers whose slot came back empty.
    pub collapse_empty_divs: bool,

    /// Collapse before the fetch rather than after.
    pub collapse_before_fetch: bool,

    /// Batch requests into a single call.
    pub single_request: bool,

    /// Issue a refresh right after display. Only honored with
    /// `single_request`, where display alone does not fetch.
    pub refresh_after_display: bool,

    /// Page URL query keys copied into page-level targeting.
    pub targeting_query_keys: Vec<String>,

    /// Named size mappings available to slots.
    pub size_mappings: BTreeMap<String, SizeMapping>,

    /// Page slots mounted on every navigation, unless a resolver overrides.
    pub page_slots: PageSlotConfig,

    /// Destroy content slots left over from the previous route.
    pub sweep_stale_slots: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lazy_load: Some(LazyLoadConfig::default()),
            collapse_empty_divs: true,
            collapse_before_fetch: false,
            single_request: true,
            refresh_after_display: true,
            targeting_query_keys: DEFAULT_TARGETING_QUERY_KEYS
                .iter()
                .map(ToString::to_string)
                .collect(),
            size_mappings: BTreeMap::from([(RECT_SIZE_MAPPING.to_string(), SizeMapping::rect())]),
            page_slots: PageSlotConfig::default(),
            sweep_stale_slots: true,
        }
    }
}

impl ManagerConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `json` does not parse
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the poll interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns `true` if displays are followed by a batched refresh.
    #[inline]
    #[must_use]
    pub fn refreshes_after_display(&self) -> bool {
        self.single_request && self.refresh_after_display
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(Error::config(format!(
                "pollIntervalMs must be between 1 and {MAX_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            )));
        }

        if let Some(lazy_load) = &self.lazy_load
            && !(lazy_load.mobile_scaling.is_finite() && lazy_load.mobile_scaling > 0.0)
        {
            return Err(Error::config(format!(
                "lazyLoad.mobileScaling must be positive, got {}",
                lazy_load.mobile_scaling
            )));
        }

        if self.targeting_query_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(Error::config("targetingQueryKeys must not contain empty keys"));
        }

        if let Some(name) = self.size_mappings.keys().find(|name| name.trim().is_empty()) {
            return Err(Error::config(format!("sizeMappings has an empty name: {name:?}")));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
