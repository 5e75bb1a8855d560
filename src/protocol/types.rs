//! Value types carried by tag library commands.
//!
//! These mirror the shapes the tag library accepts: sizes are `[w, h]` pairs
//! or the `"fluid"` keyword, size mappings are viewport → sizes tables, and
//! targeting values are one string or many.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identifiers::{ContainerId, SlotHandle};

// ============================================================================
// SlotSize
// ============================================================================

/// A creative size a slot accepts.
///
/// Serialized as `[width, height]` or the string `"fluid"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSize {
    /// Fixed width × height in CSS pixels.
    Fixed(u32, u32),
    /// Native/fluid creative that sizes itself to the container.
    Fluid,
}

impl SlotSize {
    /// Returns the fixed dimensions, or `None` for fluid.
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Fixed(w, h) => Some((*w, *h)),
            Self::Fluid => None,
        }
    }
}

impl From<(u32, u32)> for SlotSize {
    fn from((w, h): (u32, u32)) -> Self {
        Self::Fixed(w, h)
    }
}

impl From<[u32; 2]> for SlotSize {
    fn from([w, h]: [u32; 2]) -> Self {
        Self::Fixed(w, h)
    }
}

impl fmt::Display for SlotSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(w, h) => write!(f, "{w}x{h}"),
            Self::Fluid => f.write_str("fluid"),
        }
    }
}

impl Serialize for SlotSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fixed(w, h) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(w)?;
                tuple.serialize_element(h)?;
                tuple.end()
            }
            Self::Fluid => serializer.serialize_str("fluid"),
        }
    }
}

impl<'de> Deserialize<'de> for SlotSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair(u32, u32),
            Keyword(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Pair(w, h) => Ok(Self::Fixed(w, h)),
            Repr::Keyword(word) if word == "fluid" => Ok(Self::Fluid),
            Repr::Keyword(word) => Err(D::Error::custom(format!(
                "unknown slot size keyword: {word:?}"
            ))),
        }
    }
}

// ============================================================================
// SizeMapping
// ============================================================================

/// One row of a size mapping: from this viewport up, allow these sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMappingEntry {
    /// Minimum viewport `[width, height]`.
    pub viewport: [u32; 2],
    /// Sizes allowed at this viewport.
    pub sizes: Vec<SlotSize>,
}

/// Breakpoint → allowed sizes table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeMapping {
    entries: Vec<SizeMappingEntry>,
}

impl SizeMapping {
    /// Starts a new mapping.
    #[inline]
    #[must_use]
    pub fn builder() -> SizeMappingBuilder {
        SizeMappingBuilder::default()
    }

    /// The rectangle mapping: any viewport gets fluid plus the medium
    /// rectangle family.
    #[must_use]
    pub fn rect() -> Self {
        Self::builder()
            .add_size(
                [0, 0],
                [
                    SlotSize::Fluid,
                    SlotSize::Fixed(250, 250),
                    SlotSize::Fixed(300, 250),
                    SlotSize::Fixed(336, 280),
                ],
            )
            .build()
    }

    /// Returns the rows in insertion order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[SizeMappingEntry] {
        &self.entries
    }

    /// Returns `true` if the mapping has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`SizeMapping`].
#[derive(Debug, Clone, Default)]
pub struct SizeMappingBuilder {
    entries: Vec<SizeMappingEntry>,
}

impl SizeMappingBuilder {
    /// Adds a viewport row.
    #[must_use]
    pub fn add_size(
        mut self,
        viewport: [u32; 2],
        sizes: impl IntoIterator<Item = SlotSize>,
    ) -> Self {
        self.entries.push(SizeMappingEntry {
            viewport,
            sizes: sizes.into_iter().collect(),
        });
        self
    }

    /// Finishes the mapping.
    #[must_use]
    pub fn build(self) -> SizeMapping {
        SizeMapping {
            entries: self.entries,
        }
    }
}

// ============================================================================
// Targeting
// ============================================================================

/// A targeting value: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetingValue {
    /// A single value.
    One(String),
    /// Several values.
    Many(Vec<String>),
}

impl TargetingValue {
    /// Returns the value as the list form the library expects.
    #[must_use]
    pub fn to_values(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

impl From<&str> for TargetingValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for TargetingValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for TargetingValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl<const N: usize> From<[&str; N]> for TargetingValue {
    fn from(values: [&str; N]) -> Self {
        Self::Many(values.iter().map(|v| (*v).to_string()).collect())
    }
}

/// Key → values targeting, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Targeting(BTreeMap<String, TargetingValue>);

impl Targeting {
    /// Creates empty targeting.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TargetingValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TargetingValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Iterates keys with their values normalised to lists.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, Vec<String>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.to_values()))
    }

    /// Returns the value for a key.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TargetingValue> {
        self.0.get(key)
    }

    /// Returns the number of keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no keys are set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Out-of-page Formats
// ============================================================================

/// Page-level formats that are not anchored to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutOfPageFormat {
    /// Full-screen overlay shown between pages.
    Interstitial,
    /// Banner pinned to the top of the viewport.
    TopAnchor,
    /// Banner pinned to the bottom of the viewport.
    BottomAnchor,
}

impl OutOfPageFormat {
    /// Returns the format name used in logs and synthetic container ids.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interstitial => "interstitial",
            Self::TopAnchor | Self::BottomAnchor => "anchor",
        }
    }
}

// ============================================================================
// Display Target
// ============================================================================

/// What a display call refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayTarget {
    /// A container-bound slot, by container id.
    Container(ContainerId),
    /// An out-of-page slot, by handle.
    Slot(SlotHandle),
}

// ============================================================================
// Lazy Loading
// ============================================================================

/// Lazy-load thresholds, as viewport percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LazyLoadConfig {
    /// Fetch when the slot is this far from the viewport.
    pub fetch_margin_percent: u32,
    /// Render when the slot is this far from the viewport.
    pub render_margin_percent: u32,
    /// Margin multiplier on mobile.
    pub mobile_scaling: f32,
}

impl Default for LazyLoadConfig {
    fn default() -> Self {
        Self {
            fetch_margin_percent: 20,
            render_margin_percent: 10,
            mobile_scaling: 2.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
