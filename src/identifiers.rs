//! Type-safe identifiers for slots, containers and navigations.
//!
//! Newtype wrappers keep container ids, unit paths and handles from being
//! mixed up as plain strings or integers.
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`ContainerId`] | `String` | Host page (DOM id) |
//! | [`UnitPath`] | `String` | Caller config |
//! | [`SizeMappingRef`] | `String` | Caller config |
//! | [`SlotHandle`] | `NonZeroU64` | Tag library |
//! | [`NavigationId`] | `u64` | Route coordinator |
//! | [`RequestId`] | `Uuid` | Bridge frames |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted container id.
const MAX_CONTAINER_ID_LEN: usize = 256;

/// Prefix for containers that back out-of-page slots.
const PAGE_SLOT_PREFIX: &str = "oop:";

/// Ad unit paths: one or more `/segment` parts.
static UNIT_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/[A-Za-z0-9._\-]+)+$").expect("unit path pattern is valid")
});

/// Global counter for slot handles.
static NEXT_SLOT_HANDLE: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ContainerId
// ============================================================================

/// Identifier of the page element a slot renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the id is empty, too long,
    /// contains whitespace or uses the prefix reserved for out-of-page
    /// slots (see [`ContainerId::page_slot`]).
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::invalid_argument("container id must not be empty"));
        }
        if id.len() > MAX_CONTAINER_ID_LEN {
            return Err(Error::invalid_argument(format!(
                "container id longer than {MAX_CONTAINER_ID_LEN} bytes"
            )));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(Error::invalid_argument(format!(
                "container id contains whitespace: {id:?}"
            )));
        }
        if id.starts_with(PAGE_SLOT_PREFIX) {
            return Err(Error::invalid_argument(format!(
                "container id prefix {PAGE_SLOT_PREFIX:?} is reserved: {id:?}"
            )));
        }

        Ok(Self(id))
    }

    /// Returns the synthetic id used to register an out-of-page slot.
    #[must_use]
    pub fn page_slot(name: &str) -> Self {
        Self(format!("{PAGE_SLOT_PREFIX}{name}"))
    }

    /// Returns `true` if this id belongs to an out-of-page slot.
    #[inline]
    #[must_use]
    pub fn is_page_slot(&self) -> bool {
        self.0.starts_with(PAGE_SLOT_PREFIX)
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ContainerId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

// ============================================================================
// UnitPath
// ============================================================================

/// Ad unit path in the ad server, e.g. `/1234/site/home_top`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitPath(String);

impl UnitPath {
    /// Creates a unit path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless the path is a sequence of
    /// `/segment` parts made of letters, digits, `.`, `_` or `-`.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !UNIT_PATH_PATTERN.is_match(&path) {
            return Err(Error::invalid_argument(format!(
                "invalid ad unit path: {path:?}"
            )));
        }
        Ok(Self(path))
    }

    /// Derives a sibling unit named `{last_segment}_{name}`.
    ///
    /// Inline placements follow this naming, so `/1/site/site` with
    /// `Content3` becomes `/1/site/site_Content3`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `name` is not a valid segment.
    pub fn child(&self, name: &str) -> Result<Self> {
        Self::new(format!("{}_{name}", self.0))
    }

    /// Returns the path as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UnitPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for UnitPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UnitPath> for String {
    fn from(path: UnitPath) -> Self {
        path.0
    }
}

// ============================================================================
// SizeMappingRef
// ============================================================================

/// Name of a shared size mapping built at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SizeMappingRef(String);

impl SizeMappingRef {
    /// Creates a reference to a named size mapping.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The rectangle mapping every default configuration carries.
    #[inline]
    #[must_use]
    pub fn rect() -> Self {
        Self::new("rect")
    }

    /// Returns the name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SizeMappingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SlotHandle
// ============================================================================

/// Opaque handle to a slot defined in the tag library.
///
/// Minted by the library on definition and owned by whoever defined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotHandle(NonZeroU64);

impl SlotHandle {
    /// Mints a new process-unique handle.
    #[must_use]
    pub fn next() -> Self {
        let id = NEXT_SLOT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Creates a handle from a raw value. Returns `None` for zero.
    #[inline]
    #[must_use]
    pub fn from_u64(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

// ============================================================================
// NavigationId
// ============================================================================

/// Monotonic counter identifying a client-side navigation.
///
/// Zero is the state before the first navigation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NavigationId(u64);

impl NavigationId {
    /// Navigation id before any navigation happened.
    pub const INITIAL: Self = Self(0);

    /// Returns the id of the following navigation.
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NavigationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NavigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nav#{}", self.0)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Identifier of a frame sent over the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a random request id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_rejects_empty_and_whitespace() {
        assert!(ContainerId::new("").is_err());
        assert!(ContainerId::new("ad top").is_err());
        assert!(ContainerId::new("x".repeat(MAX_CONTAINER_ID_LEN + 1)).is_err());
        assert!(ContainerId::new("ad-top").is_ok());
    }

    #[test]
    fn test_page_slot_ids() {
        let id = ContainerId::page_slot("interstitial");
        assert_eq!(id.as_str(), "oop:interstitial");
        assert!(id.is_page_slot());
        assert!(!ContainerId::new("X").unwrap().is_page_slot());
    }

    #[test]
    fn test_page_slot_prefix_is_reserved() {
        assert!(ContainerId::new("oop:anchor").is_err());
        assert!(ContainerId::new("oop:").is_err());
        assert!(serde_json::from_str::<ContainerId>("\"oop:interstitial\"").is_err());
        assert!(ContainerId::new("loop:anchor").is_ok());
    }

    #[test]
    fn test_container_id_serde_validates() {
        let ok: ContainerId = serde_json::from_str("\"Content3\"").unwrap();
        assert_eq!(ok.as_str(), "Content3");
        assert!(serde_json::from_str::<ContainerId>("\"\"").is_err());
    }

    #[test]
    fn test_unit_path_validation() {
        assert!(UnitPath::new("/net/unit").is_ok());
        assert!(UnitPath::new("/23287346478/site.example/site_Anchor").is_ok());
        assert!(UnitPath::new("net/unit").is_err());
        assert!(UnitPath::new("/net//unit").is_err());
        assert!(UnitPath::new("/net/unit/").is_err());
        assert!(UnitPath::new("").is_err());
    }

    #[test]
    fn test_unit_path_child() {
        let base = UnitPath::new("/1/site/site").unwrap();
        let child = base.child("Content3").unwrap();
        assert_eq!(child.as_str(), "/1/site/site_Content3");
        assert!(base.child("bad name").is_err());
    }

    #[test]
    fn test_slot_handles_are_unique() {
        let a = SlotHandle::next();
        let b = SlotHandle::next();
        assert_ne!(a, b);
        assert!(SlotHandle::from_u64(0).is_none());
        assert_eq!(SlotHandle::from_u64(7).unwrap().as_u64(), 7);
    }

    #[test]
    fn test_navigation_id_ordering() {
        let first = NavigationId::INITIAL.next();
        assert!(first > NavigationId::INITIAL);
        assert_eq!(first.as_u64(), 1);
        assert_eq!(first.next().to_string(), "nav#2");
    }
}
