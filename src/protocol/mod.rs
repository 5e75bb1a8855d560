//! Tag library command types.
//!
//! This module defines the typed calls made into the tag library and the
//! frames used when those calls travel over the bridge.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `TagCommand` | Rust → library | One library call |
//! | `Request` | Rust → shim | Bridge frame wrapping a command |
//! | `Notice` | Shim → Rust | Readiness and async failures |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions |
//! | `request` | Bridge frames |
//! | `types` | Sizes, mappings, targeting, formats |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions.
pub mod command;

/// Bridge frame types.
pub mod request;

/// Value types carried by commands.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::TagCommand;
pub use request::{Notice, Request};
pub use types::{
    DisplayTarget, LazyLoadConfig, OutOfPageFormat, SizeMapping, SizeMappingBuilder,
    SizeMappingEntry, SlotSize, Targeting, TargetingValue,
};
