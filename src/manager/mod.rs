//! Page-wide ad manager.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AdManager`] | Owns queue, registry, bootstrap and navigation state |
//! | [`AdManagerBuilder`] | Fluent configuration builder |
//! | [`ManagerConfig`] | Serializable page-wide settings |
//! | [`PageGlobals`] | Targeting and size mappings fixed at bootstrap |

// ============================================================================
// Submodules
// ============================================================================

/// One-time page configuration.
pub mod bootstrap;

/// Fluent builder pattern for manager configuration.
pub mod builder;

/// Page-wide settings.
pub mod config;

/// Core manager implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::PageGlobals;
pub use builder::AdManagerBuilder;
pub use config::ManagerConfig;
pub use core::AdManager;
