//! Tag library transport layer.
//!
//! This module is the boundary to the ad-serving tag library: the
//! [`TagLibrary`] trait, the readiness-gated [`CommandQueue`] every call
//! goes through, and a WebSocket [`BridgeLibrary`] for driving a library
//! that lives in a browser page.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   when_ready(op)   ┌──────────────┐   execute()   ┌─────────────┐
//! │ Slot controllers │ ─────────────────► │ CommandQueue │ ────────────► │ TagLibrary  │
//! └──────────────────┘   Completion<T>    └──────────────┘  push order   └─────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `library` | `TagLibrary` trait and typed calls |
//! | `queue` | Readiness gate, ordered queue, `Completion` |
//! | `bridge` | WebSocket-backed `TagLibrary` |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket bridge to a browser-side shim.
pub mod bridge;

/// Tag library trait.
pub mod library;

/// Readiness gate and ordered command queue.
pub mod queue;

#[cfg(test)]
pub(crate) mod fake;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::BridgeLibrary;
pub use library::{Output, TagLibrary};
pub use queue::{CommandQueue, Completion, DEFAULT_POLL_INTERVAL, QueuedOp};
