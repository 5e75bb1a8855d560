//! Ad slot manager - Lifecycle control for command-queue tag libraries.
//!
//! This library decides when ad slots are defined, displayed, refreshed and
//! destroyed on a page driven by an asynchronously loaded, global,
//! command-queue based ad-serving tag library.
//!
//! # Architecture
//!
//! The manager sits between a host page and the tag library:
//!
//! - **Host (page)**: Owns containers, renders, reports navigations
//! - **Manager (Rust)**: Owns slot lifecycle, registry and ordering
//! - **Library (remote)**: Defines, fetches and renders creatives
//!
//! Key design principles:
//!
//! - Every library call goes through one ordered, readiness-gated queue
//! - One live slot per container, reserved synchronously at mount time
//! - Each slot is displayed exactly once; later fetches are refreshes
//! - A navigation tears down everything the previous route left before
//!   the new route mounts anything
//! - Library failures never reach the caller as panics
//!
//! # Quick Start
//!
//! ```ignore
//! use std::net::Ipv4Addr;
//! use ad_slot_manager::{AdManager, BridgeLibrary, ContainerId, Result, SlotConfig, UnitPath};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Library shim connects to this port from the page
//!     let library = BridgeLibrary::bind(Ipv4Addr::LOCALHOST.into(), 0).await?;
//!
//!     let manager = AdManager::builder().library(library).build()?;
//!     manager.bootstrap("https://site.test/?utm_source=news")?;
//!     manager.routes().navigate_url("/")?;
//!
//!     let id = ContainerId::new("home-top")?;
//!     let config = SlotConfig::new(id.clone(), UnitPath::new("/1234/site/home_top")?);
//!     let handle = manager.slot(id).mount(config)?.await??;
//!     println!("Displayed {handle}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | [`AdManager`], builder, configuration, bootstrap |
//! | [`slots`] | Registry, slot controllers, page slots, navigation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Library command types |
//! | [`transport`] | Library trait, command queue, WebSocket bridge |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for slots and navigations.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Page-wide manager.
///
/// Use [`AdManager::builder()`] to create a configured instance.
pub mod manager;

/// Tag library command types.
pub mod protocol;

/// Slot lifecycle: registry, controllers, page slots, navigation.
pub mod slots;

/// Tag library transport layer.
///
/// The library trait, the readiness-gated command queue and the WebSocket
/// bridge.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Manager types
pub use manager::{AdManager, AdManagerBuilder, ManagerConfig, PageGlobals};

// Slot types
pub use slots::{
    AnchorPosition, ContainerView, DetachedHost, EventHandler, NavigationIdentity, PageHost,
    PageSlotConfig, PageSlotResolver, PageSlots, RegistryEntry, RouteCoordinator, RoutePhase,
    SlotConfig, SlotController, SlotEvent, SlotKind, SlotRegistry, SlotState,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ContainerId, NavigationId, RequestId, SizeMappingRef, SlotHandle, UnitPath};

// Protocol types
pub use protocol::{
    LazyLoadConfig, OutOfPageFormat, SizeMapping, SlotSize, TagCommand, Targeting, TargetingValue,
};

// Transport types
pub use transport::{BridgeLibrary, CommandQueue, Completion, Output, TagLibrary};
