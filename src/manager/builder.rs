//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`AdManager`]
//! instances.
//!
//! # Example
//!
//! ```ignore
//! let manager = AdManager::builder()
//!     .library(BridgeLibrary::bind(Ipv4Addr::LOCALHOST.into(), 0).await?)
//!     .host(Arc::new(DetachedHost))
//!     .poll_interval(Duration::from_millis(100))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::SizeMapping;
use crate::slots::{DetachedHost, NavigationIdentity, PageHost, PageSlotConfig, PageSlotResolver};
use crate::transport::TagLibrary;

use super::config::ManagerConfig;
use super::core::AdManager;

// ============================================================================
// AdManagerBuilder
// ============================================================================

/// Builder for configuring an [`AdManager`] instance.
///
/// Use [`AdManager::builder()`] to create a new builder.
#[derive(Default)]
pub struct AdManagerBuilder {
    /// Tag library to drive.
    library: Option<Arc<dyn TagLibrary>>,
    /// Page host; defaults to [`DetachedHost`].
    host: Option<Arc<dyn PageHost>>,
    /// Page-wide settings.
    config: ManagerConfig,
    /// Per-route page slot choice.
    resolver: Option<PageSlotResolver>,
}

impl fmt::Debug for AdManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdManagerBuilder")
            .field("library", &self.library.is_some())
            .field("host", &self.host.is_some())
            .field("config", &self.config)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

// ============================================================================
// AdManagerBuilder Implementation
// ============================================================================

impl AdManagerBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tag library.
    #[inline]
    #[must_use]
    pub fn library(mut self, library: Arc<dyn TagLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Sets the page host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: Arc<dyn PageHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the readiness poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables single-request mode.
    #[inline]
    #[must_use]
    pub fn single_request(mut self, enabled: bool) -> Self {
        self.config.single_request = enabled;
        self
    }

    /// Enables or disables the refresh issued right after display.
    #[inline]
    #[must_use]
    pub fn refresh_after_display(mut self, enabled: bool) -> Self {
        self.config.refresh_after_display = enabled;
        self
    }

    /// Registers a named size mapping.
    #[must_use]
    pub fn size_mapping(mut self, name: impl Into<String>, mapping: SizeMapping) -> Self {
        self.config.size_mappings.insert(name.into(), mapping);
        self
    }

    /// Sets the page slots mounted on every navigation.
    #[inline]
    #[must_use]
    pub fn page_slots(mut self, page_slots: PageSlotConfig) -> Self {
        self.config.page_slots = page_slots;
        self
    }

    /// Chooses page slots per route, overriding [`page_slots`](Self::page_slots).
    #[must_use]
    pub fn page_slot_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&NavigationIdentity) -> PageSlotConfig + Send + Sync + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Builds the manager with validation.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no library was set
    /// - [`Error::Config`] if a configuration value is out of range
    pub fn build(self) -> Result<AdManager> {
        let library = self.validate_library()?;
        self.config.validate()?;

        let host = self.host.unwrap_or_else(|| Arc::new(DetachedHost));
        Ok(AdManager::new(library, host, self.config, self.resolver))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl AdManagerBuilder {
    /// Validates the library configuration.
    fn validate_library(&self) -> Result<Arc<dyn TagLibrary>> {
        self.library.clone().ok_or_else(|| {
            Error::config(
                "Tag library is required. Use .library() to set it.\n\
                 Example: AdManager::builder().library(BridgeLibrary::bind(ip, port).await?)",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
