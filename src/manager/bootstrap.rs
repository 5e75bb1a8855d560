//! One-time page configuration.
//!
//! Bootstrap runs once per manager. It reads page-level targeting from the
//! page URL, freezes the named size mapping table, and queues the single
//! global configuration op:
//!
//! ```text
//! setTargeting(utm_*)* → enableLazyLoad → collapseEmptyDivs
//!     → enableSingleRequest → enableServices
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SizeMappingRef;
use crate::protocol::{SizeMapping, Targeting};
use crate::transport::TagLibrary;

use super::config::ManagerConfig;

// ============================================================================
// PageGlobals
// ============================================================================

/// Page-wide state fixed at bootstrap.
pub struct PageGlobals {
    targeting: Targeting,
    size_mappings: FxHashMap<SizeMappingRef, Arc<SizeMapping>>,
}

impl fmt::Debug for PageGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.size_mappings.keys().map(SizeMappingRef::as_str).collect();
        names.sort_unstable();
        f.debug_struct("PageGlobals")
            .field("targeting", &self.targeting)
            .field("size_mappings", &names)
            .finish()
    }
}

impl PageGlobals {
    /// Builds the globals for `page_url`.
    pub(crate) fn build(config: &ManagerConfig, page_url: &Url) -> Self {
        let mut targeting = Targeting::new();
        for key in &config.targeting_query_keys {
            let values: Vec<String> = page_url
                .query_pairs()
                .filter(|(name, value)| name == key && !value.is_empty())
                .map(|(_, value)| value.into_owned())
                .collect();

            match values.len() {
                0 => {}
                1 => targeting.insert(key.clone(), values[0].clone()),
                _ => targeting.insert(key.clone(), values),
            }
        }

        let size_mappings = config
            .size_mappings
            .iter()
            .map(|(name, mapping)| (SizeMappingRef::new(name.clone()), Arc::new(mapping.clone())))
            .collect();

        Self {
            targeting,
            size_mappings,
        }
    }

    /// Returns the page-level targeting.
    #[inline]
    #[must_use]
    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    /// Looks up a named size mapping.
    #[must_use]
    pub fn size_mapping(&self, name: &SizeMappingRef) -> Option<Arc<SizeMapping>> {
        self.size_mappings.get(name).cloned()
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Parses the page URL given to bootstrap.
pub(crate) fn parse_page_url(page_url: &str) -> Result<Url> {
    Url::parse(page_url)
        .map_err(|e| Error::invalid_argument(format!("bad page URL {page_url}: {e}")))
}

/// The queued global configuration op.
///
/// Individual settings that the library rejects are logged and skipped;
/// only a failed `enableServices` is reported.
pub(crate) fn configure(
    library: &dyn TagLibrary,
    globals: &PageGlobals,
    config: &ManagerConfig,
) -> Result<()> {
    for (key, values) in globals.targeting().pairs() {
        if let Err(e) = library.set_page_targeting(key, values) {
            debug!(key, error = %e, "Page targeting rejected");
        }
    }

    if let Some(lazy_load) = config.lazy_load
        && let Err(e) = library.enable_lazy_load(lazy_load)
    {
        debug!(error = %e, "Lazy load rejected");
    }

    if config.collapse_empty_divs
        && let Err(e) = library.collapse_empty_divs(config.collapse_before_fetch)
    {
        debug!(error = %e, "Collapse empty divs rejected");
    }

    if config.single_request
        && let Err(e) = library.enable_single_request()
    {
        debug!(error = %e, "Single request rejected");
    }

    library.enable_services()?;
    info!(targeting = globals.targeting().len(), "Tag library services enabled");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::TargetingValue;
    use crate::transport::fake::FakeLibrary;

    fn url(value: &str) -> Url {
        parse_page_url(value).unwrap()
    }

    #[test]
    fn test_targeting_from_query() {
        let globals = PageGlobals::build(
            &ManagerConfig::default(),
            &url("https://site.test/a?utm_source=news&utm_medium=&other=1&utm_campaign=x&utm_campaign=y"),
        );

        let targeting = globals.targeting();
        assert_eq!(targeting.len(), 2);
        assert_eq!(targeting.get("utm_source"), Some(&TargetingValue::from("news")));
        assert_eq!(
            targeting.get("utm_campaign").map(TargetingValue::to_values),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert!(targeting.get("utm_medium").is_none());
    }

    #[test]
    fn test_size_mapping_lookup() {
        let globals = PageGlobals::build(&ManagerConfig::default(), &url("https://site.test/"));

        assert!(globals.size_mapping(&SizeMappingRef::rect()).is_some());
        assert!(globals.size_mapping(&SizeMappingRef::new("nope")).is_none());
    }

    #[test]
    fn test_bad_page_url() {
        assert!(matches!(
            parse_page_url("not a url"),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_configure_order() {
        let library = FakeLibrary::ready();
        let config = ManagerConfig::default();
        let globals = PageGlobals::build(&config, &url("https://site.test/?utm_source=news"));

        configure(library.as_ref(), &globals, &config).unwrap();

        assert_eq!(
            library.methods(),
            vec![
                "pubads.setTargeting",
                "pubads.enableLazyLoad",
                "pubads.collapseEmptyDivs",
                "pubads.enableSingleRequest",
                "googletag.enableServices",
            ]
        );
    }

    #[test]
    fn test_rejected_setting_does_not_stop_services() {
        let library = FakeLibrary::ready();
        library.fail_method("pubads.enableLazyLoad");
        let config = ManagerConfig::default();
        let globals = PageGlobals::build(&config, &url("https://site.test/"));

        assert!(configure(library.as_ref(), &globals, &config).is_ok());
        assert_eq!(library.count("googletag.enableServices"), 1);
    }
}
