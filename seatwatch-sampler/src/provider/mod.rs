//! Provider collaborators
//!
//! A provider is the ticketing back-end a showing is sold through. The
//! scheduler only knows the [`Provider`] trait: how a vendor's pages or APIs
//! are read is the implementation's business.
//!
//! Capabilities beyond seat probing are optional. Providers advertise them
//! through [`Provider::requires_credential`] and
//! [`Provider::supports_capacity_probe`]; the default method bodies return
//! [`ProviderError::Unsupported`].

pub mod json;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ProviderError, SamplerResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

pub use json::JsonApiProvider;

/// Venue context handed to probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueHints {
    pub venue_id: i64,
    pub venue_name: String,
    pub venue_url: Option<String>,
}

/// Everything a provider needs to locate one showing's seat map
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub show_id: i64,
    pub starts_at: DateTime<Utc>,
    /// Local calendar date of the show
    pub date: NaiveDate,
    /// Local wall-clock start time
    pub time: NaiveTime,
    pub title: Option<String>,
    pub detail_url: Option<String>,
    pub venue_hints: VenueHints,
    /// Venue token resolved at enqueue time
    pub credential: Option<String>,
}

/// Result of one seat probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatProbe {
    pub auditorium: Option<String>,
    pub seats_remaining: Option<i64>,
    pub seats_sold: Option<i64>,
    pub capacity: Option<i64>,
    pub source: String,
}

/// Outcome of a speculative reservation of `candidate` seats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityProbe {
    pub ok: bool,
}

/// Ticketing back-end contract
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider tag stored on showings (e.g. "json", "kinoheld")
    fn tag(&self) -> &str;

    /// Dispatch rank within one tick; lower runs first
    fn priority(&self) -> u8 {
        100
    }

    /// Whether this provider sells tickets for the named venue
    fn classify(&self, venue_name: &str) -> bool;

    /// Read current seat availability for one showing
    async fn probe_seats(&self, request: &ProbeRequest) -> Result<SeatProbe, ProviderError>;

    /// Whether [`Provider::probe_capacity_candidate`] is implemented
    fn supports_capacity_probe(&self) -> bool {
        false
    }

    /// Try to hold exactly `candidate` seats; `ok` reports acceptance
    ///
    /// Any hold created on the vendor side must be released by the provider.
    async fn probe_capacity_candidate(
        &self,
        _detail_url: &str,
        _candidate: i64,
    ) -> Result<CapacityProbe, ProviderError> {
        Err(ProviderError::Unsupported("probe_capacity_candidate"))
    }

    /// Whether probes need a per-venue token from [`Provider::fetch_credential`]
    fn requires_credential(&self) -> bool {
        false
    }

    /// Fetch a fresh per-venue token
    async fn fetch_credential(&self, _venue_url: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("fetch_credential"))
    }
}

/// Ordered set of registered providers
///
/// Classification asks providers in registration order and takes the first
/// that claims the venue.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.tag() == tag).cloned()
    }

    /// Provider tag for a venue name, if any provider claims it
    pub fn classify(&self, venue_name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.classify(venue_name))
            .cloned()
    }

    /// Resolve a showing's provider: stored tag first, then venue classification
    pub fn resolve(&self, stored_tag: Option<&str>, venue_name: &str) -> Option<Arc<dyn Provider>> {
        stored_tag
            .and_then(|tag| self.get(tag))
            .or_else(|| self.classify(venue_name))
    }

    /// Dispatch priority for a tag; unknown tags sort last
    pub fn priority(&self, tag: &str) -> u8 {
        self.get(tag).map(|p| p.priority()).unwrap_or(u8::MAX)
    }

    pub fn tags(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.tag().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build the registry from `[[providers]]`, in file order
pub fn registry_from_config(configs: &[ProviderConfig]) -> SamplerResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for config in configs {
        let provider: Arc<dyn Provider> = match config.kind {
            ProviderKind::Json => Arc::new(JsonApiProvider::from_config(config)?),
        };
        tracing::info!(
            tag = provider.tag(),
            priority = provider.priority(),
            credential = provider.requires_credential(),
            capacity_probe = provider.supports_capacity_probe(),
            "Registered provider"
        );
        registry.register(provider);
    }
    Ok(registry)
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedProvider {
        tag: &'static str,
        needle: &'static str,
        priority: u8,
    }

    #[async_trait]
    impl Provider for NamedProvider {
        fn tag(&self) -> &str {
            self.tag
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn classify(&self, venue_name: &str) -> bool {
            venue_name.contains(self.needle)
        }

        async fn probe_seats(&self, _request: &ProbeRequest) -> Result<SeatProbe, ProviderError> {
            unimplemented!()
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(NamedProvider { tag: "alpha", needle: "Alpha", priority: 5 }));
        registry.register(Arc::new(NamedProvider { tag: "beta", needle: "Kino", priority: 1 }));
        registry.register(Arc::new(NamedProvider { tag: "gamma", needle: "Kino", priority: 9 }));
        registry
    }

    #[test]
    fn test_classify_takes_first_match() {
        let registry = registry();
        assert_eq!(registry.classify("Kino Central").unwrap().tag(), "beta");
        assert_eq!(registry.classify("Alpha Lichtspiele").unwrap().tag(), "alpha");
        assert!(registry.classify("Odeon").is_none());
    }

    #[test]
    fn test_resolve_prefers_stored_tag() {
        let registry = registry();
        assert_eq!(registry.resolve(Some("gamma"), "Kino Central").unwrap().tag(), "gamma");
        // Unknown stored tag falls back to classification
        assert_eq!(registry.resolve(Some("legacy"), "Kino Central").unwrap().tag(), "beta");
        assert!(registry.resolve(None, "Odeon").is_none());
    }

    #[test]
    fn test_priority_of_unknown_tag_sorts_last() {
        let registry = registry();
        assert_eq!(registry.priority("beta"), 1);
        assert_eq!(registry.priority("missing"), u8::MAX);
    }

    #[tokio::test]
    async fn test_optional_capabilities_default_to_unsupported() {
        let provider = NamedProvider { tag: "alpha", needle: "Alpha", priority: 5 };
        assert!(!provider.supports_capacity_probe());
        assert!(!provider.requires_credential());
        assert!(matches!(
            provider.probe_capacity_candidate("https://x", 10).await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            provider.fetch_credential("https://x").await,
            Err(ProviderError::Unsupported(_))
        ));
    }
}
