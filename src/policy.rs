//! Request classification
//!
//! Decides which handling strategy applies to a request. The checks run in a
//! fixed order: bypass, own origin, listed external, everything else.

use crate::config::WorkerConfig;
use crate::request::Request;

/// Handling strategy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not cacheable (non-GET or non-HTTP scheme); forwarded untouched
    Bypass,
    /// Same origin as the app; network first, cache fallback
    OwnOrigin,
    /// Matches the external allow-list; cache first, background refresh
    ListedExternal,
    /// Anything else; network first, read-only cache fallback
    Other,
}

/// Classifies `request` against the worker config
pub fn classify(request: &Request, config: &WorkerConfig) -> RequestClass {
    if !request.is_get() || !matches!(request.url.scheme(), "http" | "https") {
        return RequestClass::Bypass;
    }

    if request.url.origin() == config.scope.origin() {
        return RequestClass::OwnOrigin;
    }

    let url = request.url.as_str();
    if config
        .external_assets
        .iter()
        .any(|prefix| url.starts_with(prefix.as_str()))
    {
        return RequestClass::ListedExternal;
    }

    RequestClass::Other
}
