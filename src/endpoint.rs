//! Collaborators that supply base URLs and request headers.
//!
//! Service discovery and credential handling belong to the platform client
//! around this crate. The resolver only needs two answers from it:
//! - the base URL of a service (`query`, `blob`, `volatile-blob`) for a
//!   catalog, via [`EndpointResolver`]
//! - the headers to attach to a request, via [`HeaderProvider`]
//!
//! [`StaticEndpoints`] and [`StaticHeaders`] are fixed implementations used by
//! the CLI and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use http::header::{HeaderValue, AUTHORIZATION};
use http::HeaderMap;

use crate::error::EndpointError;

/// Service serving quad-tree indexes.
pub const QUERY_SERVICE: &str = "query";

/// Service serving blobs of versioned layers.
pub const BLOB_SERVICE: &str = "blob";

/// Service serving blobs of volatile layers.
pub const VOLATILE_BLOB_SERVICE: &str = "volatile-blob";

/// API version used for all three services.
pub const SERVICE_VERSION: &str = "v1";

/// Resolves the base URL of a platform service.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Base URL (scheme, host and path prefix, no trailing slash) of
    /// `service` at API `version`, optionally scoped to a catalog.
    async fn base_url(
        &self,
        service: &str,
        version: &str,
        resource: Option<&str>,
    ) -> Result<String, EndpointError>;
}

/// Produces the headers attached to each request.
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    async fn headers(&self) -> Result<HeaderMap, EndpointError>;
}

// =============================================================================
// Static implementations
// =============================================================================

/// Fixed table of base URLs.
///
/// A `{resource}` placeholder in a base URL is replaced by the catalog
/// identity.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpoints {
    urls: HashMap<(String, String), String>,
}

impl StaticEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the base URL of a service version.
    pub fn with_service(
        mut self,
        service: impl Into<String>,
        version: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        self.urls.insert(
            (service.into(), version.into()),
            base_url.trim_end_matches('/').to_string(),
        );
        self
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpoints {
    async fn base_url(
        &self,
        service: &str,
        version: &str,
        resource: Option<&str>,
    ) -> Result<String, EndpointError> {
        let base = self
            .urls
            .get(&(service.to_string(), version.to_string()))
            .ok_or_else(|| EndpointError::UnknownService {
                service: service.to_string(),
                version: version.to_string(),
            })?;

        Ok(match resource {
            Some(resource) => base.replace("{resource}", resource),
            None => base.clone(),
        })
    }
}

/// Fixed set of headers.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    /// No headers at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: &str) -> Result<Self, EndpointError> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| EndpointError::Headers(format!("invalid token: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Self { headers })
    }

    pub fn from_map(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn headers(&self) -> Result<HeaderMap, EndpointError> {
        Ok(self.headers.clone())
    }
}
