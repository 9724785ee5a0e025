//! License activation with a time-limited cache.
//!
//! [`LicenseCache::ensure_active`] is meant to be called whenever the host
//! refreshes update metadata for the plugin. It only talks to the store when
//! the cached confirmation is missing or expired, so a confirmed license
//! costs one request per TTL period.
//!
//! Nothing here is surfaced to end users. A failed check leaves the license
//! unconfirmed and the next trigger simply tries again.

pub mod client;
pub mod store;

use crate::error::Svg2PngError;
use client::{LicenseAction, LicenseEndpoint, LicenseRequest};
use std::sync::Arc;
use store::{CacheStore, LicenseCacheEntry};
use tracing::{debug, info, warn};

/// Activation logic over an injected store client and cache.
pub struct LicenseCache {
    endpoint: Arc<dyn LicenseEndpoint>,
    cache: Arc<dyn CacheStore>,
    ttl: chrono::Duration,
}

impl LicenseCache {
    /// Cache confirmations for `ttl` (30 days in [`crate::LicenseConfig`]).
    pub fn new(
        endpoint: Arc<dyn LicenseEndpoint>,
        cache: Arc<dyn CacheStore>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            endpoint,
            cache,
            ttl,
        }
    }

    /// Make sure `license_key` is activated for `site_url`.
    ///
    /// Returns `true` without a network call while a cached confirmation is
    /// live. Otherwise asks the store to activate; only a `"valid"` reply is
    /// cached. Transport or decoding failures leave the cache untouched and
    /// return `false`.
    pub async fn ensure_active(&self, license_key: &str, item_name: &str, site_url: &str) -> bool {
        match self.cache.get(license_key) {
            Ok(Some(entry)) => {
                debug!(
                    license = %license_key,
                    valid_until = %entry.valid_until,
                    "License confirmation cached"
                );
                return true;
            }
            Ok(None) => {}
            Err(e) => warn!(license = %license_key, "License cache unreadable, re-checking: {}", e),
        }

        let request = LicenseRequest::new(LicenseAction::Activate, license_key, item_name, site_url);
        let response = match self.endpoint.call(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(license = %license_key, "License activation failed: {}", e);
                return false;
            }
        };

        if !response.is_valid() {
            info!(
                license = %license_key,
                status = response.license.as_deref().unwrap_or("<missing>"),
                "License not confirmed"
            );
            return false;
        }

        match self.cache.set(license_key, self.ttl) {
            Ok(entry) => info!(
                license = %license_key,
                valid_until = %entry.valid_until,
                "License activated"
            ),
            Err(e) => warn!(license = %license_key, "License activated but not cached: {}", e),
        }
        true
    }

    /// Deactivate `license_key` for `site_url`.
    ///
    /// Best effort: the store's answer (or failure) is only logged, and the
    /// cached confirmation is removed either way. Errors only if the cache
    /// itself cannot be updated.
    pub async fn deactivate(
        &self,
        license_key: &str,
        item_name: &str,
        site_url: &str,
    ) -> Result<(), Svg2PngError> {
        let request = LicenseRequest::new(LicenseAction::Deactivate, license_key, item_name, site_url);
        match self.endpoint.call(&request).await {
            Ok(response) => debug!(
                license = %license_key,
                status = response.license.as_deref().unwrap_or("<missing>"),
                "License store answered deactivation"
            ),
            Err(e) => warn!(license = %license_key, "License deactivation request failed: {}", e),
        }

        self.cache.delete(license_key)?;
        info!(license = %license_key, "License confirmation cleared");
        Ok(())
    }

    /// The live cached confirmation for `license_key`, if any.
    pub fn status(&self, license_key: &str) -> Result<Option<LicenseCacheEntry>, Svg2PngError> {
        Ok(self.cache.get(license_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LicenseError;
    use client::LicenseResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use store::MemoryCacheStore;

    struct FixedEndpoint {
        license: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LicenseEndpoint for FixedEndpoint {
        async fn call(&self, _request: &LicenseRequest) -> Result<LicenseResponse, LicenseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LicenseResponse {
                license: Some(self.license.to_string()),
                ..LicenseResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn status_reflects_activation() {
        let endpoint = Arc::new(FixedEndpoint {
            license: "valid",
            calls: AtomicUsize::new(0),
        });
        let cache = LicenseCache::new(
            endpoint.clone(),
            Arc::new(MemoryCacheStore::new()),
            chrono::Duration::days(30),
        );

        assert!(cache.status("svg2png").unwrap().is_none());
        assert!(cache.ensure_active("svg2png", "Svg2Png", "https://example.com").await);
        assert!(cache.status("svg2png").unwrap().is_some());
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }
}
