//! License store client.
//!
//! The store is an Easy Digital Downloads shop with the Software Licensing
//! extension. Activation and deactivation are form-encoded `POST`s to the
//! store root; the reply is a JSON document whose `license` field reads
//! `"valid"` when the license is active for the site.

use crate::config::LicenseConfig;
use crate::error::{LicenseError, Svg2PngError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Value of the `license` field for an active license.
pub const LICENSE_VALID: &str = "valid";

/// Actions understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseAction {
    #[serde(rename = "activate_license")]
    Activate,
    #[serde(rename = "deactivate_license")]
    Deactivate,
}

impl LicenseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseAction::Activate => "activate_license",
            LicenseAction::Deactivate => "deactivate_license",
        }
    }
}

/// The form body of a license request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseRequest {
    pub edd_action: LicenseAction,
    pub license: String,
    pub item_name: String,
    pub url: String,
}

impl LicenseRequest {
    pub fn new(action: LicenseAction, license_key: &str, item_name: &str, site_url: &str) -> Self {
        Self {
            edd_action: action,
            license: license_key.to_string(),
            item_name: item_name.to_string(),
            url: site_url.to_string(),
        }
    }
}

/// The parts of the store's reply this crate looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LicenseResponse {
    #[serde(default)]
    pub success: Option<bool>,
    /// `"valid"`, `"invalid"`, `"expired"`, `"deactivated"`, …
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
}

impl LicenseResponse {
    /// Whether the store confirmed the license as valid.
    pub fn is_valid(&self) -> bool {
        self.license.as_deref() == Some(LICENSE_VALID)
    }
}

/// The remote license store.
#[async_trait]
pub trait LicenseEndpoint: Send + Sync {
    async fn call(&self, request: &LicenseRequest) -> Result<LicenseResponse, LicenseError>;
}

/// HTTP client for an EDD license store.
#[derive(Debug, Clone)]
pub struct EddLicenseClient {
    http: reqwest::Client,
    store_url: String,
}

impl EddLicenseClient {
    /// Build a client with the configured timeout.
    ///
    /// Certificates are verified unless `config.accept_invalid_certs` is set.
    pub fn new(config: &LicenseConfig) -> Result<Self, Svg2PngError> {
        if config.accept_invalid_certs {
            warn!(
                store = %config.store_url,
                "TLS certificate verification is disabled for the license store"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Svg2PngError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            store_url: config.store_url.clone(),
        })
    }
}

#[async_trait]
impl LicenseEndpoint for EddLicenseClient {
    async fn call(&self, request: &LicenseRequest) -> Result<LicenseResponse, LicenseError> {
        debug!(
            action = request.edd_action.as_str(),
            license = %request.license,
            "Calling license store {}",
            self.store_url
        );

        let response = self
            .http
            .post(&self.store_url)
            .form(request)
            .send()
            .await
            .map_err(|e| LicenseError::Transport {
                url: self.store_url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LicenseError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| LicenseError::Transport {
            url: self.store_url.clone(),
            reason: e.to_string(),
        })?;
        parse_response(&body)
    }
}

/// Decode the store's JSON reply.
pub(crate) fn parse_response(body: &[u8]) -> Result<LicenseResponse, LicenseError> {
    serde_json::from_slice(body).map_err(|e| LicenseError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_encodes_like_the_store_expects() {
        let req = LicenseRequest::new(
            LicenseAction::Activate,
            "svg2png",
            "Svg2Png",
            "https://example.com",
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["edd_action"], "activate_license");
        assert_eq!(json["license"], "svg2png");
        assert_eq!(json["item_name"], "Svg2Png");
        assert_eq!(json["url"], "https://example.com");
    }

    #[test]
    fn action_names() {
        assert_eq!(LicenseAction::Activate.as_str(), "activate_license");
        assert_eq!(LicenseAction::Deactivate.as_str(), "deactivate_license");
    }

    #[test]
    fn parse_valid_and_invalid() {
        let ok = parse_response(br#"{"success":true,"license":"valid","expires":"lifetime"}"#).unwrap();
        assert!(ok.is_valid());

        let expired = parse_response(br#"{"success":false,"license":"expired"}"#).unwrap();
        assert!(!expired.is_valid());

        let missing = parse_response(br#"{"success":false}"#).unwrap();
        assert!(!missing.is_valid());
    }

    #[test]
    fn parse_garbage_is_decode_error() {
        assert!(matches!(
            parse_response(b"<html>502</html>"),
            Err(LicenseError::Decode(_))
        ));
    }

    #[test]
    fn client_builds_with_and_without_verification() {
        assert!(EddLicenseClient::new(&LicenseConfig::default()).is_ok());
        assert!(EddLicenseClient::new(&LicenseConfig::default().accept_invalid_certs(true)).is_ok());
    }
}
