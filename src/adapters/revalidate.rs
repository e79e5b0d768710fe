//! Static page revalidation
//!
//! Asks the web host to rebuild a market's cached pages once the market has
//! been rewritten. Each request is awaited up to a fixed timeout; failures
//! are logged only.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RevalidationConfig;
use crate::error::{MigrationError, Result};
use crate::store::{NoopInvalidator, PageInvalidator};

const REVALIDATE_ENDPOINT: &str = "/api/v0/revalidate";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Revalidation client for the web host's revalidate endpoint
#[derive(Clone)]
pub struct HttpRevalidator {
    client: Client,
    base_url: String,
    api_secret: String,
}

impl HttpRevalidator {
    pub fn new(base_url: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret: api_secret.into(),
        }
    }

    /// Build the invalidator described by `config`; a no-op when disabled
    pub fn from_config(config: &RevalidationConfig) -> Result<Arc<dyn PageInvalidator>> {
        if !config.enabled {
            return Ok(Arc::new(NoopInvalidator));
        }
        match (&config.base_url, &config.api_secret) {
            (Some(base_url), Some(secret)) => Ok(Arc::new(Self::new(base_url.clone(), secret.clone()))),
            _ => Err(MigrationError::Validation(
                "revalidation enabled without base_url and api_secret".to_string(),
            )),
        }
    }

    /// Request URL for revalidating `path`
    pub fn request_url(&self, path: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}{}", self.base_url, REVALIDATE_ENDPOINT),
            &[("pathToRevalidate", path), ("apiSecret", self.api_secret.as_str())],
        )
        .map_err(|e| MigrationError::Validation(format!("bad revalidation url: {e}")))
    }

    async fn send(&self, url: Url, path: &str) {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(path, "Revalidated page");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(path, "Revalidation failed: {} - {}", status, body);
            }
            Err(e) => {
                warn!(path, "Revalidation request failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl PageInvalidator for HttpRevalidator {
    async fn invalidate(&self, path: &str) {
        let url = match self.request_url(path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path, "{}", e);
                return;
            }
        };

        if tokio::time::timeout(REQUEST_TIMEOUT, self.send(url, path))
            .await
            .is_err()
        {
            warn!(path, "Revalidation timed out after {:?}", REQUEST_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_encodes_params() {
        let revalidator = HttpRevalidator::new("https://manifold.markets/", "s3cret&x");
        let url = revalidator.request_url("/alice/who-wins").unwrap();

        assert_eq!(url.path(), "/api/v0/revalidate");
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            params,
            vec![
                ("pathToRevalidate".to_string(), "/alice/who-wins".to_string()),
                ("apiSecret".to_string(), "s3cret&x".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_config_disabled_is_noop() {
        let config = RevalidationConfig::default();
        assert!(HttpRevalidator::from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_requires_secret() {
        let config = RevalidationConfig {
            enabled: true,
            base_url: Some("https://example.com".to_string()),
            api_secret: None,
        };
        assert!(matches!(
            HttpRevalidator::from_config(&config),
            Err(MigrationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_unreachable_host_completes() {
        let revalidator = HttpRevalidator::new("http://127.0.0.1:9", "secret");
        let started = std::time::Instant::now();
        revalidator.invalidate("/alice/who-wins").await;
        assert!(started.elapsed() <= REQUEST_TIMEOUT + Duration::from_secs(1));
    }
}
