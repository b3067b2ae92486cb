use crate::config::{ConfigError, GatewayConfig};
use crate::error::GatewayError;
use crate::forward::ForwardLimits;
use crate::rules::PathRules;
use crate::verifier::EntitlementClient;
use std::sync::Arc;

/// Shared application state. Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub rules: Arc<PathRules>,
    pub verifier: EntitlementClient,
    pub http_client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, StateError> {
        let rules = PathRules::new(&config.protected_patterns, config.public_paths.clone())
            .map_err(ConfigError::from)?;

        // Origin redirects belong to the browser, not to us
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to create HTTP client: {e}")))?;

        let verifier = EntitlementClient::new(
            http_client.clone(),
            config.entitlement_url.clone(),
            config.verify_timeout,
        );

        Ok(Self {
            config: Arc::new(config),
            rules: Arc::new(rules),
            verifier,
            http_client,
        })
    }

    pub fn forward_limits(&self) -> ForwardLimits {
        ForwardLimits {
            timeout: self.config.forward_timeout,
            max_request_bytes: self.config.max_body_bytes,
            max_response_bytes: self.config.max_body_bytes,
        }
    }
}
