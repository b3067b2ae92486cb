//! Entitlement verification against the origin's subscription-check endpoint.

use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::metrics::{VERIFICATION_FAILURES, VERIFICATION_LATENCY};

/// Entitlement answers are a handful of fields; anything bigger is not one.
const MAX_ENTITLEMENT_BODY_BYTES: usize = 64 * 1024;

/// Body of a successful subscription check.
///
/// Field names are the wire contract of `/api/v1/subscription/check`.
/// Extra fields (status, expiry, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntitlementResult {
    #[serde(default = "default_valid")]
    pub valid: bool,
    pub has_active_subscription: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum VerificationError {
    /// Token rejected: HTTP 401 or an explicit `valid: false`
    #[error("token rejected by entitlement service")]
    Unauthorized,

    #[error("entitlement service returned HTTP {0}")]
    Status(u16),

    #[error("entitlement request failed: {0}")]
    Transport(String),

    #[error("entitlement service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed entitlement response: {0}")]
    Malformed(String),
}

impl VerificationError {
    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::Unauthorized => "unauthorized",
            VerificationError::Status(_) => "status",
            VerificationError::Transport(_) => "transport",
            VerificationError::Timeout(_) => "timeout",
            VerificationError::Malformed(_) => "malformed",
        }
    }
}

/// Client for the entitlement-check endpoint.
///
/// Issues exactly one request per call; retries are left to the caller's
/// infrastructure, never done here.
#[derive(Clone)]
pub struct EntitlementClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl EntitlementClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the entitlement service whether `token` is valid and subscribed.
    pub async fn verify(&self, token: &str) -> Result<EntitlementResult, VerificationError> {
        let started = Instant::now();
        let result = self.check(token).await;
        VERIFICATION_LATENCY.observe(started.elapsed().as_secs_f64());

        if let Err(ref e) = result {
            VERIFICATION_FAILURES.with_label_values(&[e.reason()]).inc();
        }
        result
    }

    async fn check(&self, token: &str) -> Result<EntitlementResult, VerificationError> {
        let mut response = self
            .http
            .get(&self.url)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VerificationError::Unauthorized);
        }
        if status != reqwest::StatusCode::OK {
            return Err(VerificationError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|cl| cl > MAX_ENTITLEMENT_BODY_BYTES as u64)
        {
            return Err(too_large());
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport_error(e))? {
            if body.len() + chunk.len() > MAX_ENTITLEMENT_BODY_BYTES {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let result: EntitlementResult = serde_json::from_slice(&body)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;

        if !result.valid {
            return Err(VerificationError::Unauthorized);
        }
        Ok(result)
    }

    fn transport_error(&self, e: reqwest::Error) -> VerificationError {
        if e.is_timeout() {
            VerificationError::Timeout(self.timeout)
        } else {
            VerificationError::Transport(e.to_string())
        }
    }
}

fn too_large() -> VerificationError {
    VerificationError::Malformed(format!(
        "response exceeds {MAX_ENTITLEMENT_BODY_BYTES} bytes"
    ))
}
