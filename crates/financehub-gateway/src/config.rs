use std::env;
use std::time::Duration;
use url::Url;

use crate::rules::{DEFAULT_PROTECTED_PATTERNS, DEFAULT_PUBLIC_PATHS};

const DEFAULT_PORT: u16 = 8787;
const DEFAULT_ORIGIN_URL: &str = "http://localhost:8084";
const ENTITLEMENT_CHECK_PATH: &str = "/api/v1/subscription/check";
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct GatewayConfig {
    /// Server port
    pub port: u16,
    /// Base URL of the origin that receives forwarded requests
    pub origin_url: String,
    /// Full URL of the entitlement-check endpoint
    pub entitlement_url: String,
    /// Upper bound on one entitlement check
    pub verify_timeout: Duration,
    /// Upper bound on one forwarded request
    pub forward_timeout: Duration,
    /// Regexes marking protected path zones
    pub protected_patterns: Vec<String>,
    /// Exact paths exempt from enforcement
    pub public_paths: Vec<String>,
    /// Redirect target when no valid session is present
    pub login_path: String,
    /// Redirect target when the subscription is inactive
    pub pricing_path: String,
    /// Redirect target when verification or forwarding fails
    pub error_path: String,
    /// Limit for request bodies and buffered origin responses
    pub max_body_bytes: usize,
    /// Attach hardening headers to gateway redirects
    pub security_headers: bool,
    /// Bearer token required for /_gateway/metrics (None = public)
    pub metrics_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("origin_url", &self.origin_url)
            .field("entitlement_url", &self.entitlement_url)
            .field("verify_timeout", &self.verify_timeout)
            .field("forward_timeout", &self.forward_timeout)
            .field("protected_patterns", &self.protected_patterns)
            .field("public_paths", &self.public_paths)
            .field("login_path", &self.login_path)
            .field("pricing_path", &self.pricing_path)
            .field("error_path", &self.error_path)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("security_headers", &self.security_headers)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            entitlement_url: format!("{DEFAULT_ORIGIN_URL}{ENTITLEMENT_CHECK_PATH}"),
            verify_timeout: Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
            forward_timeout: Duration::from_secs(DEFAULT_FORWARD_TIMEOUT_SECS),
            protected_patterns: to_strings(DEFAULT_PROTECTED_PATTERNS),
            public_paths: to_strings(DEFAULT_PUBLIC_PATHS),
            login_path: "/login".to_string(),
            pricing_path: "/pricing".to_string(),
            error_path: "/error".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            security_headers: true,
            metrics_token: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let defaults = Self::default();

        // Optional: port
        let port = match var("PORT") {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT", s))?,
            None => defaults.port,
        };

        // Optional: origin URL
        let origin_url = var("ORIGIN_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.origin_url);
        validate_http_url(&origin_url)?;

        // Optional: entitlement URL, derived from the origin when unset
        let entitlement_url = var("ENTITLEMENT_URL")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| format!("{origin_url}{ENTITLEMENT_CHECK_PATH}"));
        validate_http_url(&entitlement_url)?;

        let verify_timeout = duration_secs(&var, "VERIFY_TIMEOUT_SECS", defaults.verify_timeout)?;
        let forward_timeout =
            duration_secs(&var, "FORWARD_TIMEOUT_SECS", defaults.forward_timeout)?;

        // Optional: rule sets
        let protected_patterns = var("PROTECTED_PATHS")
            .map(|s| split_patterns(&s))
            .unwrap_or(defaults.protected_patterns);
        let public_paths = var("PUBLIC_PATHS")
            .map(|s| split_list(&s))
            .unwrap_or(defaults.public_paths);
        if protected_patterns.is_empty() {
            tracing::warn!("PROTECTED_PATHS is empty; every request will pass through");
        }

        // Optional: redirect targets
        let login_path = redirect_path(&var, "LOGIN_PATH", defaults.login_path)?;
        let pricing_path = redirect_path(&var, "PRICING_PATH", defaults.pricing_path)?;
        let error_path = redirect_path(&var, "ERROR_PATH", defaults.error_path)?;

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MAX_BODY_BYTES", s))?,
            None => defaults.max_body_bytes,
        };

        let security_headers = match var("SECURITY_HEADERS") {
            Some(s) => parse_bool(&s).ok_or(ConfigError::InvalidValue("SECURITY_HEADERS", s))?,
            None => defaults.security_headers,
        };

        // Optional: metrics token
        let metrics_token = var("METRICS_TOKEN");
        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set; /_gateway/metrics is publicly accessible");
        }

        Ok(Self {
            port,
            origin_url,
            entitlement_url,
            verify_timeout,
            forward_timeout,
            protected_patterns,
            public_paths,
            login_path,
            pricing_path,
            error_path,
            max_body_bytes,
            security_headers,
            metrics_token,
        })
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a comma-separated regex list, keeping commas that belong to a
/// pattern: escaped (`\,`), inside a class (`[,]`), or inside a group or
/// repetition (`(a|,)`, `{1,3}`).
fn split_patterns(s: &str) -> Vec<String> {
    let mut patterns = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' | '{' if !in_class => depth += 1,
            ')' | '}' if !in_class => depth = depth.saturating_sub(1),
            ',' if !in_class && depth == 0 => {
                patterns.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    patterns.push(current);

    patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_http_url(s: &str) -> Result<(), ConfigError> {
    let url = Url::parse(s).map_err(|_| ConfigError::InvalidUrl(s.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl(s.to_string())),
    }
}

fn duration_secs(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match var(key) {
        Some(s) => {
            let parsed = s.trim().parse::<u64>();
            match parsed {
                Ok(0) | Err(_) => Err(ConfigError::InvalidValue(key, s)),
                Ok(secs) => Ok(Duration::from_secs(secs)),
            }
        }
        None => Ok(default),
    }
}

/// Redirect targets must stay on this site.
fn redirect_path(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: String,
) -> Result<String, ConfigError> {
    match var(key) {
        Some(s) => {
            let s = s.trim().to_string();
            if !s.starts_with('/') || s.starts_with("//") {
                return Err(ConfigError::InvalidValue(key, s));
            }
            Ok(s)
        }
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid path pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
