//! Per-request decision state machine and redirect framing.
//!
//! Every request ends in exactly one [`GatewayDecision`]. Classification runs
//! first, then token extraction, then (only for enforced paths with a token)
//! the single entitlement check; nothing is forwarded before the check
//! completes.

use actix_web::http::header::{HeaderMap, CACHE_CONTROL, LOCATION};
use actix_web::HttpResponse;

use crate::config::GatewayConfig;
use crate::credentials::extract_token;
use crate::error::truncate_for_log;
use crate::rules::PathRules;
use crate::verifier::{EntitlementClient, EntitlementResult, VerificationError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_PLAN_HEADER: &str = "x-user-plan";

/// Hardening headers the FinanceHub backend sends on its own responses,
/// reused on gateway-generated redirects.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    (
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains",
    ),
    ("X-Permitted-Cross-Domain-Policies", "none"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
];

/// Verified identity injected into the forwarded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustHeaders {
    pub user_id: String,
    pub plan: String,
}

impl TrustHeaders {
    /// Returns `None` when the identity is missing or cannot be sent as a
    /// header value.
    pub fn from_entitlement(result: &EntitlementResult) -> Option<Self> {
        let user_id = result.user_id.as_deref().filter(|v| is_header_safe(v))?;
        let plan = result.plan.as_deref().filter(|v| is_header_safe(v))?;
        Some(Self {
            user_id: user_id.to_string(),
            plan: plan.to_string(),
        })
    }
}

fn is_header_safe(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    /// Pass the request to the origin. Trust headers are present only when
    /// the path was enforced and verification succeeded.
    Forward(Option<TrustHeaders>),
    /// `next` is the original path and query, unencoded.
    RedirectLogin { next: String },
    RedirectPricing,
    RedirectError,
}

impl GatewayDecision {
    pub fn label(&self) -> &'static str {
        match self {
            GatewayDecision::Forward(_) => "forward",
            GatewayDecision::RedirectLogin { .. } => "redirect_login",
            GatewayDecision::RedirectPricing => "redirect_pricing",
            GatewayDecision::RedirectError => "redirect_error",
        }
    }

    /// Location for redirect decisions, `None` for `Forward`.
    pub fn location(&self, config: &GatewayConfig) -> Option<String> {
        match self {
            GatewayDecision::Forward(_) => None,
            GatewayDecision::RedirectLogin { next } => {
                Some(login_location(&config.login_path, next))
            }
            GatewayDecision::RedirectPricing => Some(config.pricing_path.clone()),
            GatewayDecision::RedirectError => Some(config.error_path.clone()),
        }
    }
}

/// Run the pipeline up to (not including) forwarding.
pub async fn decide(
    rules: &PathRules,
    verifier: &EntitlementClient,
    path: &str,
    path_and_query: &str,
    headers: &HeaderMap,
) -> GatewayDecision {
    if !rules.should_enforce(path) {
        return GatewayDecision::Forward(None);
    }

    let Some(token) = extract_token(headers) else {
        tracing::debug!(path = %path, "no credential on protected path");
        return GatewayDecision::RedirectLogin {
            next: path_and_query.to_string(),
        };
    };

    let result = verifier.verify(&token).await;
    from_verification(result, path, path_and_query)
}

/// Map a finished entitlement check onto a terminal decision.
pub fn from_verification(
    result: Result<EntitlementResult, VerificationError>,
    path: &str,
    path_and_query: &str,
) -> GatewayDecision {
    match result {
        Ok(entitlement) if !entitlement.has_active_subscription => {
            GatewayDecision::RedirectPricing
        }
        Ok(entitlement) => match TrustHeaders::from_entitlement(&entitlement) {
            Some(trust) => GatewayDecision::Forward(Some(trust)),
            None => {
                tracing::error!(
                    path = %path,
                    "entitlement response lacks a usable user_id or plan"
                );
                GatewayDecision::RedirectError
            }
        },
        Err(VerificationError::Unauthorized) => GatewayDecision::RedirectLogin {
            next: path_and_query.to_string(),
        },
        Err(e) => {
            tracing::error!(
                path = %path,
                reason = e.reason(),
                error = %truncate_for_log(&e.to_string()),
                "subscription check failed"
            );
            GatewayDecision::RedirectError
        }
    }
}

pub fn login_location(login_path: &str, next: &str) -> String {
    format!("{}?next={}", login_path, urlencoding::encode(next))
}

/// 302 to `location`, never cached.
pub fn redirect_response(location: &str, security_headers: bool) -> HttpResponse {
    let mut builder = HttpResponse::Found();
    builder
        .insert_header((LOCATION, location))
        .insert_header((CACHE_CONTROL, "no-store"));
    if security_headers {
        for &(name, value) in SECURITY_HEADERS {
            builder.insert_header((name, value));
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entitlement(active: bool, user_id: Option<&str>, plan: Option<&str>) -> EntitlementResult {
        EntitlementResult {
            valid: true,
            has_active_subscription: active,
            user_id: user_id.map(String::from),
            plan: plan.map(String::from),
        }
    }

    #[test]
    fn test_active_subscription_forwards_with_identity() {
        let decision = from_verification(
            Ok(entitlement(true, Some("u1"), Some("pro"))),
            "/financehub",
            "/financehub",
        );
        assert_eq!(
            decision,
            GatewayDecision::Forward(Some(TrustHeaders {
                user_id: "u1".into(),
                plan: "pro".into(),
            }))
        );
    }

    #[test]
    fn test_inactive_subscription_goes_to_pricing() {
        let decision = from_verification(
            Ok(entitlement(false, Some("u1"), Some("free"))),
            "/financehub",
            "/financehub",
        );
        assert_eq!(decision, GatewayDecision::RedirectPricing);

        let decision = from_verification(Ok(entitlement(false, None, None)), "/x", "/x");
        assert_eq!(decision, GatewayDecision::RedirectPricing);
    }

    #[test]
    fn test_unauthorized_goes_to_login() {
        let decision = from_verification(
            Err(VerificationError::Unauthorized),
            "/financehub/watchlist",
            "/financehub/watchlist?tab=2",
        );
        assert_eq!(
            decision,
            GatewayDecision::RedirectLogin {
                next: "/financehub/watchlist?tab=2".into()
            }
        );
    }

    #[test]
    fn test_other_failures_go_to_error() {
        for err in [
            VerificationError::Status(500),
            VerificationError::Transport("connection refused".into()),
            VerificationError::Timeout(std::time::Duration::from_secs(10)),
            VerificationError::Malformed("expected value".into()),
        ] {
            assert_eq!(
                from_verification(Err(err), "/financehub", "/financehub"),
                GatewayDecision::RedirectError
            );
        }
    }

    #[test]
    fn test_active_without_identity_is_an_error() {
        let decision = from_verification(Ok(entitlement(true, None, Some("pro"))), "/f", "/f");
        assert_eq!(decision, GatewayDecision::RedirectError);

        let decision =
            from_verification(Ok(entitlement(true, Some("u1\r\nx: y"), Some("pro"))), "/f", "/f");
        assert_eq!(decision, GatewayDecision::RedirectError);

        let decision = from_verification(Ok(entitlement(true, Some("u1"), Some(""))), "/f", "/f");
        assert_eq!(decision, GatewayDecision::RedirectError);
    }

    #[test]
    fn test_login_location_encodes_path_and_query() {
        assert_eq!(
            login_location("/login", "/financehub/stocks?ticker=AAPL&range=1y"),
            "/login?next=%2Ffinancehub%2Fstocks%3Fticker%3DAAPL%26range%3D1y"
        );
        assert_eq!(login_location("/login", "/financehub"), "/login?next=%2Ffinancehub");
    }

    #[test]
    fn test_locations() {
        let config = GatewayConfig::default();
        assert_eq!(GatewayDecision::Forward(None).location(&config), None);
        assert_eq!(
            GatewayDecision::RedirectPricing.location(&config).as_deref(),
            Some("/pricing")
        );
        assert_eq!(
            GatewayDecision::RedirectError.location(&config).as_deref(),
            Some("/error")
        );
        assert_eq!(
            GatewayDecision::RedirectLogin { next: "/financehub".into() }
                .location(&config)
                .as_deref(),
            Some("/login?next=%2Ffinancehub")
        );
    }

    #[test]
    fn test_redirect_response() {
        let resp = redirect_response("/pricing", true);
        assert_eq!(resp.status(), 302);
        assert_eq!(resp.headers().get(LOCATION).unwrap(), "/pricing");
        assert_eq!(resp.headers().get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");

        let resp = redirect_response("/error", false);
        assert!(resp.headers().get("x-frame-options").is_none());
    }

    #[test]
    fn test_labels() {
        assert_eq!(GatewayDecision::Forward(None).label(), "forward");
        assert_eq!(GatewayDecision::RedirectError.label(), "redirect_error");
    }
}
