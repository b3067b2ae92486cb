use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap as UpstreamHeaders, HeaderName as UpstreamName};
use std::time::{Duration, Instant};

use crate::decision::{TrustHeaders, USER_ID_HEADER, USER_PLAN_HEADER};
use crate::error::GatewayError;
use crate::metrics::FORWARD_LATENCY;

/// Connection-scoped headers that must not cross the gateway in either
/// direction (RFC 9110 §7.6.1), plus framing headers the client recomputes.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Dropped from the outbound request only; recomputed from the origin URL and body.
const REQUEST_HEADERS_TO_RECOMPUTE: &[&str] = &["host", "content-length"];

/// Settings for one forwarded request.
#[derive(Debug, Clone, Copy)]
pub struct ForwardLimits {
    pub timeout: Duration,
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
}

/// Header names a peer listed in `Connection`; they are hop-by-hop as well.
fn connection_listed<'a>(values: impl Iterator<Item = &'a [u8]>) -> Vec<String> {
    values
        .filter_map(|v| std::str::from_utf8(v).ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &str, listed: &[String]) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name) || listed.iter().any(|l| l == name)
}

/// Drain the client body once the request is known to be forwarded.
///
/// Reads at most `max` bytes; a declared or actual overflow stops the read.
pub async fn read_request_body(
    mut payload: web::Payload,
    content_length: Option<u64>,
    max: usize,
) -> Result<Bytes, GatewayError> {
    if content_length.is_some_and(|cl| cl > max as u64) {
        return Err(GatewayError::RequestTooLarge { max });
    }

    let mut body = BytesMut::with_capacity(content_length.unwrap_or(0).min(max as u64) as usize);
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| GatewayError::RequestBody(e.to_string()))?;
        if body.len() + chunk.len() > max {
            return Err(GatewayError::RequestTooLarge { max });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Join the origin base URL with the request's path and query.
pub fn origin_target(origin_url: &str, path_and_query: &str) -> Result<String, GatewayError> {
    if !path_and_query.starts_with('/') || path_and_query.starts_with("//") {
        return Err(GatewayError::InvalidOrigin(format!(
            "refusing to forward non-origin-form target {path_and_query:?}"
        )));
    }
    let target = format!("{}{}", origin_url.trim_end_matches('/'), path_and_query);
    url::Url::parse(&target).map_err(|e| GatewayError::InvalidOrigin(e.to_string()))?;
    Ok(target)
}

/// Copy the client's headers for the origin request.
///
/// Every end-to-end header is kept and repeated values stay in their
/// received order. With `trust` set, any
/// client-supplied identity headers are replaced by the verified ones, which
/// are appended last.
pub fn outbound_headers(
    req: &HttpRequest,
    trust: Option<&TrustHeaders>,
) -> Result<UpstreamHeaders, GatewayError> {
    let mut headers = UpstreamHeaders::new();
    let listed = connection_listed(
        req.headers()
            .get_all("connection")
            .map(|v| v.as_bytes()),
    );

    for (name, value) in req.headers() {
        let name_lower = name.as_str();
        if is_hop_by_hop(name_lower, &listed) || REQUEST_HEADERS_TO_RECOMPUTE.contains(&name_lower)
        {
            continue;
        }
        if trust.is_some() && (name_lower == USER_ID_HEADER || name_lower == USER_PLAN_HEADER) {
            continue;
        }

        let upstream_name = UpstreamName::from_bytes(name.as_str().as_bytes())
            .map_err(|e| GatewayError::Internal(format!("header name {name}: {e}")))?;
        let upstream_value = reqwest::header::HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| GatewayError::Internal(format!("header value for {name}: {e}")))?;
        headers.append(upstream_name, upstream_value);
    }

    if let Some(trust) = trust {
        for (name, value) in [(USER_ID_HEADER, &trust.user_id), (USER_PLAN_HEADER, &trust.plan)] {
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| GatewayError::Internal(format!("trust header {name}: {e}")))?;
            headers.append(UpstreamName::from_static(name), value);
        }
    }

    Ok(headers)
}

/// Send the request to the origin and relay its answer.
///
/// Method, body bytes and end-to-end headers go through as received; origin
/// redirects are returned to the caller rather than followed.
pub async fn forward_request(
    client: &reqwest::Client,
    origin_url: &str,
    req: &HttpRequest,
    body: Bytes,
    trust: Option<&TrustHeaders>,
    limits: ForwardLimits,
) -> Result<HttpResponse, GatewayError> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = origin_target(origin_url, path_and_query)?;

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| GatewayError::UnsupportedMethod(req.method().to_string()))?;

    let mut request_builder = client
        .request(method, &target)
        .headers(outbound_headers(req, trust)?)
        .timeout(limits.timeout);

    if !body.is_empty() || req.headers().contains_key("content-length") {
        request_builder = request_builder.body(body);
    }

    let started = Instant::now();
    let mut response = request_builder.send().await.map_err(|e| {
        tracing::error!(error = %e, target = %target, "origin request failed");
        GatewayError::Upstream("origin request failed".to_string())
    })?;

    let status = response.status();
    let headers = response.headers().clone();

    if let Some(cl) = response.content_length() {
        if cl > limits.max_response_bytes as u64 {
            return Err(GatewayError::ResponseTooLarge {
                max: limits.max_response_bytes,
            });
        }
    }

    // Enforce the limit while reading, for chunked bodies without Content-Length
    let mut body_buf = Vec::with_capacity(
        response
            .content_length()
            .map(|cl| cl as usize)
            .unwrap_or(8192)
            .min(limits.max_response_bytes),
    );
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        tracing::error!(error = %e, "failed to read origin response body");
        GatewayError::Upstream("failed to read origin response".to_string())
    })? {
        if body_buf.len() + chunk.len() > limits.max_response_bytes {
            return Err(GatewayError::ResponseTooLarge {
                max: limits.max_response_bytes,
            });
        }
        body_buf.extend_from_slice(&chunk);
    }
    FORWARD_LATENCY.observe(started.elapsed().as_secs_f64());

    let status = actix_web::http::StatusCode::from_u16(status.as_u16())
        .map_err(|e| GatewayError::Upstream(format!("invalid origin status: {e}")))?;
    let mut builder = HttpResponse::build(status);

    // Set-Cookie and friends may repeat, so append rather than insert
    for header in relayed_response_headers(&headers) {
        builder.append_header(header);
    }

    Ok(builder.body(Bytes::from(body_buf)))
}

/// Origin response headers the client should see, in received order.
fn relayed_response_headers(headers: &UpstreamHeaders) -> Vec<(HeaderName, HeaderValue)> {
    let listed = connection_listed(headers.get_all("connection").iter().map(|v| v.as_bytes()));
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name.as_str(), &listed) && name.as_str() != "content-length"
        })
        .filter_map(|(name, value)| {
            Some((
                HeaderName::from_bytes(name.as_str().as_bytes()).ok()?,
                HeaderValue::from_bytes(value.as_bytes()).ok()?,
            ))
        })
        .collect()
}
