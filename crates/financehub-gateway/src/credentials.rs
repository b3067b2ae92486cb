//! Bearer token extraction from the `Authorization` header or session cookies.

use actix_web::http::header::{HeaderMap, AUTHORIZATION, COOKIE};
use std::collections::HashMap;

const BEARER_PREFIX: &str = "Bearer ";

/// Cookie names checked in priority order when no bearer header is present.
pub const TOKEN_COOKIES: &[&str] = &["auth_token", "session_token"];

/// Find the caller's token without touching the request.
///
/// `None` means the request is anonymous. Empty values are treated as
/// absent for their source so extraction falls through to the next one.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token.to_string());
    }

    let mut cookies = HashMap::new();
    for value in headers.get_all(COOKIE) {
        // Non-UTF-8 cookie lines carry nothing we could forward as a token
        if let Ok(line) = value.to_str() {
            for (name, value) in parse_cookie_header(line) {
                cookies.entry(name).or_insert(value);
            }
        }
    }

    TOKEN_COOKIES
        .iter()
        .filter_map(|name| cookies.get(name))
        .find(|value| !value.is_empty())
        .map(|value| value.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
}

/// Split a `Cookie` header into name/value pairs.
///
/// Pairs are separated by `"; "` and split on the first `=`, so base64
/// padding and JWT-style values survive intact. Pairs without `=` are
/// skipped.
pub fn parse_cookie_header(header: &str) -> Vec<(&str, &str)> {
    header
        .split("; ")
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                name.parse().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_bearer_header() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(extract_token(&h).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let h = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "auth_token=from-cookie"),
        ]);
        assert_eq!(extract_token(&h).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_non_bearer_authorization_falls_back_to_cookie() {
        let h = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("cookie", "session_token=s1"),
        ]);
        assert_eq!(extract_token(&h).as_deref(), Some("s1"));
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let h = headers(&[("authorization", "bearer lower")]);
        assert_eq!(extract_token(&h), None);
    }

    #[test]
    fn test_auth_token_cookie() {
        let h = headers(&[("cookie", "foo=bar; auth_token=abc123; baz=qux")]);
        assert_eq!(extract_token(&h).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_session_token_cookie() {
        let h = headers(&[("cookie", "session_token=zzz")]);
        assert_eq!(extract_token(&h).as_deref(), Some("zzz"));
    }

    #[test]
    fn test_auth_token_preferred_over_session_token() {
        let h = headers(&[("cookie", "session_token=s; auth_token=a")]);
        assert_eq!(extract_token(&h).as_deref(), Some("a"));
    }

    #[test]
    fn test_cookie_value_with_equals_is_not_truncated() {
        let h = headers(&[("cookie", "auth_token=eyJ0eXAi==.sig=")]);
        assert_eq!(extract_token(&h).as_deref(), Some("eyJ0eXAi==.sig="));
    }

    #[test]
    fn test_malformed_pairs_are_ignored() {
        let h = headers(&[("cookie", "garbage; auth_token=ok; =; novalue")]);
        assert_eq!(extract_token(&h).as_deref(), Some("ok"));
    }

    #[test]
    fn test_cookies_split_across_header_lines() {
        let h = headers(&[("cookie", "theme=dark"), ("cookie", "session_token=split")]);
        assert_eq!(extract_token(&h).as_deref(), Some("split"));
    }

    #[test]
    fn test_no_credentials() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
        let h = headers(&[("cookie", "foo=bar; theme=dark")]);
        assert_eq!(extract_token(&h), None);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let h = headers(&[("authorization", "Bearer "), ("cookie", "auth_token=")]);
        assert_eq!(extract_token(&h), None);

        let h = headers(&[("cookie", "auth_token=; session_token=fallback")]);
        assert_eq!(extract_token(&h).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_parse_cookie_header() {
        assert_eq!(
            parse_cookie_header("a=1; b=2=3; c"),
            vec![("a", "1"), ("b", "2=3")]
        );
        assert!(parse_cookie_header("").is_empty());
    }
}
