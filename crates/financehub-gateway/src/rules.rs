//! Path classification: decides whether a request path needs identity and
//! subscription enforcement.
//!
//! Rules are compiled once at startup and never mutated afterwards, so a
//! single [`PathRules`] can be shared by every in-flight request.

use regex::Regex;
use std::collections::HashSet;

/// Application namespaces that require an active subscription.
/// `\b` keeps `/financehub-beta` protected while leaving `/financehubx` alone.
pub const DEFAULT_PROTECTED_PATTERNS: &[&str] = &[r"^/financehub\b", r"^/api/v1/financehub\b"];

/// Exact paths that stay reachable without a session: the login flow itself
/// and the subscription lookups the frontend performs before login.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/callback",
    "/api/v1/auth/refresh",
    "/api/v1/subscription/check",
    "/api/v1/subscription/plans",
];

/// Result of classifying one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathClass {
    pub is_protected: bool,
    pub is_public_exception: bool,
}

impl PathClass {
    pub fn should_enforce(&self) -> bool {
        self.is_protected && !self.is_public_exception
    }
}

/// Immutable protected/public rule sets.
#[derive(Debug, Clone)]
pub struct PathRules {
    protected: Vec<Regex>,
    public: HashSet<String>,
}

impl PathRules {
    /// Compile the protected patterns and collect the public exceptions.
    pub fn new<P, E>(
        protected: impl IntoIterator<Item = P>,
        public: impl IntoIterator<Item = E>,
    ) -> Result<Self, regex::Error>
    where
        P: AsRef<str>,
        E: Into<String>,
    {
        let protected = protected
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let public = public.into_iter().map(Into::into).collect();
        Ok(Self { protected, public })
    }

    /// Rules for the FinanceHub deployment.
    #[cfg(test)]
    pub(crate) fn financehub() -> Result<Self, regex::Error> {
        Self::new(
            DEFAULT_PROTECTED_PATTERNS.iter().copied(),
            DEFAULT_PUBLIC_PATHS.iter().copied(),
        )
    }

    /// Classify a request path.
    ///
    /// The protected rules are matched against the raw path, its
    /// percent-decoded form and the normalized decoded form, because the
    /// origin may resolve any of them to the same resource. Exceptions only
    /// apply to an exact match of the raw path.
    pub fn classify(&self, path: &str) -> PathClass {
        let decoded = percent_decode_lossy(path);
        let normalized = normalize_path(&decoded);

        let is_protected = [path, decoded.as_str(), normalized.as_str()]
            .iter()
            .any(|candidate| self.matches_protected(candidate));

        PathClass {
            is_protected,
            is_public_exception: self.public.contains(path),
        }
    }

    pub fn should_enforce(&self, path: &str) -> bool {
        self.classify(path).should_enforce()
    }

    fn matches_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|re| re.is_match(path))
    }
}

fn percent_decode_lossy(path: &str) -> String {
    let bytes = urlencoding::decode_binary(path.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Collapse empty and `.` segments and resolve `..` against the segments
/// seen so far.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
