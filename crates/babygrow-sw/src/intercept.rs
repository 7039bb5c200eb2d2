//! Request classification: which requests the controller may touch.

use http::Method;
use tracing::trace;
use url::Url;

use crate::request::Request;

/// Why a request was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassReason {
    /// Only GET requests are cached.
    NonGetMethod(Method),
    /// URL matched an exclusion pattern.
    Excluded(String),
}

/// Classification of an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptAction {
    /// Serve through the cache policy.
    Handle,
    /// Pass straight through to the network; the cache is never touched.
    Bypass(BypassReason),
}

/// The exclusion set for live-only paths (auth and API calls).
///
/// Each pattern is a substring tested against the whole URL, query included.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    patterns: Vec<String>,
}

impl ExclusionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_substrings<S: AsRef<str>>(substrings: &[S]) -> Self {
        Self {
            patterns: substrings.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// First pattern found in `url`.
    pub fn matching(&self, url: &Url) -> Option<&str> {
        let url = url.as_str();
        self.patterns
            .iter()
            .map(String::as_str)
            .find(|pattern| url.contains(pattern))
    }

    /// Decide whether the controller handles `request`. Method is checked first.
    pub fn classify(&self, request: &Request) -> InterceptAction {
        if request.method != Method::GET {
            trace!(url = %request.url, method = %request.method, "Bypassing non-GET request");
            return InterceptAction::Bypass(BypassReason::NonGetMethod(request.method.clone()));
        }

        if let Some(pattern) = self.matching(&request.url) {
            trace!(url = %request.url, pattern, "Bypassing excluded request");
            return InterceptAction::Bypass(BypassReason::Excluded(pattern.to_string()));
        }

        InterceptAction::Handle
    }
}
