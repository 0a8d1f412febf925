//! OAuth callback repair.
//!
//! Some hop in front of the proxy decodes the callback query with form rules,
//! so a `+` inside the base64 `state` value arrives as a literal space. On the
//! callback path this router turns those spaces back into `+` before the
//! request reaches the backend.
//!
//! Requests that need no repair are never re-serialized: the caller forwards
//! the original bytes.

use crate::config::OAuthConfig;
use crate::routing::matcher::PathContainsMatcher;
use crate::routing::query::QueryParams;

/// Where a request should be sent on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedPath {
    /// Forward the original path and query untouched.
    Passthrough,
    /// Forward this path instead.
    Rewritten {
        path: String,
        /// Number of spaces replaced in the state value.
        spaces: usize,
    },
}

impl RoutedPath {
    /// Resolve to the path-and-query that goes on the wire.
    pub fn resolve<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            RoutedPath::Passthrough => original,
            RoutedPath::Rewritten { path, .. } => path,
        }
    }
}

/// Compiled routing rules. Immutable after construction.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    callback: PathContainsMatcher,
    state_param: String,
}

impl RequestRouter {
    pub fn new(callback_path: impl Into<String>, state_param: impl Into<String>) -> Self {
        Self {
            callback: PathContainsMatcher::new(callback_path),
            state_param: state_param.into(),
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(config.callback_path.clone(), config.state_param.clone())
    }

    /// Decide whether `path_and_query` (origin-form request target) needs its
    /// state parameter repaired.
    pub fn route(&self, path_and_query: &str) -> RoutedPath {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => return RoutedPath::Passthrough,
        };

        if !self.callback.matches(path) {
            return RoutedPath::Passthrough;
        }

        let mut params = QueryParams::parse(query);
        let Some(state) = params.get(&self.state_param) else {
            return RoutedPath::Passthrough;
        };

        let spaces = state.matches(' ').count();
        if spaces == 0 {
            return RoutedPath::Passthrough;
        }

        let fixed = state.replace(' ', "+");
        params.set(self.state_param.clone(), fixed);

        RoutedPath::Rewritten {
            path: format!("{}?{}", path, params.serialize()),
            spaces,
        }
    }
}

impl Default for RequestRouter {
    fn default() -> Self {
        Self::from_config(&OAuthConfig::default())
    }
}
