//! Request path matching.
//!
//! # Design Decisions
//! - Matching looks at the path only, never the query string
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

/// Matches when the path contains a fixed fragment anywhere.
///
/// Substring containment tolerates the backend being mounted under a
/// prefix (`/n8n/rest/oauth2-credential/callback`).
#[derive(Debug, Clone)]
pub struct PathContainsMatcher {
    fragment: String,
}

impl PathContainsMatcher {
    /// Create a new path fragment matcher.
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
        }
    }

    /// `path` must not include the query string.
    pub fn matches(&self, path: &str) -> bool {
        path.contains(&self.fragment)
    }
}
