//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request target (path + raw query)
//!     → matcher.rs (is this the OAuth callback?)
//!     → query.rs (decode / re-encode parameters)
//!     → router.rs (repair state, or pass through)
//!     → Return: RoutedPath::Passthrough or RoutedPath::Rewritten
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - Pure functions, no I/O
//! - Unchanged requests keep their original bytes

pub mod matcher;
pub mod query;
pub mod router;

pub use matcher::PathContainsMatcher;
pub use query::QueryParams;
pub use router::{RequestRouter, RoutedPath};
