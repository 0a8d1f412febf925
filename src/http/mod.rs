//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → head.rs (read + parse first request head)
//!     → Upgrade?  yes → websocket.rs (hand-written handshake, raw splice)
//!                 no  → server.rs (hyper http1 + axum router)
//!                       → forward.rs (route, rewrite, forward)
//!                       → request.rs (Host / Origin rewrite)
//!                       → response.rs (header filter, 502)
//!                       → Send to client
//! ```

pub mod forward;
pub mod head;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::{proxy_handler, AppState};
pub use head::{read_request_head, HeadRead, RequestHead};
pub use request::BackendIdentity;
pub use server::{HttpServer, ServerError};
pub use websocket::{compose_upgrade_request, splice, splice_upgrade, SpliceError, SpliceStats};
