//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip `Transfer-Encoding` from backend responses (hyper reframes the body)
//! - Map backend failures to `502 Bad Gateway`

use std::error::Error as StdError;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};

/// Drop headers that must not be copied from the backend verbatim.
pub fn filter_response_headers(headers: &mut HeaderMap) {
    headers.remove(header::TRANSFER_ENCODING);
}

/// Render an error and all of its sources on one line.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// A short plain-text 502 for the client.
pub fn bad_gateway(message: &str) -> Response {
    let mut response = Response::new(Body::from(format!("Proxy error: {message}")));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
