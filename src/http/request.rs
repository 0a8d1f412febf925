//! Outbound request preparation.
//!
//! Only `Host` and `Origin` are ever changed; every other header is
//! forwarded as received.

use axum::http::header::{HeaderMap, HeaderValue, InvalidHeaderValue, CONNECTION, HOST, ORIGIN, UPGRADE};

use crate::config::BackendConfig;
use crate::http::head::wants_upgrade;

/// The identity the backend expects to see on proxied requests.
#[derive(Debug, Clone)]
pub struct BackendIdentity {
    authority: String,
    origin: String,
    host_value: HeaderValue,
    origin_value: HeaderValue,
}

impl BackendIdentity {
    pub fn new(config: &BackendConfig) -> Result<Self, InvalidHeaderValue> {
        let authority = config.authority();
        let origin = config.origin();
        Ok(Self {
            host_value: HeaderValue::from_str(&authority)?,
            origin_value: HeaderValue::from_str(&origin)?,
            authority,
            origin,
        })
    }

    /// `host:port`, used both to connect and as the `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// `http://host:port`, the rewritten `Origin`.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Point `Host` at the backend and, when present, `Origin` too.
pub fn rewrite_request_headers(headers: &mut HeaderMap, backend: &BackendIdentity) {
    headers.insert(HOST, backend.host_value.clone());
    if headers.contains_key(ORIGIN) {
        headers.insert(ORIGIN, backend.origin_value.clone());
    }
}

/// True when the headers ask for a protocol upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    wants_upgrade(
        headers.get(UPGRADE).and_then(|v| v.to_str().ok()),
        headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendIdentity {
        BackendIdentity::new(&BackendConfig {
            host: "localhost".into(),
            port: 5678,
        })
        .unwrap()
    }

    #[test]
    fn rewrites_host_and_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("tunnel.example.com"));
        headers.append(ORIGIN, HeaderValue::from_static("https://tunnel.example.com"));
        headers.append(ORIGIN, HeaderValue::from_static("https://second.example.com"));
        headers.insert("cookie", HeaderValue::from_static("n8n-auth=abc"));

        rewrite_request_headers(&mut headers, &backend());

        assert_eq!(headers[HOST], "localhost:5678");
        assert_eq!(headers.get_all(ORIGIN).iter().count(), 1);
        assert_eq!(headers[ORIGIN], "http://localhost:5678");
        assert_eq!(headers["cookie"], "n8n-auth=abc");
    }

    #[test]
    fn does_not_invent_origin() {
        let mut headers = HeaderMap::new();
        rewrite_request_headers(&mut headers, &backend());

        assert_eq!(headers[HOST], "localhost:5678");
        assert!(!headers.contains_key(ORIGIN));
    }

    #[test]
    fn detects_upgrade() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        assert!(!is_upgrade_request(&headers));

        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert!(is_upgrade_request(&headers));
    }

    #[test]
    fn upgrade_detection_matches_sniffer() {
        use crate::http::head::RequestHead;

        let cases: &[&[(&str, &str)]] = &[
            &[("Upgrade", "websocket")],
            &[("Connection", "upgrade")],
            &[("Upgrade", ""), ("Connection", "Upgrade")],
            &[("Upgrade", "websocket"), ("Connection", "keep-alive")],
            &[("Upgrade", "websocket"), ("Connection", "keep-alive"), ("Connection", "UPGRADE")],
            &[("upgrade", "websocket"), ("connection", "keep-alive, Upgrade")],
        ];

        for case in cases {
            let mut map = HeaderMap::new();
            for &(name, value) in case.iter() {
                map.append(
                    axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                    HeaderValue::from_static(value),
                );
            }
            let head = RequestHead {
                method: "GET".into(),
                target: "/".into(),
                headers: case
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            };
            assert_eq!(is_upgrade_request(&map), head.is_upgrade(), "headers: {case:?}");
        }

        let mut blank = HeaderMap::new();
        blank.insert(UPGRADE, HeaderValue::from_static(""));
        blank.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        assert!(!is_upgrade_request(&blank));
    }

    #[test]
    fn identity_strings() {
        let backend = backend();
        assert_eq!(backend.authority(), "localhost:5678");
        assert_eq!(backend.origin(), "http://localhost:5678");
    }
}
