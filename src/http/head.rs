//! Request head sniffing.
//!
//! # Responsibilities
//! - Read the first request head off a fresh connection
//! - Parse it with `httparse`, keeping header order and casing
//! - Decide whether the connection is an Upgrade handshake
//!
//! Whatever was read is always returned so the caller can replay it.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 100;

/// A parsed HTTP/1.x request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    /// Header lines in wire order, original casing.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when the request carries `Upgrade` and `Connection: upgrade`.
    pub fn is_upgrade(&self) -> bool {
        wants_upgrade(
            self.header("upgrade"),
            self.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("connection"))
                .map(|(_, v)| v.as_str()),
        )
    }
}

/// Upgrade detection shared by the sniffer and the hyper path.
///
/// `upgrade` is the first `Upgrade` value; `connection` yields every
/// `Connection` value. Needs a non-blank `Upgrade` and an `upgrade` token.
pub fn wants_upgrade<'a>(
    upgrade: Option<&str>,
    connection: impl IntoIterator<Item = &'a str>,
) -> bool {
    upgrade.is_some_and(|v| !v.trim().is_empty())
        && connection
            .into_iter()
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Outcome of reading the first request head.
#[derive(Debug)]
pub enum HeadRead {
    /// A complete head. `raw` is everything read so far; the head occupies
    /// its first `head_len` bytes.
    Complete {
        head: RequestHead,
        raw: Bytes,
        head_len: usize,
    },
    /// Data that could not be parsed as a complete head (too large,
    /// malformed, or cut off). Let the HTTP stack produce the error.
    Incomplete(Bytes),
    /// The peer closed before sending anything.
    Closed,
}

/// Parse a buffer that may hold a complete request head.
///
/// Returns `Ok(None)` when more bytes are needed and `Err(())` when the bytes
/// can never form a valid head.
fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, ()> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let head = RequestHead {
                method: req.method.unwrap_or_default().to_string(),
                target: req.path.unwrap_or_default().to_string(),
                headers: req
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).into_owned(),
                        )
                    })
                    .collect(),
            };
            Ok(Some((head, len)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(()),
    }
}

/// Read from `stream` until a full request head is buffered.
pub async fn read_request_head<S>(stream: &mut S, max_bytes: usize) -> std::io::Result<HeadRead>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(if buf.is_empty() {
                HeadRead::Closed
            } else {
                HeadRead::Incomplete(buf.freeze())
            });
        }

        match parse_head(&buf) {
            Ok(Some((head, head_len))) => {
                return Ok(HeadRead::Complete {
                    head,
                    raw: buf.freeze(),
                    head_len,
                });
            }
            Ok(None) if buf.len() < max_bytes => continue,
            Ok(None) | Err(()) => return Ok(HeadRead::Incomplete(buf.freeze())),
        }
    }
}

impl HeadRead {
    /// Every byte consumed from the socket, for replay.
    pub fn into_raw(self) -> Bytes {
        match self {
            HeadRead::Complete { raw, .. } => raw,
            HeadRead::Incomplete(raw) => raw,
            HeadRead::Closed => Bytes::new(),
        }
    }
}
