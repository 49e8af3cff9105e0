//! HTTP/1.1 upgrade handshake.
//!
//! The request head is parsed by `httparse` into an [`http::Request`] and
//! validated by tungstenite, which also builds the `101` reply.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use http::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_LENGTH, SEC_WEBSOCKET_VERSION};
use http::{Request, Response, StatusCode, Version};
use tungstenite::error::ProtocolError as WireError;
use tungstenite::handshake::server::create_response;

use super::error::ProtocolError;

/// Upper bound on the request head, terminator included.
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Header slots handed to the parser.
const MAX_HEADERS: usize = 64;

/// Accepted upgrade request.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Request target, query string included.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
}

impl Handshake {
    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn from_request(request: Request<()>) -> Self {
        let (parts, ()) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map_or("/", |target| target.as_str())
            .to_string();
        Self {
            path,
            headers: parts.headers,
        }
    }
}

/// Perform the server side of the opening handshake.
///
/// Consumes exactly the request head; bytes the client pipelined after it
/// stay in the socket for the frame reader. Rejected requests are answered
/// with an error status before failing.
pub fn upgrade(stream: &TcpStream) -> Result<Handshake, ProtocolError> {
    let mut writer = stream;

    let accepted = read_head(stream)
        .and_then(|head| parse_request(&head))
        .and_then(|request| Ok((respond(&request)?, request)));

    match accepted {
        Ok((response, request)) => {
            write_response(&mut writer, &response)?;
            Ok(Handshake::from_request(request))
        }
        Err(ProtocolError::Handshake { status, reason }) => {
            write_response(&mut writer, &rejection(status))?;
            Err(ProtocolError::Handshake { status, reason })
        }
        Err(e) => Err(e),
    }
}

/// Read the request head and nothing after it.
///
/// Peeks before consuming so nothing past the blank line leaves the
/// kernel buffer.
fn read_head(stream: &TcpStream) -> Result<Vec<u8>, ProtocolError> {
    let mut reader = stream;
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let room = MAX_HEAD_SIZE - head.len();
        if room == 0 {
            return Err(ProtocolError::Handshake {
                status: StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                reason: "request head too large",
            });
        }

        let take = room.min(chunk.len());
        let n = stream.peek(&mut chunk[..take])?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let before = head.len();
        head.extend_from_slice(&chunk[..n]);

        if let Some(end) = head_len(&head)? {
            head.truncate(end);
            reader.read_exact(&mut chunk[..end - before])?;
            return Ok(head);
        }

        reader.read_exact(&mut chunk[..n])?;
    }
}

/// Length of the complete request head at the start of `buf`, if any.
fn head_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    match httparse::Request::new(&mut headers).parse(buf) {
        Ok(httparse::Status::Complete(len)) => Ok(Some(len)),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(httparse::Error::TooManyHeaders) => Err(ProtocolError::Handshake {
            status: StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            reason: "too many request headers",
        }),
        Err(_) => Err(bad_request("malformed request head")),
    }
}

/// Parse a complete request head.
pub(crate) fn parse_request(head: &[u8]) -> Result<Request<()>, ProtocolError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    match parsed.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Err(bad_request("incomplete request head")),
        Err(_) => return Err(bad_request("malformed request head")),
    }

    let version = match parsed.version {
        Some(1) => Version::HTTP_11,
        _ => Version::HTTP_10,
    };
    let mut builder = Request::builder()
        .method(parsed.method.unwrap_or_default())
        .uri(parsed.path.unwrap_or_default())
        .version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    builder
        .body(())
        .map_err(|_| bad_request("invalid request target or header"))
}

/// Validate the upgrade request and build the `101` reply.
pub(crate) fn respond(request: &Request<()>) -> Result<Response<()>, ProtocolError> {
    create_response(request).map_err(|e| {
        let (status, reason) = match e {
            tungstenite::Error::Protocol(WireError::WrongHttpMethod) => {
                (StatusCode::METHOD_NOT_ALLOWED, "GET required")
            }
            tungstenite::Error::Protocol(WireError::WrongHttpVersion) => {
                (StatusCode::BAD_REQUEST, "HTTP/1.1 required")
            }
            tungstenite::Error::Protocol(WireError::MissingConnectionUpgradeHeader) => {
                (StatusCode::BAD_REQUEST, "missing Connection: upgrade")
            }
            tungstenite::Error::Protocol(WireError::MissingUpgradeWebSocketHeader) => {
                (StatusCode::BAD_REQUEST, "missing Upgrade: websocket")
            }
            tungstenite::Error::Protocol(WireError::MissingSecWebSocketVersionHeader) => {
                (StatusCode::UPGRADE_REQUIRED, "unsupported websocket version")
            }
            tungstenite::Error::Protocol(WireError::MissingSecWebSocketKey) => {
                (StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key")
            }
            _ => (StatusCode::BAD_REQUEST, "invalid upgrade request"),
        };
        ProtocolError::Handshake { status, reason }
    })
}

fn bad_request(reason: &'static str) -> ProtocolError {
    ProtocolError::Handshake {
        status: StatusCode::BAD_REQUEST,
        reason,
    }
}

/// Empty reply that ends the connection. `426` names the supported version.
fn rejection(status: StatusCode) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    if status == StatusCode::UPGRADE_REQUIRED {
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    }
    response
}

/// Serialize the status line and headers in one write.
fn write_response<W: Write>(w: &mut W, response: &Response<()>) -> io::Result<()> {
    let status = response.status();
    let mut buf = format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
    )
    .into_bytes();

    for (name, value) in response.headers() {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");

    w.write_all(&buf)?;
    w.flush()
}
