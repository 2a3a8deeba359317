//! Response formatting
//!
//! Responses are formatted in one go and handed to the socket's buffered
//! write; streaming bodies are out of scope. The `Connection` header always
//! reflects the socket's close-after-write flag, so handlers decide the
//! connection's fate before (or while) responding.

use bytes::{BufMut, BytesMut};

use wisp_core::socket::Socket;

/// Header section of a response: either a bare content type or explicit
/// name/value pairs.
pub enum ResponseHeaders<'a> {
    ContentType(&'a str),
    Fields(&'a [(&'a str, &'a str)]),
}

impl<'a> From<&'a str> for ResponseHeaders<'a> {
    fn from(content_type: &'a str) -> Self {
        ResponseHeaders::ContentType(content_type)
    }
}

impl<'a> From<&'a [(&'a str, &'a str)]> for ResponseHeaders<'a> {
    fn from(fields: &'a [(&'a str, &'a str)]) -> Self {
        ResponseHeaders::Fields(fields)
    }
}

/// Response writing for sockets speaking HTTP/1.1.
pub trait Respond {
    /// Format and send a response. `status` is the full status line tail,
    /// e.g. `"200 OK"`. Returns what the underlying write returned.
    fn http_response<'a>(&self, status: &str, headers: impl Into<ResponseHeaders<'a>>, body: &[u8]) -> bool;
}

impl Respond for Socket {
    fn http_response<'a>(&self, status: &str, headers: impl Into<ResponseHeaders<'a>>, body: &[u8]) -> bool {
        let mut out = BytesMut::with_capacity(128 + body.len());
        out.put_slice(b"HTTP/1.1 ");
        out.put_slice(status.as_bytes());
        out.put_slice(b"\r\nConnection: ");
        out.put_slice(if self.close_after_write() { &b"close"[..] } else { &b"keep-alive"[..] });
        out.put_slice(b"\r\n");
        match headers.into() {
            ResponseHeaders::ContentType(content_type) => {
                out.put_slice(b"Content-type: ");
                out.put_slice(content_type.as_bytes());
                out.put_slice(b"\r\n");
            }
            ResponseHeaders::Fields(fields) => {
                for (name, value) in fields {
                    out.put_slice(name.as_bytes());
                    out.put_slice(b": ");
                    out.put_slice(value.as_bytes());
                    out.put_slice(b"\r\n");
                }
            }
        }
        out.put_slice(b"Content-length: ");
        out.put_slice(body.len().to_string().as_bytes());
        out.put_slice(b"\r\n\r\n");
        out.put_slice(body);
        self.write(out.freeze())
    }
}
