//! Request head parsing
//!
//! The frame reader hands over the complete header block (trailing blank
//! line included); this module turns it into a [`RequestHead`] using
//! `httparse` for the heavy lifting.

use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use httparse::Status;
use tracing::trace;

use crate::ensure;
use crate::error::ParseError;

pub(crate) const MAX_HEADER_NUM: usize = 64;
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Request line and headers of a single request.
///
/// Header names are lowercased on insertion and a repeated name keeps its
/// last occurrence. The path is split from the query at the first `?` and is
/// never url-decoded.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    path: String,
    query: String,
    version: Version,
    headers: HeaderMap,
}

impl RequestHead {
    /// Parse a complete header block.
    pub fn parse(block: &[u8]) -> Result<RequestHead, ParseError> {
        ensure!(block.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(block.len(), MAX_HEADER_BYTES));

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(block).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let offset = match status {
            Status::Complete(offset) => offset,
            // the frame reader only hands over completed blocks
            Status::Partial => return Err(ParseError::invalid_header("truncated header block")),
        };
        trace!(header_bytes = offset, "parsed request head");

        let method = Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
            .map_err(|_| ParseError::InvalidMethod)?;
        let url = req.path.ok_or(ParseError::InvalidUri)?;
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            // http2/3 have their own framing and never come through here
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_owned(), query.to_owned()),
            None => (url.to_owned(), String::new()),
        };

        let mut header_map = HeaderMap::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| ParseError::invalid_header(e.to_string()))?;
            // insert, not append: the last occurrence of a repeated name wins
            header_map.insert(name, value);
        }

        Ok(RequestHead { method, path, query, version, headers: header_map })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string; empty when the url carried no `?`.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body length from `Content-Length`; zero when the header is absent.
    pub fn content_length(&self) -> Result<usize, ParseError> {
        let Some(value) = self.headers.get(http::header::CONTENT_LENGTH) else {
            return Ok(0);
        };
        let value = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::invalid_content_length(format!("value {value} is not a length")))
    }

    /// True when the request asks for the connection to close once the
    /// response has drained.
    pub fn wants_close(&self) -> bool {
        self.headers
            .get(http::header::CONNECTION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}
