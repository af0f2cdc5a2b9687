// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP/1.1 Request

use super::tokens::{is_header_name_token, is_header_value_token, is_request_target_token};
use super::{ParseError, ParseResult, ParserState, MAX_HEADERS, MAX_HEADERS_LEN};
use crate::parser::{HttpMethod, HttpVersion};

/// A single `name: value` header, borrowed from the connection's read
/// buffer — request fields never copy out of it (`spec.md` §5's "HTTP/1
/// request fields are borrowed slices" memory rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'buf> {
    /// Header field name.
    pub name: &'buf str,
    /// Header field value.
    pub value: &'buf str,
}

/// Incremental HTTP/1.1 request parser.
///
/// `parse` is safe to call repeatedly as more bytes accumulate in the
/// connection's read buffer: it always re-scans from the buffer's start
/// rather than resuming from a saved cursor, which is cheap given the
/// 8 KiB header ceiling and mirrors how
/// `original_source/src/http/http_parser.c` re-scans with `strstr` on
/// every call instead of tracking a persistent match position.
#[derive(Debug, Default)]
pub struct H1Request<'buf> {
    /// Parsed method, set once the request line is recognized.
    pub method: Option<HttpMethod>,
    /// Request target (path + optional query), borrowed from the buffer.
    pub target: Option<&'buf str>,
    /// Declared protocol version.
    pub version: Option<HttpVersion>,
    /// Headers in arrival order.
    pub headers: Vec<Header<'buf>>,
    /// Current parser state.
    pub state: ParserState,
}

impl<'buf> H1Request<'buf> {
    /// Creates a fresh, unparsed request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances parsing as far as `buf` allows.
    ///
    /// `buf` is the full slice of bytes received so far (`&read_buffer
    /// [..buffer_used]`), not just newly-arrived bytes. Returns the
    /// resulting state; `Ok(ParserState::StartLine)` or
    /// `Ok(ParserState::Headers)` means "need more data", not failure.
    ///
    /// # Example
    /// ```
    /// # use rask::parser::h1::request::H1Request;
    /// # use rask::parser::h1::ParserState;
    /// # use rask::parser::HttpMethod;
    /// let mut req = H1Request::new();
    /// let state = req.parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    /// assert_eq!(ParserState::Completed, state);
    /// assert_eq!(Some(HttpMethod::Get), req.method);
    /// assert_eq!(Some("/"), req.target);
    /// ```
    pub fn parse(&mut self, buf: &'buf [u8]) -> ParseResult<ParserState> {
        if matches!(self.state, ParserState::Error | ParserState::Completed) {
            return Ok(self.state);
        }

        if self.state == ParserState::StartLine {
            match find_subslice(buf, b"\r\n") {
                None => {
                    if buf.len() > MAX_HEADERS_LEN {
                        self.state = ParserState::Error;
                        return Err(ParseError::HeadersTooLarge);
                    }
                    return Ok(self.state);
                }
                Some(line_end) => {
                    if let Err(e) = self.parse_start_line(&buf[..line_end]) {
                        self.state = ParserState::Error;
                        return Err(e);
                    }
                    self.state = ParserState::Headers;
                }
            }
        }

        if self.state == ParserState::Headers {
            let line_end = find_subslice(buf, b"\r\n").expect("start line already matched");
            let headers_start = line_end + 2;

            match find_subslice(&buf[headers_start..], b"\r\n\r\n") {
                None => {
                    if buf.len() > MAX_HEADERS_LEN {
                        self.state = ParserState::Error;
                        return Err(ParseError::HeadersTooLarge);
                    }
                    return Ok(self.state);
                }
                Some(rel_end) => {
                    let block = &buf[headers_start..headers_start + rel_end];
                    if let Err(e) = self.parse_headers(block) {
                        self.state = ParserState::Error;
                        return Err(e);
                    }
                    self.state = ParserState::HeadersFinished;
                }
            }
        }

        if self.state == ParserState::HeadersFinished {
            self.state = ParserState::Completed;
        }

        Ok(self.state)
    }

    fn parse_start_line(&mut self, line: &'buf [u8]) -> ParseResult<()> {
        let mut parts = line.splitn(3, |&b| b == b' ');

        let method = parts.next().ok_or(ParseError::Method)?;
        self.method = Some(if method.eq_ignore_ascii_case(b"GET") {
            HttpMethod::Get
        } else if method.eq_ignore_ascii_case(b"POST") {
            HttpMethod::Post
        } else {
            return Err(ParseError::Method);
        });

        let target = parts.next().ok_or(ParseError::Target)?;
        if target.is_empty()
            || !target.iter().all(|&b| is_request_target_token(b))
            || contains_subslice(target, b"../")
        {
            return Err(ParseError::Target);
        }
        self.target = Some(std::str::from_utf8(target).map_err(|_| ParseError::Target)?);

        let version = parts.next().ok_or(ParseError::Version)?;
        self.version = Some(parse_version(version)?);

        Ok(())
    }

    fn parse_headers(&mut self, block: &'buf [u8]) -> ParseResult<()> {
        if block.is_empty() {
            return Ok(());
        }

        for line in block.split(|&b| b == b'\r').filter(|l| !l.is_empty()) {
            // `split` on `\r` leaves a leading `\n` from the previous
            // `\r\n` terminator on every line but the first.
            let line = line.strip_prefix(b"\n").unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or(ParseError::HeaderName)?;
            let (name, rest) = line.split_at(colon);
            let value = &rest[1..];

            if name.is_empty() || !name.iter().all(|&b| is_header_name_token(b)) {
                return Err(ParseError::HeaderName);
            }
            let value = trim_ows(value);
            if !value.iter().all(|&b| is_header_value_token(b)) {
                return Err(ParseError::HeaderValue);
            }

            if self.headers.len() >= MAX_HEADERS {
                return Err(ParseError::TooManyHeaders);
            }

            self.headers.push(Header {
                name: std::str::from_utf8(name).map_err(|_| ParseError::HeaderName)?,
                value: std::str::from_utf8(value).map_err(|_| ParseError::HeaderValue)?,
            });
        }

        Ok(())
    }
}

fn parse_version(version: &[u8]) -> ParseResult<HttpVersion> {
    if version.len() != 8 || !version[..5].eq_ignore_ascii_case(b"HTTP/") || version[6] != b'.' {
        return Err(ParseError::Version);
    }
    match (version[5], version[7]) {
        (b'1', b'0') => Ok(HttpVersion::H1_0),
        (b'1', b'1') => Ok(HttpVersion::H1_1),
        _ => Err(ParseError::Version),
    }
}

fn trim_ows(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|&c| c != b' ' && c != b'\t').unwrap_or(b.len());
    let end = b
        .iter()
        .rposition(|&c| c != b' ' && c != b'\t')
        .map(|i| i + 1)
        .unwrap_or(start);
    &b[start..end]
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    find_subslice(haystack, needle).is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn h1_request_parses_simple_get() {
        let mut req = H1Request::new();
        let state = req.parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(ParserState::Completed, state);
        assert_eq!(Some(HttpMethod::Get), req.method);
        assert_eq!(Some("/"), req.target);
        assert_eq!(Some(HttpVersion::H1_1), req.version);
        assert_eq!(1, req.headers.len());
        assert_eq!("Host", req.headers[0].name);
        assert_eq!("x", req.headers[0].value);
    }

    #[test]
    fn h1_request_awaits_more_data_on_partial_start_line() {
        let mut req = H1Request::new();
        let state = req.parse(b"GET / HTTP/1.1").unwrap();
        assert_eq!(ParserState::StartLine, state);
        assert!(req.method.is_none());
    }

    #[test]
    fn h1_request_awaits_more_data_on_partial_headers() {
        let mut req = H1Request::new();
        let state = req.parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();
        assert_eq!(ParserState::Headers, state);
        assert_eq!(Some(HttpMethod::Get), req.method);
    }

    #[test]
    fn h1_request_rejects_unsupported_method() {
        let mut req = H1Request::new();
        let err = req.parse(b"PUT / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(ParseError::Method, err);
        assert_eq!(ParserState::Error, req.state);
    }

    #[test]
    fn h1_request_rejects_path_traversal() {
        let mut req = H1Request::new();
        let err = req.parse(b"GET /../etc/passwd HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(ParseError::Target, err);
    }

    #[test]
    fn h1_request_rejects_bad_version() {
        let mut req = H1Request::new();
        let err = req.parse(b"GET / HTTP/2.0\r\n\r\n").unwrap_err();
        assert_eq!(ParseError::Version, err);
    }

    #[test]
    fn h1_request_rejects_headers_exceeding_size_limit() {
        let mut req = H1Request::new();
        let mut buf = b"GET / HTTP/1.1\r\n".to_vec();
        buf.extend(std::iter::repeat(b'a').take(MAX_HEADERS_LEN));
        let err = req.parse(&buf).unwrap_err();
        assert_eq!(ParseError::HeadersTooLarge, err);
        assert_eq!(ParserState::Error, req.state);
    }

    #[test]
    fn h1_request_rejects_too_many_headers() {
        let mut req = H1Request::new();
        let mut buf = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..MAX_HEADERS + 1 {
            buf.extend(format!("h{i}: v\r\n").into_bytes());
        }
        buf.extend(b"\r\n");
        let err = req.parse(&buf).unwrap_err();
        assert_eq!(ParseError::TooManyHeaders, err);
    }

    #[test]
    fn h1_request_is_case_insensitive_on_method() {
        let mut req = H1Request::new();
        let state = req.parse(b"get / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(ParserState::Completed, state);
        assert_eq!(Some(HttpMethod::Get), req.method);
    }
}
