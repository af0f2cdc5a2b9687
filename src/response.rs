//! Response writer: builds a connection's outbound bytes into a fixed
//! buffer, grounded on `original_source/src/http/response.c`
//! (`zeus_response_send_data`, `zeus_response_add_header`,
//! `handle_response_write_cb`, `get_status_message`).

use std::fmt::Display;

use crate::parser::status::Status;

/// Matches `original_source/include/http/http.h`'s `MAX_RESPONSE_BUFFER`.
pub const RESPONSE_BUFFER_LEN: usize = 4096;

/// Raised when a write would overflow the fixed response buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

impl Display for BufferFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("response exceeded the fixed response buffer")
    }
}

impl std::error::Error for BufferFull {}

/// A single response being assembled for one connection. Reused across
/// requests on the same connection via [`Response::reset`] rather than
/// reallocated, matching the connection's fixed-buffer design (`spec.md`
/// §3, §4.8).
pub struct Response {
    buf: Box<[u8; RESPONSE_BUFFER_LEN]>,
    len: usize,
    write_offset: usize,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; RESPONSE_BUFFER_LEN]),
            len: 0,
            write_offset: 0,
        }
    }

    /// Starts a status line, discarding anything previously buffered.
    pub fn start(&mut self, status: Status) -> Result<(), BufferFull> {
        self.len = 0;
        self.write_offset = 0;
        self.append(format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason()).as_bytes())
    }

    /// Appends a `name: value` header line. Must be called after
    /// [`Response::start`] and before [`Response::finish`].
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), BufferFull> {
        self.append(format!("{name}: {value}\r\n").as_bytes())
    }

    /// Appends the `Content-Length` header, the blank line that ends the
    /// header section, and the body.
    pub fn finish(&mut self, body: &[u8]) -> Result<(), BufferFull> {
        self.append(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())?;
        self.append(body)
    }

    /// The single outbound primitive (`spec.md` §4.8): a one-shot
    /// `status` + `body` response with no extra headers, equivalent to
    /// `start` immediately followed by `finish`.
    pub fn send_data(&mut self, status: Status, body: &[u8]) -> Result<(), BufferFull> {
        self.start(status)?;
        self.finish(body)
    }

    /// Appends raw bytes without resetting the buffer first, for callers
    /// (the HTTP/2 frame engine) whose outbound bytes are already-framed
    /// wire data rather than HTTP/1.1 status-line text.
    pub fn queue_raw(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        self.append(bytes)
    }

    /// Whether there are unsent bytes remaining.
    pub fn is_pending(&self) -> bool {
        self.write_offset < self.len
    }

    /// The unsent tail of the buffer.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.write_offset..self.len]
    }

    /// Advances the write cursor after `n` bytes have been written to the
    /// transport, per `spec.md` §4.8's partial-send protocol.
    pub fn advance(&mut self, n: usize) {
        self.write_offset = (self.write_offset + n).min(self.len);
    }

    /// Clears the buffer for reuse by the next response on this
    /// connection (HTTP/2 streams; HTTP/1.1 closes instead of reusing).
    pub fn reset(&mut self) {
        self.len = 0;
        self.write_offset = 0;
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            return Err(BufferFull);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_data_builds_a_complete_response() {
        let mut resp = Response::new();
        resp.send_data(Status::r#Ok, b"hi").unwrap();
        let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";
        assert_eq!(expected.as_slice(), resp.pending());
    }

    #[test]
    fn add_header_lands_between_start_and_finish() {
        let mut resp = Response::new();
        resp.start(Status::NotFound).unwrap();
        resp.add_header("X-Test", "1").unwrap();
        resp.finish(b"missing").unwrap();
        let expected = b"HTTP/1.1 404 Not Found\r\nX-Test: 1\r\nContent-Length: 7\r\n\r\nmissing";
        assert_eq!(expected.as_slice(), resp.pending());
    }

    #[test]
    fn advance_shrinks_the_pending_slice() {
        let mut resp = Response::new();
        resp.send_data(Status::r#Ok, b"hello").unwrap();
        let total = resp.pending().len();
        resp.advance(total - 2);
        assert_eq!(2, resp.pending().len());
        assert!(resp.is_pending());
        resp.advance(2);
        assert!(!resp.is_pending());
    }

    #[test]
    fn oversized_body_is_rejected_without_partial_write() {
        let mut resp = Response::new();
        let body = vec![0u8; RESPONSE_BUFFER_LEN];
        assert!(resp.send_data(Status::r#Ok, &body).is_err());
    }

    #[test]
    fn reset_clears_a_finished_response_for_reuse() {
        let mut resp = Response::new();
        resp.send_data(Status::r#Ok, b"hi").unwrap();
        resp.advance(resp.pending().len());
        resp.reset();
        assert!(!resp.is_pending());
        resp.send_data(Status::r#Ok, b"again").unwrap();
        assert_eq!(b"again".as_slice(), &resp.pending()[resp.pending().len() - 5..]);
    }
}
