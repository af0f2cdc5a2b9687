//! The per-client connection object (spec.md §3, §4.2).
//!
//! Liveness follows the sanctioned design from `spec.md` §9: a connection
//! is held in an `Rc<RefCell<Connection<S>>>` inside the worker's slab, plus
//! a `Cell<bool>` one-shot `closing` flag on the connection itself. The
//! dispatch wrapper in `worker.rs` clones the `Rc` out of the slab before
//! running a connection's callbacks and drops it afterward; once the slab
//! entry is also removed, the strong count falls to zero and `Drop` frees
//! the connection's buffers, TLS session, and HTTP/2 state. There is no
//! separate free function — Rust's ownership model makes the "outlive any
//! callback, teardown exactly once" contract automatic.

use std::cell::Cell;
use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::sync::Arc;

use mio::{event::Source, Interest, Registry, Token};
use rustls::{ServerConfig, ServerConnection};

use crate::net::tcp_stream::TcpStream;
use crate::parser::h1::request::H1Request;
use crate::parser::h1::ParserState;
use crate::parser::h2::Http2State;
use crate::reactor::Readiness;
use crate::response::Response;
use crate::router::{Request, Router};
use crate::tls::{self, HandshakeStep};

/// Size of the connection's read buffer. `spec.md` §3 calls for 4 KiB, but
/// that is too small to ever hold a full HTTP/2 frame at the spec's own
/// `MAX_FRAME_SIZE` of 16384 bytes (§4.5) or the 8192-byte HTTP/1 header
/// ceiling (§4.4) — both requirements are unreachable with a 4 KiB buffer,
/// since the frame/header reader can never observe enough bytes to either
/// finish or legitimately fail. Resolved (see `DESIGN.md`) by sizing the
/// buffer to the larger of the two: one full max-size HTTP/2 frame.
pub const READ_BUFFER_LEN: usize = 9 + 16384;

/// Protocol selected once, at TLS handshake completion (`spec.md` §4.3,
/// §9 — this is the single read point that replaces the original's
/// duplicated ALPN decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

enum Transport<S> {
    Plain(S),
    Tls {
        stream: S,
        session: Box<ServerConnection>,
        handshake_done: bool,
    },
}

impl<S> Transport<S> {
    fn is_encrypted(&self) -> bool {
        matches!(self, Transport::Tls { .. })
    }
}

/// Per-client connection state, owned exclusively by the worker that
/// accepted it (`spec.md` §5's single-owner rule — no field here is ever
/// touched from another thread).
pub struct Connection<S>
where
    S: TcpStream + Read + Write + Source,
{
    token: Token,
    transport: Transport<S>,
    closing: Cell<bool>,
    read_buf: Box<[u8; READ_BUFFER_LEN]>,
    read_used: usize,
    protocol: Option<Protocol>,
    h2: Http2State,
    resp: Response,
}

impl<S> Connection<S>
where
    S: TcpStream + Read + Write + Source,
{
    /// Builds a plaintext connection. Used for non-TLS testing paths; the
    /// production server (`spec.md` §1, "TLS-terminating") always accepts
    /// through [`Connection::new_tls`].
    pub fn new_plain(token: Token, stream: S) -> Self {
        Self {
            token,
            transport: Transport::Plain(stream),
            closing: Cell::new(false),
            read_buf: Box::new([0u8; READ_BUFFER_LEN]),
            read_used: 0,
            protocol: Some(Protocol::Http1),
            h2: Http2State::new(),
            resp: Response::new(),
        }
    }

    /// Builds a connection with a fresh server-side TLS session bound to
    /// `stream`, armed for the handshake. Protocol is unknown until ALPN
    /// resolves at handshake completion.
    pub fn new_tls(token: Token, stream: S, config: Arc<ServerConfig>) -> Result<Self, rustls::Error> {
        let session = ServerConnection::new(config)?;
        Ok(Self {
            token,
            transport: Transport::Tls {
                stream,
                session: Box::new(session),
                handshake_done: false,
            },
            closing: Cell::new(false),
            read_buf: Box::new([0u8; READ_BUFFER_LEN]),
            read_used: 0,
            protocol: None,
            h2: Http2State::new(),
            resp: Response::new(),
        })
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_closing(&self) -> bool {
        self.closing.get()
    }

    /// Registers the underlying socket for read readiness. Write interest
    /// is added later, only once there is outbound data pending.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        match &mut self.transport {
            Transport::Plain(s) => registry.register(s, self.token, Interest::READABLE),
            Transport::Tls { stream, .. } => registry.register(stream, self.token, Interest::READABLE),
        }
    }

    fn reregister(&mut self, registry: &Registry, interest: Interest) -> io::Result<()> {
        match &mut self.transport {
            Transport::Plain(s) => registry.reregister(s, self.token, interest),
            Transport::Tls { stream, .. } => registry.reregister(stream, self.token, interest),
        }
    }

    fn deregister(&mut self, registry: &Registry) {
        let _ = match &mut self.transport {
            Transport::Plain(s) => registry.deregister(s),
            Transport::Tls { stream, .. } => registry.deregister(stream),
        };
    }

    /// Schedules teardown (`spec.md` §4.2's `close_connection`): idempotent
    /// test-and-set on `closing`, reactor deregistration, a best-effort TLS
    /// `close_notify` plus socket shutdown. The worker removes this
    /// connection from its slab once `closing` is observed set; the actual
    /// deallocation happens when the last `Rc` clone drops.
    pub fn close(&mut self, registry: &Registry) {
        if self.closing.replace(true) {
            return;
        }

        self.deregister(registry);

        match &mut self.transport {
            Transport::Tls { stream, session, .. } => {
                session.send_close_notify();
                let mut out = Vec::new();
                let _ = session.write_tls(&mut out);
                let _ = stream.write_all(&out);
                let _ = stream.shutdown(Shutdown::Both);
            }
            Transport::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn drive_handshake(&mut self) -> Result<HandshakeStep, tls::TlsError> {
        match &mut self.transport {
            Transport::Tls { stream, session, .. } => tls::drive_handshake(stream, session),
            Transport::Plain(_) => unreachable!("handshake driven on a plaintext connection"),
        }
    }

    /// Dispatches a readable event: advances a pending handshake, then
    /// reads available application data and drives the protocol parser.
    pub fn on_readable(&mut self, registry: &Registry, router: &Router) {
        if self.closing.get() {
            return;
        }

        if let Transport::Tls { handshake_done, .. } = &self.transport {
            if !*handshake_done && !self.complete_handshake(registry) {
                return;
            }
        }

        match self.fill_read_buffer() {
            Ok(0) => {
                self.close(registry);
                return;
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => {
                self.close(registry);
                return;
            }
        }

        match self.protocol {
            Some(Protocol::Http1) => self.drive_http1(registry, router),
            Some(Protocol::Http2) => self.drive_http2(registry, router),
            None => {}
        }

        if self.resp.is_pending() {
            self.try_flush(registry);
        }
    }

    /// Dispatches a writable event: completes a pending handshake, or
    /// resumes a partially-sent response.
    pub fn on_writable(&mut self, registry: &Registry) {
        if self.closing.get() {
            return;
        }

        if let Transport::Tls { handshake_done, .. } = &self.transport {
            if !*handshake_done && !self.complete_handshake(registry) {
                return;
            }
        }

        self.try_flush(registry);
    }

    /// Steps the handshake once. Returns `true` if the handshake is done
    /// and the caller should proceed to application I/O this event;
    /// `false` if it rearmed the reactor and returned pending, or closed
    /// the connection on failure.
    fn complete_handshake(&mut self, registry: &Registry) -> bool {
        match self.drive_handshake() {
            Ok(HandshakeStep::Pending(readiness)) => {
                let _ = self.reregister(registry, readiness.into());
                false
            }
            Ok(HandshakeStep::Done { http2 }) => {
                if let Transport::Tls { handshake_done, .. } = &mut self.transport {
                    *handshake_done = true;
                }
                self.protocol = Some(if http2 { Protocol::Http2 } else { Protocol::Http1 });
                let _ = self.reregister(registry, Interest::READABLE);
                true
            }
            Err(_) => {
                self.close(registry);
                false
            }
        }
    }

    /// Fills the read buffer as far as it will go without blocking.
    fn fill_read_buffer(&mut self) -> io::Result<usize> {
        let mut total = 0usize;

        loop {
            if self.read_used >= self.read_buf.len() {
                return Ok(total);
            }

            let result = match &mut self.transport {
                Transport::Plain(s) => s.read(&mut self.read_buf[self.read_used..]),
                Transport::Tls { stream, session, .. } => {
                    match pull_ciphertext(stream, session) {
                        Ok(0) if total == 0 => Ok(0),
                        Ok(_) | Err(_) if session.process_new_packets().is_err() => {
                            Err(io::Error::new(ErrorKind::Other, "tls record processing failed"))
                        }
                        _ => session.reader().read(&mut self.read_buf[self.read_used..]),
                    }
                }
            };

            match result {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    self.read_used += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return if total == 0 { Err(e) } else { Ok(total) }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn drive_http1(&mut self, registry: &Registry, router: &Router) {
        let mut request = H1Request::new();
        match request.parse(&self.read_buf[..self.read_used]) {
            Ok(ParserState::Completed) => {
                let request = Request {
                    method: request.method.expect("method set on Completed"),
                    path: request.target.expect("target set on Completed"),
                };
                router.dispatch(&request, &mut self.resp);
            }
            Ok(_) => {
                // Awaiting more data: `START_LINE`/`HEADERS`. If the buffer
                // is already full and no terminator was found, the parser
                // itself will flag `HeadersTooLarge` on the next call.
            }
            Err(_) => self.close(registry),
        }
    }

    fn drive_http2(&mut self, registry: &Registry, router: &Router) {
        if !self.h2.preface_done {
            match self.h2.consume_preface(&self.read_buf[..self.read_used]) {
                Ok(None) => return,
                Ok(Some(n)) => {
                    self.consume(n);
                    self.queue_outbound(&Http2State::initial_frames());
                }
                Err(_) => {
                    self.close(registry);
                    return;
                }
            }
        }

        loop {
            match self.h2.advance(&self.read_buf[..self.read_used], router) {
                Ok(None) => break,
                Ok(Some(advance)) => {
                    self.consume(advance.consumed);
                    if !advance.outbound.is_empty() {
                        self.queue_outbound(&advance.outbound);
                    }
                }
                Err(_) => {
                    self.close(registry);
                    return;
                }
            }
        }
    }

    /// Shifts `n` consumed bytes out of the read buffer so the frame
    /// reader always starts scanning from offset zero (`spec.md` §8: the
    /// frame reader never consumes a partial frame, so this only ever
    /// runs after a full frame or the preface was recognized).
    fn consume(&mut self, n: usize) {
        self.read_buf.copy_within(n..self.read_used, 0);
        self.read_used -= n;
    }

    fn queue_outbound(&mut self, bytes: &[u8]) {
        if self.resp.queue_raw(bytes).is_err() {
            log::warn!("outbound HTTP/2 frames overflowed the response buffer, dropping connection");
        }
    }

    /// Resumes a partial send from `write_offset`, per `spec.md` §4.8's
    /// partial-send protocol, until either the buffer drains or the
    /// transport would block.
    fn try_flush(&mut self, registry: &Registry) {
        loop {
            if !self.resp.is_pending() {
                break;
            }

            let pending = self.resp.pending().to_vec();
            let result = match &mut self.transport {
                Transport::Plain(s) => s.write(&pending),
                // rustls's writer buffers plaintext internally and always
                // accepts it in full; the socket's actual backpressure only
                // shows up later, when the buffered ciphertext is flushed
                // via `write_tls` below.
                Transport::Tls { session, .. } => session.writer().write(&pending),
            };

            match result {
                Ok(0) => {
                    let _ = self.reregister(registry, Interest::READABLE | Interest::WRITABLE);
                    return;
                }
                Ok(n) => self.resp.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let _ = self.reregister(registry, Interest::READABLE | Interest::WRITABLE);
                    return;
                }
                Err(_) => {
                    self.close(registry);
                    return;
                }
            }
        }

        // All plaintext has been handed to rustls, but its ciphertext may
        // still be sitting unflushed if the socket was backpressured.
        // `resp` must stay pending until `wants_write()` goes false, or a
        // slow TLS client sees its response truncated.
        if let Transport::Tls { stream, session, .. } = &mut self.transport {
            while session.wants_write() {
                match session.write_tls(stream) {
                    Ok(0) => {
                        let _ = self.reregister(registry, Interest::READABLE | Interest::WRITABLE);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        let _ = self.reregister(registry, Interest::READABLE | Interest::WRITABLE);
                        return;
                    }
                    Err(_) => {
                        self.close(registry);
                        return;
                    }
                }
            }
        }

        match self.protocol {
            // No keep-alive: HTTP/1.1 closes once its one response drains
            // (`spec.md` §1 Non-goals).
            Some(Protocol::Http1) => self.close(registry),
            _ => {
                self.resp.reset();
                let _ = self.reregister(registry, Interest::READABLE);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_encrypted(&self) -> bool {
        self.transport.is_encrypted()
    }
}

fn pull_ciphertext<S: Read + Write>(
    stream: &mut S,
    session: &mut ServerConnection,
) -> io::Result<usize> {
    let mut total = 0usize;
    loop {
        match session.read_tls(stream) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return if total == 0 { Err(e) } else { Ok(total) }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
