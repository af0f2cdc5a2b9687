//! TLS handshake driver.
//!
//! Grounded on the teacher's `connection.rs` `TlsConnection<S>::read`
//! (driving `rustls` through `read_tls`/`process_new_packets`) and
//! `original_source/src/security/ssl_handler.c`'s state machine shape,
//! with OpenSSL's `SSL_ERROR_WANT_READ`/`WANT_WRITE` branches mapped onto
//! `ServerConnection::wants_read()`/`wants_write()` instead of an error
//! code. ALPN is read exactly once, at the point `is_handshaking()` first
//! turns false — the fix for `spec.md` §9's "ALPN decision duplicated in
//! both the handshake driver and the read loop" defect.

use std::fmt::Display;
use std::io::{self, ErrorKind, Read, Write};

use rustls::ServerConnection;

use crate::reactor::Readiness;

/// Outcome of one `drive_handshake` call.
#[derive(Debug)]
pub enum HandshakeStep {
    /// The handshake needs another readiness event before it can make
    /// progress; the reactor interest to rearm for is given.
    Pending(Readiness),
    /// The handshake completed. `http2` reflects ALPN negotiation: `true`
    /// if the peer selected `h2`, `false` otherwise (including no ALPN at
    /// all, which falls back to HTTP/1.1 per `spec.md` §4.3).
    Done { http2: bool },
}

/// Failures that close the connection (`spec.md` §7's `TlsFailure` kind).
#[derive(Debug)]
pub enum TlsError {
    Io(io::Error),
    Protocol(rustls::Error),
    PeerClosedDuringHandshake,
}

impl Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "I/O error during TLS handshake: {e}"),
            TlsError::Protocol(e) => write!(f, "TLS protocol error: {e}"),
            TlsError::PeerClosedDuringHandshake => {
                f.write_str("peer closed the connection mid-handshake")
            }
        }
    }
}

impl std::error::Error for TlsError {}

/// Drives `session` against `stream` until the handshake either
/// completes, needs another readiness event, or fails outright. Safe to
/// call repeatedly as readable/writable events arrive for this
/// connection; it never blocks.
pub fn drive_handshake<S: Read + Write>(
    stream: &mut S,
    session: &mut ServerConnection,
) -> Result<HandshakeStep, TlsError> {
    while session.is_handshaking() {
        if session.wants_write() {
            match session.write_tls(stream) {
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(HandshakeStep::Pending(readiness_for(session)));
                }
                Err(e) => return Err(TlsError::Io(e)),
            }
        }

        if session.wants_read() {
            match session.read_tls(stream) {
                Ok(0) => return Err(TlsError::PeerClosedDuringHandshake),
                Ok(_) => {
                    session
                        .process_new_packets()
                        .map_err(TlsError::Protocol)?;
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(HandshakeStep::Pending(readiness_for(session)));
                }
                Err(e) => return Err(TlsError::Io(e)),
            }
        }

        // Still handshaking but wants neither read nor write: waiting on
        // the peer's next flight. Rearm for read.
        return Ok(HandshakeStep::Pending(Readiness::Readable));
    }

    // Flush any final handshake bytes rustls queued on completion.
    if session.wants_write() {
        let _ = session.write_tls(stream);
    }

    let http2 = session.alpn_protocol() == Some(b"h2");
    Ok(HandshakeStep::Done { http2 })
}

fn readiness_for(session: &ServerConnection) -> Readiness {
    match (session.wants_read(), session.wants_write()) {
        (true, true) => Readiness::Both,
        (true, false) => Readiness::Readable,
        (false, true) => Readiness::Writable,
        (false, false) => Readiness::Readable,
    }
}
