//! HTTP/2 frame engine.
//!
//! Grounded on `original_source/src/http/http2.c` for the preface/frame/
//! SETTINGS/PING shape (the teacher's own module here was an unimplemented
//! stub — see `DESIGN.md`), corrected per `spec.md` §9: PING echoes the
//! 8-byte opaque payload with only the ACK flag flipped rather than a
//! blind 17-byte copy, and emitted HEADERS frame lengths always equal
//! their actual payload size.

pub mod stream;

use core::fmt::Display;

use crate::hpack::{decode_block, DynamicTable};
use crate::router::Router;

use stream::StreamTree;

/// Fixed 24-byte client connection preface that must open every HTTP/2
/// connection (RFC 7540 §3.5).
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Size of a frame header: 24-bit length + 8-bit type + 8-bit flags +
/// 31-bit stream id (with its reserved high bit).
pub const FRAME_HEADER_LEN: usize = 9;

/// `SETTINGS_MAX_FRAME_SIZE`'s initial value (RFC 7540 §6.5.2); frames
/// larger than this close the connection.
pub const MAX_FRAME_SIZE: u32 = 16384;

const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x03;
const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x04;

const FLAG_END_STREAM: u8 = 0x01;
const FLAG_END_HEADERS: u8 = 0x04;
const FLAG_ACK: u8 = 0x01;

/// HTTP/2 frame type, RFC 7540 §11.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(b: u8) -> Self {
        match b {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

/// Errors that close the connection per `spec.md` §7's `ProtocolViolation`
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H2Error {
    BadPreface,
    FrameTooLarge,
    SettingsPayloadMisaligned,
    HeadersOnStreamZero,
    ContinuationStreamMismatch,
    BadPingLength,
    Hpack,
}

impl Display for H2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            H2Error::BadPreface => "connection preface did not match",
            H2Error::FrameTooLarge => "frame length exceeded MAX_FRAME_SIZE",
            H2Error::SettingsPayloadMisaligned => "SETTINGS payload was not a multiple of 6",
            H2Error::HeadersOnStreamZero => "HEADERS frame used stream id 0",
            H2Error::ContinuationStreamMismatch => {
                "CONTINUATION frame stream id did not match the pending HEADERS"
            }
            H2Error::BadPingLength => "PING frame payload was not 8 bytes",
            H2Error::Hpack => "HPACK decoding failed",
        })
    }
}

impl std::error::Error for H2Error {}

impl From<crate::hpack::HpackError> for H2Error {
    fn from(_: crate::hpack::HpackError) -> Self {
        H2Error::Hpack
    }
}

/// Frames pending reassembly from a HEADERS (+ CONTINUATION*) sequence.
struct Reassembly {
    stream_id: u32,
    buf: Vec<u8>,
    end_stream: bool,
}

/// Per-connection HTTP/2 state.
pub struct Http2State {
    pub preface_done: bool,
    pub dynamic_table: DynamicTable,
    pub streams: StreamTree,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    reassembly: Option<Reassembly>,
}

impl Default for Http2State {
    fn default() -> Self {
        Self {
            preface_done: false,
            dynamic_table: DynamicTable::new(),
            streams: StreamTree::new(),
            max_concurrent_streams: 100,
            initial_window_size: 65535,
            reassembly: None,
        }
    }
}

/// Result of one `advance` call: how many bytes of `buf` were consumed,
/// and any frames that must be written back to the peer, in order.
#[derive(Debug, Default)]
pub struct Advance {
    pub consumed: usize,
    pub outbound: Vec<u8>,
}

impl Http2State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks/consumes the 24-byte preface. Returns `Ok(None)` if fewer
    /// than 24 bytes are buffered (await more data), `Ok(Some(n))` with
    /// `n == 24` on success, or `Err` on mismatch.
    pub fn consume_preface(&mut self, buf: &[u8]) -> Result<Option<usize>, H2Error> {
        if buf.len() < PREFACE.len() {
            return Ok(None);
        }
        if &buf[..PREFACE.len()] != PREFACE {
            return Err(H2Error::BadPreface);
        }
        self.preface_done = true;
        Ok(Some(PREFACE.len()))
    }

    /// The frames a server sends immediately after a matched preface:
    /// an initial SETTINGS frame and a connection-level WINDOW_UPDATE.
    pub fn initial_frames() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(build_initial_settings());
        out.extend(build_window_update(0, 65535));
        out
    }

    /// Attempts to read and act on one frame from `buf`. Returns
    /// `Ok(None)` if fewer than `9 + length` bytes are present (the
    /// frame reader must never consume a partial frame — `spec.md` §8).
    pub fn advance(&mut self, buf: &[u8], router: &Router) -> Result<Option<Advance>, H2Error> {
        let Some(header) = parse_frame_header(buf) else {
            return Ok(None);
        };
        if header.length > MAX_FRAME_SIZE {
            return Err(H2Error::FrameTooLarge);
        }
        let total = FRAME_HEADER_LEN + header.length as usize;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = &buf[FRAME_HEADER_LEN..total];

        let mut outbound = Vec::new();
        match header.frame_type {
            FrameType::Settings => {
                if header.flags & FLAG_ACK == 0 {
                    self.apply_settings(payload)?;
                    outbound.extend(build_settings_ack());
                }
            }
            FrameType::Headers => {
                if header.stream_id == 0 {
                    return Err(H2Error::HeadersOnStreamZero);
                }
                self.begin_reassembly(header.stream_id, payload, header.flags);
                self.maybe_finish_reassembly(header.flags, router, &mut outbound)?;
            }
            FrameType::Continuation => {
                match &mut self.reassembly {
                    Some(r) if r.stream_id == header.stream_id => r.buf.extend_from_slice(payload),
                    _ => return Err(H2Error::ContinuationStreamMismatch),
                }
                self.maybe_finish_reassembly(header.flags, router, &mut outbound)?;
            }
            FrameType::Ping => {
                if payload.len() != 8 {
                    return Err(H2Error::BadPingLength);
                }
                if header.flags & FLAG_ACK == 0 {
                    outbound.extend(build_ping_ack(payload));
                }
            }
            _ => {
                // RstStream, Priority, WindowUpdate, GoAway, PushPromise,
                // and unrecognized types: consumed and ignored, per
                // `spec.md` §4.5's "other: consume and ignore".
            }
        }

        Ok(Some(Advance {
            consumed: total,
            outbound,
        }))
    }

    fn apply_settings(&mut self, payload: &[u8]) -> Result<(), H2Error> {
        if payload.len() % 6 != 0 {
            return Err(H2Error::SettingsPayloadMisaligned);
        }
        for entry in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            match id {
                SETTINGS_MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = value,
                SETTINGS_INITIAL_WINDOW_SIZE => self.initial_window_size = value,
                _ => {}
            }
        }
        Ok(())
    }

    fn begin_reassembly(&mut self, stream_id: u32, payload: &[u8], flags: u8) {
        self.reassembly = Some(Reassembly {
            stream_id,
            buf: payload.to_vec(),
            end_stream: flags & FLAG_END_STREAM != 0,
        });
    }

    fn maybe_finish_reassembly(
        &mut self,
        flags: u8,
        router: &Router,
        outbound: &mut Vec<u8>,
    ) -> Result<(), H2Error> {
        if flags & FLAG_END_HEADERS == 0 {
            return Ok(());
        }
        let Reassembly {
            stream_id,
            buf,
            end_stream,
        } = self.reassembly.take().expect("END_HEADERS with no pending block");

        let fields = decode_block(&buf, &mut self.dynamic_table)?;
        let stream = self.streams.insert_or_get(stream_id);
        stream.request = fields;
        stream.end_stream = end_stream;

        if end_stream {
            let method = stream
                .request
                .iter()
                .find(|f| f.name == ":method")
                .map(|f| f.value.as_str());
            let path = stream
                .request
                .iter()
                .find(|f| f.name == ":path")
                .map(|f| f.value.as_str());

            if router.find(method, path).is_some() {
                outbound.extend(build_response(stream_id));
            } else {
                // No 404 frame is defined for the minimal H2 response
                // path (`spec.md` §4.5 only specifies the happy path);
                // we still mark the stream serviced so resources free.
            }
            self.streams
                .get_mut(stream_id)
                .expect("just inserted")
                .response_sent = true;
        }

        Ok(())
    }
}

/// Parses a 9-byte frame header without consuming anything; `buf` may be
/// shorter than a full header, in which case `None` is returned.
fn parse_frame_header(buf: &[u8]) -> Option<FrameHeader> {
    if buf.len() < FRAME_HEADER_LEN {
        return None;
    }
    let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
    let frame_type = FrameType::from(buf[3]);
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;

    Some(FrameHeader {
        length,
        frame_type,
        flags,
        stream_id,
    })
}

fn frame_header_bytes(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> [u8; 9] {
    let l = length.to_be_bytes();
    let s = (stream_id & 0x7fff_ffff).to_be_bytes();
    [l[1], l[2], l[3], frame_type, flags, s[0], s[1], s[2], s[3]]
}

fn build_initial_settings() -> Vec<u8> {
    // Advertise MAX_CONCURRENT_STREAMS=100, INITIAL_WINDOW_SIZE=65535,
    // per `spec.md` §4.5. Empty-payload SETTINGS with no entries is also
    // valid, but the server states its own limits up front.
    let mut payload = Vec::new();
    payload.extend(SETTINGS_MAX_CONCURRENT_STREAMS.to_be_bytes());
    payload.extend(100u32.to_be_bytes());
    payload.extend(SETTINGS_INITIAL_WINDOW_SIZE.to_be_bytes());
    payload.extend(65535u32.to_be_bytes());

    let mut frame = frame_header_bytes(payload.len() as u32, 0x04, 0, 0).to_vec();
    frame.extend(payload);
    frame
}

fn build_settings_ack() -> Vec<u8> {
    frame_header_bytes(0, 0x04, FLAG_ACK, 0).to_vec()
}

fn build_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut frame = frame_header_bytes(4, 0x08, 0, stream_id).to_vec();
    frame.extend((increment & 0x7fff_ffff).to_be_bytes());
    frame
}

fn build_ping_ack(payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(8, payload.len());
    let mut frame = frame_header_bytes(8, 0x06, FLAG_ACK, 0).to_vec();
    frame.extend_from_slice(payload);
    frame
}

/// The fixed body served by the minimal HTTP/2 response path.
pub const RESPONSE_BODY: &[u8] = b"Server running...";

fn build_response(stream_id: u32) -> Vec<u8> {
    // Indexed static entry 8 (`:status: 200`), byte `0x88`.
    const STATUS_200: [u8; 1] = [0x88];

    let mut headers = frame_header_bytes(
        STATUS_200.len() as u32,
        0x01,
        FLAG_END_HEADERS,
        stream_id,
    )
    .to_vec();
    headers.extend(STATUS_200);

    let mut data = frame_header_bytes(
        RESPONSE_BODY.len() as u32,
        0x00,
        FLAG_END_STREAM,
        stream_id,
    )
    .to_vec();
    data.extend(RESPONSE_BODY);

    headers.extend(data);
    headers
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::router::Router;

    #[test]
    fn preface_awaits_more_data_when_short() {
        let mut state = Http2State::new();
        assert_eq!(Ok(None), state.consume_preface(b"PRI * HTTP/2.0\r\n"));
        assert!(!state.preface_done);
    }

    #[test]
    fn preface_rejects_mismatch() {
        let mut state = Http2State::new();
        let bad = b"GET / HTTP/1.1\r\n\r\n....";
        assert_eq!(Err(H2Error::BadPreface), state.consume_preface(bad));
    }

    #[test]
    fn preface_matches_and_consumes_24_bytes() {
        let mut state = Http2State::new();
        assert_eq!(Ok(Some(24)), state.consume_preface(PREFACE));
        assert!(state.preface_done);
    }

    #[test]
    fn frame_reader_does_not_consume_partial_frame() {
        let mut state = Http2State::new();
        let router = Router::new();
        // A SETTINGS header declaring 6 bytes of payload, but only 2 are
        // actually present.
        let mut buf = frame_header_bytes(6, 0x04, 0, 0).to_vec();
        buf.extend([0, 0]);
        assert_eq!(None, state.advance(&buf, &router).unwrap());
    }

    #[test]
    fn oversized_frame_closes_connection() {
        let mut state = Http2State::new();
        let router = Router::new();
        let buf = frame_header_bytes(MAX_FRAME_SIZE + 1, 0x00, 0, 1).to_vec();
        assert_eq!(Err(H2Error::FrameTooLarge), state.advance(&buf, &router));
    }

    #[test]
    fn settings_ack_is_emitted_for_non_ack_settings_frame() {
        let mut state = Http2State::new();
        let router = Router::new();
        let buf = frame_header_bytes(0, 0x04, 0, 0).to_vec();
        let advance = state.advance(&buf, &router).unwrap().unwrap();
        assert_eq!(9, advance.consumed);
        assert_eq!(build_settings_ack(), advance.outbound);
    }

    #[test]
    fn ping_echoes_opaque_payload_with_ack_flag_and_preserves_length() {
        let mut state = Http2State::new();
        let router = Router::new();
        let payload = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut buf = frame_header_bytes(8, 0x06, 0, 0).to_vec();
        buf.extend(payload);
        let advance = state.advance(&buf, &router).unwrap().unwrap();
        // header (9) + 8-byte opaque payload, not the original's 17-byte
        // echo that folded the header bytes into the payload region.
        assert_eq!(17, advance.outbound.len());
        assert_eq!(FLAG_ACK, advance.outbound[4]);
        assert_eq!(payload, advance.outbound[9..]);
    }

    #[test]
    fn headers_on_stream_zero_is_rejected() {
        let mut state = Http2State::new();
        let router = Router::new();
        let buf = frame_header_bytes(1, 0x01, FLAG_END_HEADERS, 0).to_vec();
        assert_eq!(
            Err(H2Error::HeadersOnStreamZero),
            state.advance(&buf, &router)
        );
    }

    #[test]
    fn continuation_with_mismatched_stream_id_is_rejected() {
        let mut state = Http2State::new();
        let router = Router::new();
        let mut headers = frame_header_bytes(1, 0x01, 0, 1).to_vec();
        headers.push(0x82);
        state.advance(&headers, &router).unwrap();

        let cont = frame_header_bytes(1, 0x09, FLAG_END_HEADERS, 3).to_vec();
        assert_eq!(
            Err(H2Error::ContinuationStreamMismatch),
            state.advance(&cont, &router)
        );
    }

    #[test]
    fn full_headers_sequence_on_stream_one_emits_response() {
        let mut state = Http2State::new();
        let mut router = Router::new();
        router.register(crate::parser::HttpMethod::Get, "/", |_, _| {});

        let mut buf = frame_header_bytes(3, 0x01, FLAG_END_HEADERS | FLAG_END_STREAM, 1).to_vec();
        buf.extend([0x82, 0x84, 0x86]); // :method GET, :path /, :scheme http

        let advance = state.advance(&buf, &router).unwrap().unwrap();
        assert_eq!(buf.len(), advance.consumed);
        assert_eq!(build_response(1), advance.outbound);
        assert!(state.streams.get(1).unwrap().response_sent);
    }
}
