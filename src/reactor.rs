//! Readiness reactor: a thin wrapper over the host's edge-triggered
//! readiness facility.
//!
//! `mio::Poll` already gives us add/modify/delete plus a batched `wait`, so
//! this module mostly exists to centralize the one place the rest of the
//! crate talks to `mio` directly (outside of `net/`), and to make `delete`
//! idempotent against an already-closed descriptor, which `spec.md`'s
//! `close_connection` contract requires but `mio::Registry::deregister`
//! does not guarantee on its own.

use std::io::{self, ErrorKind};
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};

/// Interest a connection registers with the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Only readable events are of interest.
    Readable,
    /// Only writable events are of interest.
    Writable,
    /// Both readable and writable events are of interest.
    Both,
}

impl From<Readiness> for Interest {
    fn from(r: Readiness) -> Self {
        match r {
            Readiness::Readable => Interest::READABLE,
            Readiness::Writable => Interest::WRITABLE,
            Readiness::Both => Interest::READABLE | Interest::WRITABLE,
        }
    }
}

/// A batch of readiness events, one per ready descriptor.
pub struct Reactor {
    poll: Poll,
    events: Events,
}

impl Reactor {
    /// Creates a reactor with a 1024-entry event batch, matching the
    /// capacity the teacher's single-threaded listener used.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
        })
    }

    /// Registers a source under `token` with the given interest.
    pub fn add<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Readiness,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest.into())
    }

    /// Changes the interest set for an already-registered source. The
    /// token is unchanged.
    pub fn modify<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Readiness,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest.into())
    }

    /// Exposes the underlying `mio::Registry` directly, for callers (the
    /// connection object) that register/reregister sockets themselves
    /// rather than going through `add`/`modify`.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Unregisters a source. Idempotent: deregistering a descriptor the
    /// kernel has already dropped (e.g. the peer reset the connection and
    /// the fd was closed by another path first) is not an error.
    pub fn delete<S: Source + ?Sized>(&self, source: &mut S) -> io::Result<()> {
        match self.poll.registry().deregister(source) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Blocks until at least one event is ready, or `timeout` elapses.
    /// `None` blocks indefinitely. Returns the ready batch as
    /// `(token, readable, writable)` tuples.
    pub fn wait(
        &mut self,
        timeout: Option<Duration>,
    ) -> io::Result<Vec<(Token, bool, bool)>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .map(|ev| (ev.token(), ev.is_readable(), ev.is_writable()))
            .collect())
    }
}
