//! Worker event loop: a single, un-threaded reactor loop per forked
//! worker process. Grounded on `multilistener.rs`'s single-threaded
//! `run`/`accept`/`event` methods (the `vacant_entry()`/`Token(entry.key())`
//! slab idiom is kept verbatim) and `original_source/src/core/event_loop.c`'s
//! `zeus_worker_loop`. The teacher's threaded `listener.rs`/`worker.rs`
//! channel model is not used: `spec.md` §5 requires one thread per worker
//! process with no locking between connections.

use std::cell::RefCell;
use std::io::{ErrorKind, Read, Write};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::supervisor::WORKER_SHUTDOWN;

use mio::event::Source;
use mio::Token;
use rustls::ServerConfig;
use slab::Slab;

use crate::connection::Connection;
use crate::net::tcp_listener::TcpListener;
use crate::net::tcp_stream::TcpStream;
use crate::reactor::{Readiness, Reactor};
use crate::router::Router;

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Drives one worker process's connections to completion. Owns the
/// listening socket (inherited from the supervisor via fork, shared via
/// the OS rather than any in-process lock) and every connection it
/// accepts — nothing here is ever touched from another thread.
pub struct Worker<L, S>
where
    S: TcpStream + Read + Write + Source,
    L: TcpListener<S> + Source,
{
    reactor: Reactor,
    listener: L,
    connections: Slab<Rc<RefCell<Connection<S>>>>,
    router: Router,
    tls_config: Option<Arc<ServerConfig>>,
    shutdown: &'static AtomicBool,
}

impl<L, S> Worker<L, S>
where
    S: TcpStream + Read + Write + Source,
    L: TcpListener<S> + Source,
{
    /// Builds a worker, registering `listener` with a fresh reactor under
    /// the reserved listener token. `tls_config` being `Some` puts every
    /// accepted connection through the TLS handshake driver before any
    /// application protocol runs; `None` accepts plaintext HTTP/1.1 only,
    /// used by tests and any future non-TLS listening port. The shutdown
    /// flag is the process-wide [`WORKER_SHUTDOWN`] static that the
    /// supervisor's worker-side signal handlers set directly — there is
    /// exactly one worker event loop per process, so a single static flag
    /// is simpler than threading an `Arc` through for no added value.
    pub fn new(
        mut listener: L,
        router: Router,
        tls_config: Option<Arc<ServerConfig>>,
    ) -> std::io::Result<Self> {
        let reactor = Reactor::new()?;
        reactor.add(&mut listener, LISTENER_TOKEN, Readiness::Readable)?;

        Ok(Self {
            reactor,
            listener,
            connections: Slab::new(),
            router,
            tls_config,
            shutdown: &WORKER_SHUTDOWN,
        })
    }

    /// Runs until the shutdown flag is observed set. Checked after every
    /// dispatched event and after every `wait` batch, so a signal handler
    /// setting the flag mid-batch is honored promptly rather than only
    /// between `poll` calls (`spec.md` §4.9).
    pub fn run(&mut self) -> std::io::Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            let events = match self.reactor.wait(Some(Duration::from_millis(100))) {
                Ok(events) => events,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            for (token, readable, writable) in events {
                if token == LISTENER_TOKEN {
                    self.accept_all()?;
                } else {
                    self.dispatch(token, readable, writable);
                }

                if self.shutdown.load(Ordering::SeqCst) {
                    self.close_all_connections();
                    return Ok(());
                }
            }
        }

        self.close_all_connections();
        Ok(())
    }

    /// Best-effort teardown of every connection still live when shutdown is
    /// observed (`spec.md` §4.9): each gets its `close_notify` + socket
    /// shutdown via [`Connection::close`] rather than being dropped bare,
    /// which would only close the raw fd.
    fn close_all_connections(&mut self) {
        for (_, conn) in self.connections.iter() {
            conn.borrow_mut().close(self.reactor.registry());
        }
        self.connections.clear();
    }

    fn accept_all(&mut self) -> std::io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => self.accept_one(stream)?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn accept_one(&mut self, stream: S) -> std::io::Result<()> {
        let _ = stream.set_nodelay(true);

        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());

        let mut connection = match &self.tls_config {
            Some(config) => Connection::new_tls(token, stream, config.clone())
                .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?,
            None => Connection::new_plain(token, stream),
        };

        connection.register(self.reactor.registry())?;
        entry.insert(Rc::new(RefCell::new(connection)));
        Ok(())
    }

    /// Dispatches one readiness event. An extra `Rc` clone is held for the
    /// duration of the callback (`spec.md` §9's "extra reference during a
    /// callback batch" requirement) so the connection survives even if a
    /// handler closes it; the slab entry itself is removed only after the
    /// callback returns and `is_closing()` is observed true, at which
    /// point the connection's own last reference drops and it is freed.
    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(conn) = self.connections.get(token.0).cloned() else {
            return;
        };

        {
            let mut conn = conn.borrow_mut();
            if readable {
                conn.on_readable(self.reactor.registry(), &self.router);
            }
            if writable && !conn.is_closing() {
                conn.on_writable(self.reactor.registry());
            }
        }

        if conn.borrow().is_closing() {
            self.connections.remove(token.0);
        }
    }
}
