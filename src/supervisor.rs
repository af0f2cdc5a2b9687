//! Process supervisor: preforks worker processes sharing one listening
//! socket, reaps and respawns them, and handles `SIGHUP`/`SIGQUIT`/
//! `SIGTERM`. Grounded on `original_source/src/core/worker.c`
//! (`worker_spawn`, `worker_master_start`'s `waitpid`-based reap/respawn
//! loop) and `original_source/include/core/worker_signals.h`'s
//! `reload_requested`/`shutdown_requested` flags, and
//! `original_source/src/security/privileges.c`'s
//! `setgid`→`setgroups`→`setuid` drop order.

use std::fmt::Display;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, setgid, setgroups, setuid, ForkResult, Pid, User};
use rustls::ServerConfig;

use crate::router::Router;
use crate::worker::Worker;

/// Default unprivileged user switched to after `listen`, matching
/// `original_source/src/security/privileges.c`'s `DEFAULT_USER`. Not a
/// configuration key: `spec.md` §6's recognized key table has no slot for
/// it, and the original hardcodes it the same way.
const DEFAULT_USER: &str = "zeushttp";

/// Set by the master's `SIGHUP` handler; polled by the resilience loop.
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);
/// Set by the master's `SIGQUIT`/`SIGTERM` handler; polled by the
/// resilience loop.
static MASTER_SHUTDOWN: AtomicBool = AtomicBool::new(false);
/// Set by a worker process's own `SIGQUIT`/`SIGTERM` handler, reinstalled
/// after `fork` so the child's signal disposition is independent of the
/// master's. Read directly by [`crate::worker::Worker::run`].
pub(crate) static WORKER_SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_reload(_: i32) {
    RELOAD_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_master_shutdown(_: i32) {
    MASTER_SHUTDOWN.store(true, Ordering::SeqCst);
}

extern "C" fn handle_worker_shutdown(_: i32) {
    WORKER_SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Failures from the privilege-drop primitive; `spec.md` §4.10 makes
/// these fatal.
#[derive(Debug)]
pub enum PrivilegeError {
    UnknownUser(String),
    Errno(nix::Error),
}

impl Display for PrivilegeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeError::UnknownUser(u) => write!(f, "user '{u}' not found"),
            PrivilegeError::Errno(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PrivilegeError {}

impl From<nix::Error> for PrivilegeError {
    fn from(e: nix::Error) -> Self {
        PrivilegeError::Errno(e)
    }
}

/// Drops root privileges to `user_name`'s uid/gid, in setgid →
/// setgroups → setuid order. A no-op (and not an error) if not running
/// as root, matching `drop_privileges`'s own `getuid() != 0` early
/// return.
fn drop_privileges(user_name: &str) -> Result<(), PrivilegeError> {
    if !nix::unistd::Uid::effective().is_root() {
        log::info!("privileges already dropped (not running as root)");
        return Ok(());
    }

    let user = User::from_name(user_name)
        .map_err(PrivilegeError::Errno)?
        .ok_or_else(|| PrivilegeError::UnknownUser(user_name.to_string()))?;

    setgid(user.gid)?;
    setgroups(&[user.gid])?;
    setuid(user.uid)?;

    log::info!(
        "privileges dropped to user '{user_name}' (uid={}, gid={})",
        user.uid,
        user.gid
    );
    Ok(())
}

fn install_master_signal_handlers() -> Result<(), nix::Error> {
    unsafe {
        signal::signal(Signal::SIGHUP, SigHandler::Handler(handle_reload))?;
        signal::signal(Signal::SIGQUIT, SigHandler::Handler(handle_master_shutdown))?;
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_master_shutdown))?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

/// Reinstalled in every forked child: a worker reacts to `SIGQUIT`/
/// `SIGTERM` by stopping its own event loop rather than sharing the
/// master's reload semantics (`SIGHUP` is ignored in workers — reload is
/// driven by the master replacing worker processes wholesale, not by a
/// worker reloading itself).
fn install_worker_signal_handlers() -> Result<(), nix::Error> {
    unsafe {
        signal::signal(Signal::SIGHUP, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGQUIT, SigHandler::Handler(handle_worker_shutdown))?;
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_worker_shutdown))?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Running(Pid),
    Exiting,
}

/// Preforks and supervises `num_workers` worker processes sharing one
/// listening socket. Grounded on `worker_master_start`'s
/// `Workers[]`/`waitpid(-1, ...)` resilience loop.
pub struct Supervisor {
    listener: StdTcpListener,
    router: Router,
    tls_config: Option<Arc<ServerConfig>>,
    num_workers: usize,
}

impl Supervisor {
    pub fn new(
        listener: StdTcpListener,
        router: Router,
        tls_config: Option<Arc<ServerConfig>>,
        num_workers: usize,
    ) -> Self {
        Self {
            listener,
            router,
            tls_config,
            num_workers,
        }
    }

    /// Installs signal handlers, drops privileges, forks the configured
    /// number of workers, and runs the resilience loop until a shutdown
    /// signal is observed. Returns once every worker has been reaped.
    pub fn run(mut self) -> Result<(), PrivilegeError> {
        install_master_signal_handlers().map_err(PrivilegeError::from)?;
        drop_privileges(DEFAULT_USER)?;

        let mut slots = Vec::with_capacity(self.num_workers);
        for id in 0..self.num_workers {
            slots.push(self.spawn_worker(id));
        }

        log::info!(
            "master (pid {}) supervising {} workers",
            nix::unistd::getpid(),
            self.num_workers
        );

        loop {
            if MASTER_SHUTDOWN.load(Ordering::SeqCst) {
                self.shutdown_all(&slots);
                break;
            }

            if RELOAD_REQUESTED.swap(false, Ordering::SeqCst) {
                self.reload(&mut slots);
            }

            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(nix::errno::Errno::ECHILD) => {}
                Ok(WaitStatus::Exited(pid, status)) => self.handle_exit(&mut slots, pid, status),
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    self.handle_exit(&mut slots, pid, signal as i32)
                }
                Ok(_) => {}
                Err(e) => log::warn!("waitpid error: {e}"),
            }

            sleep(Duration::from_millis(100));
        }

        Ok(())
    }

    fn spawn_worker(&self, id: usize) -> Slot {
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Slot::Running(child),
            Ok(ForkResult::Child) => {
                if let Err(e) = install_worker_signal_handlers() {
                    log::error!("worker {id}: failed to install signal handlers: {e}");
                    std::process::exit(1);
                }

                log::info!("worker {id} (pid {}) starting", nix::unistd::getpid());
                let exit_code = self.run_worker(id);
                std::process::exit(exit_code);
            }
            Err(e) => {
                log::error!("fork failed for worker {id}: {e}");
                Slot::Exiting
            }
        }
    }

    /// Runs inside the forked child: wraps the inherited listener with
    /// `mio` and drives the worker event loop until shutdown.
    fn run_worker(&self, id: usize) -> i32 {
        let listener = match self
            .listener
            .try_clone()
            .and_then(|l| Ok(MioTcpListener::from_std(l)))
        {
            Ok(l) => l,
            Err(e) => {
                log::error!("worker {id}: failed to clone listener: {e}");
                return 1;
            }
        };

        let worker = Worker::<MioTcpListener, MioTcpStream>::new(
            listener,
            self.router.clone(),
            self.tls_config.clone(),
        );

        let mut worker = match worker {
            Ok(w) => w,
            Err(e) => {
                log::error!("worker {id}: reactor creation failed: {e}");
                return 1;
            }
        };

        match worker.run() {
            Ok(()) => {
                log::info!("worker {id} (pid {}) exiting normally", nix::unistd::getpid());
                0
            }
            Err(e) => {
                log::error!("worker {id} (pid {}) exiting with error: {e}", nix::unistd::getpid());
                1
            }
        }
    }

    /// `SIGHUP`: signal every currently-running worker to exit and
    /// immediately spawn its replacement in the same slot. The old
    /// process is still reaped like any other dying worker by the main
    /// loop's `waitpid` call, but by then the slot already holds the
    /// replacement's pid, so `handle_exit`'s `Running(pid)` lookup simply
    /// finds no match for the old pid and does nothing (see its comment).
    fn reload(&mut self, slots: &mut [Slot]) {
        log::info!("reload requested, respawning workers");
        for (id, slot) in slots.iter_mut().enumerate() {
            if let Slot::Running(pid) = *slot {
                let _ = nix::sys::signal::kill(pid, Signal::SIGQUIT);
                *slot = self.spawn_worker(id);
            }
        }
    }

    /// Reaps a dead worker and respawns it in place. If `pid` no longer
    /// matches any `Running` slot, the death is for a worker already
    /// replaced by [`Supervisor::reload`] and is ignored.
    fn handle_exit(&self, slots: &mut [Slot], pid: Pid, status: i32) {
        let Some(id) = slots.iter().position(|s| matches!(s, Slot::Running(p) if *p == pid)) else {
            return;
        };

        log::warn!("worker {id} (pid {pid}) died (status {status})");
        if MASTER_SHUTDOWN.load(Ordering::SeqCst) {
            slots[id] = Slot::Exiting;
            return;
        }

        slots[id] = self.spawn_worker(id);
        log::info!("worker {id} respawned");
    }

    fn shutdown_all(&self, slots: &[Slot]) {
        log::info!("shutdown requested, signaling workers");
        for slot in slots {
            if let Slot::Running(pid) = slot {
                let _ = nix::sys::signal::kill(*pid, Signal::SIGQUIT);
            }
        }

        loop {
            match waitpid(Pid::from_raw(-1), None) {
                Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                    log::info!("worker (pid {pid}) reaped during shutdown");
                }
                Err(nix::errno::Errno::ECHILD) => break,
                Err(e) => {
                    log::warn!("waitpid error during shutdown: {e}");
                    break;
                }
                _ => {}
            }
        }
    }
}
