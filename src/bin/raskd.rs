//! Process entry point: loads configuration, builds the TLS context and
//! route table, binds the listening socket, and hands control to the
//! [`rask::supervisor::Supervisor`]. Grounded on
//! `original_source/src/main.c`'s `main` (`zeus_server_init` →
//! `tls_context_init` → `worker_master_start`).

use std::fs::File;
use std::io::{BufReader, Write};
use std::net::TcpListener as StdTcpListener;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use rask::config::Config;
use rask::parser::{status::Status, HttpMethod};
use rask::response::Response;
use rask::router::Router;
use rask::supervisor::Supervisor;

/// Initializes `env_logger` once, before the supervisor forks, so every
/// worker inherits the same filter configuration. Each line is tagged
/// with the writing process's pid, mirroring
/// `original_source/src/core/log.c`'s prefix — the one piece of
/// formatting that matters once master and workers interleave into the
/// same sink.
fn init_logging(log_file: &str) {
    let mut builder = env_logger::Builder::from_default_env();
    if log_file != "stderr" {
        match File::options().create(true).append(true).open(log_file) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("failed to open log_file '{log_file}' ({e}), falling back to stderr");
            }
        }
    }
    builder
        .filter_level(log::LevelFilter::Info)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} pid={}] {}: {}",
                buf.timestamp(),
                std::process::id(),
                record.level(),
                record.args()
            )
        })
        .init();
}

/// Loads a certificate chain and private key from PEM files, matching
/// `original_source/src/security/tls_context.c`'s `tls_context_init`.
fn load_tls(cert_path: &Path, key_path: &Path) -> std::io::Result<ServerConfig> {
    let mut cert_reader = BufReader::new(File::open(cert_path)?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()?;

    let mut key_reader = BufReader::new(File::open(key_path)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key found in key file")
        })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // `spec.md` §6: ALPN advertised as the wire string `\x02h2\x08http/1.1`,
    // tried in the client's order; no mutual match falls back to HTTP/1.1.
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// The route table served by this process. A real deployment would grow
/// this with its own handlers; the demo route here exercises the same
/// path `spec.md` §8's "HTTP/1 hello" scenario describes.
fn build_router() -> Router {
    let mut router = Router::new();
    router.register(HttpMethod::Get, "/", |_req, resp: &mut Response| {
        if resp.send_data(Status::r#Ok, b"Hello").is_err() {
            log::error!("/ handler's response did not fit in the response buffer");
        }
    });
    router
}

fn main() -> std::process::ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rask.conf".to_string());

    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: invalid configuration: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_file);
    log::info!("starting with configuration: {config:?}");

    let bind_addr = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = match StdTcpListener::bind(&bind_addr) {
        Ok(l) => l,
        Err(e) => {
            log::error!("fatal: failed to bind {bind_addr}: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    if let Err(e) = listener.set_nonblocking(true) {
        log::error!("fatal: failed to set listener non-blocking: {e}");
        return std::process::ExitCode::FAILURE;
    }

    let tls_config = match load_tls(
        Path::new(&config.tls_cert_path),
        Path::new(&config.tls_key_path),
    ) {
        Ok(c) => Some(Arc::new(c)),
        Err(e) => {
            log::error!(
                "fatal: failed to load TLS certificate/key ({} / {}): {e}",
                config.tls_cert_path,
                config.tls_key_path
            );
            return std::process::ExitCode::FAILURE;
        }
    };

    let router = build_router();
    let supervisor = Supervisor::new(listener, router, tls_config, config.num_workers);

    match supervisor.run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: supervisor error: {e}");
            let _ = std::io::stderr().flush();
            std::process::ExitCode::FAILURE
        }
    }
}
