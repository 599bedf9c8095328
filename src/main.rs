//! netcore command line client.
//!
//! Drives a `Network` from a plain host loop: every command queues work,
//! then ticks `Network::update()` until the work is done.
//!
//! ```text
//! netcore get  <url>                    fetch and print a body
//! netcore post <url> <json>             post JSON and print the reply
//! netcore serve --port 7000             echo every byte back to its sender
//! netcore connect <host> <port> <msg>   send a line, print what comes back
//! ```

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::Value;

use netcore::config::loader::load_config;
use netcore::net::ConnectionState;
use netcore::observability::{logging, metrics};
use netcore::{ConnectionId, Network, NetworkConfig, Request};

const TICK: Duration = Duration::from_millis(5);

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "netcore")]
#[command(about = "HTTP requests and raw TCP from a polled network core", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL with GET
    Get {
        url: String,
        /// Reject bodies larger than this many bytes (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max_size: usize,
        /// Follow 3xx redirects
        #[arg(long)]
        follow: bool,
    },
    /// POST a JSON document
    Post {
        url: String,
        body: String,
        #[arg(long, default_value_t = 0)]
        max_size: usize,
    },
    /// Run a TCP echo server
    Serve {
        #[arg(short, long, default_value_t = 7000)]
        port: u16,
    },
    /// Connect, send one message and print the reply
    Connect {
        address: String,
        port: u16,
        message: String,
        /// How long to wait for a reply
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NetworkConfig::default(),
    };

    logging::init_logging(&config.observability);
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let mut network = Network::new(config)?;

    match cli.command {
        Commands::Get { url, max_size, follow } => {
            let outcome = Outcome::default();
            let (on_response, on_reject) = outcome.callbacks();
            network.submit(Request::get(url, on_response, on_reject, max_size).follow_redirects(follow));
            let body = outcome.wait(&mut network)?;
            print_body(&body)?;
        }
        Commands::Post { url, body, max_size } => {
            serde_json::from_str::<Value>(&body)?;
            let outcome = Outcome::default();
            let (on_response, on_reject) = outcome.callbacks();
            network.post(url, body, on_response, on_reject, max_size);
            let reply = outcome.wait(&mut network)?;
            print_body(&reply)?;
        }
        Commands::Serve { port } => serve(&mut network, port)?,
        Commands::Connect {
            address,
            port,
            message,
            wait_ms,
        } => {
            let reply = exchange(&mut network, &address, port, message.as_bytes(), Duration::from_millis(wait_ms))?;
            println!("{}", String::from_utf8_lossy(&reply));
        }
    }

    tracing::info!(
        upload = network.total_upload(),
        download = network.total_download(),
        "Done"
    );
    Ok(())
}

/// Slot filled by one of a request's two callbacks.
#[derive(Default, Clone)]
struct Outcome(Rc<RefCell<Option<Result<Vec<u8>, u16>>>>);

impl Outcome {
    fn callbacks(&self) -> (impl FnOnce(Vec<u8>) + 'static, impl FnOnce(u16) + 'static) {
        let ok = self.clone();
        let err = self.clone();
        (
            move |body| *ok.0.borrow_mut() = Some(Ok(body)),
            move |status| *err.0.borrow_mut() = Some(Err(status)),
        )
    }

    fn wait(&self, network: &mut Network) -> AppResult<Vec<u8>> {
        loop {
            network.update();
            if let Some(result) = self.0.borrow_mut().take() {
                return result.map_err(|status| format!("request rejected with status {status}").into());
            }
            std::thread::sleep(TICK);
        }
    }
}

fn print_body(body: &[u8]) -> AppResult<()> {
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(body)),
    }
    Ok(())
}

fn serve(network: &mut Network, port: u16) -> AppResult<()> {
    let (tx, rx) = mpsc::channel();
    let listener = network.open_server(port, move |id| {
        let _ = tx.send(id);
    })?;
    if let Some(server) = network.get_server(listener) {
        tracing::info!(port = server.port(), "Echo server listening");
    }

    let mut clients: Vec<ConnectionId> = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        network.update();
        clients.extend(rx.try_iter());

        clients.retain(|&id| {
            let Some(conn) = network.get_connection(id) else {
                return false;
            };
            while let Some(n) = conn.recv(&mut buf) {
                if n == 0 {
                    break;
                }
                if let Err(e) = conn.send(&buf[..n]) {
                    tracing::warn!(connection = %id, error = %e, "Echo failed");
                    break;
                }
            }
            true
        });
        std::thread::sleep(TICK);
    }
}

fn exchange(
    network: &mut Network,
    address: &str,
    port: u16,
    message: &[u8],
    wait: Duration,
) -> AppResult<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let id = network.connect(address, port, move |id| {
        let _ = tx.send(id);
    })?;

    loop {
        network.update();
        if rx.try_recv().is_ok() {
            break;
        }
        match network.get_connection(id) {
            Some(conn) if conn.state() != ConnectionState::Closed => {}
            _ => return Err(format!("could not connect to {address}:{port}").into()),
        }
        std::thread::sleep(TICK);
    }

    let conn = network
        .get_connection(id)
        .ok_or_else(|| format!("connection to {address}:{port} went away"))?;
    conn.send(message)?;

    let deadline = Instant::now() + wait;
    let mut reply = Vec::new();
    let mut buf = [0u8; 4096];
    while Instant::now() < deadline {
        network.update();
        match conn.recv(&mut buf) {
            Some(0) => {}
            Some(n) => reply.extend_from_slice(&buf[..n]),
            None => break,
        }
        if reply.len() >= message.len() {
            break;
        }
        std::thread::sleep(TICK);
    }
    conn.close(false);
    Ok(reply)
}
