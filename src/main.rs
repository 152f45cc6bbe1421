//! Echo server: every message received is sent to all open connections.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::process::ExitCode;
use std::rc::Rc;

use octopus::config::{ReactorConfig, ServerConfig, parse_config_file};
use octopus::{BindTarget, ClientSocket, Connection, Family, HookResult, PeerAddr, Reactor};
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 9876;

type Peers = Rc<RefCell<HashMap<RawFd, ClientSocket>>>;

struct EchoConnection {
    socket: ClientSocket,
    peer: PeerAddr,
    peers: Peers,
}

impl Connection for EchoConnection {
    fn socket(&self) -> &ClientSocket {
        &self.socket
    }

    fn connect(&mut self) -> HookResult {
        info!(peer = %self.peer, "client connected");
        let handle = self.socket.try_clone()?;
        self.peers.borrow_mut().insert(self.socket.fd(), handle);
        Ok(())
    }

    fn receive(&mut self, data: &[u8]) -> HookResult {
        if data.is_empty() {
            return Ok(());
        }
        for (fd, peer) in self.peers.borrow().iter() {
            // Best effort: one slow client must not take the server down
            if let Err(e) = peer.send(data) {
                warn!(fd = *fd, error = %e, "broadcast write failed");
            }
        }
        Ok(())
    }

    fn close(&mut self) -> HookResult {
        info!(peer = %self.peer, "client disconnected");
        self.peers.borrow_mut().remove(&self.socket.fd());
        Ok(())
    }
}

fn load_config() -> Result<ServerConfig, octopus::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => parse_config_file(path),
        None => Ok(ServerConfig {
            family: Family::Inet,
            listen: BindTarget::Port(DEFAULT_PORT),
            reactor: ReactorConfig::default(),
        }),
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("octopus=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn run(config: ServerConfig) -> Result<(), octopus::ReactorError> {
    let peers: Peers = Rc::new(RefCell::new(HashMap::new()));

    let factory = move |socket: ClientSocket, peer: PeerAddr| EchoConnection {
        socket,
        peer,
        peers: Rc::clone(&peers),
    };

    let mut reactor = Reactor::with_config(factory, config.family, config.reactor)?;
    reactor.listen(config.listen)?;
    reactor.start()
}

fn main() -> ExitCode {
    init_logging();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(config) {
        error!("server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
