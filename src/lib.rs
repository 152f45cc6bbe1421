//! Octopus: a single-threaded, epoll-driven TCP / Unix-domain socket server.
//!
//! A [`Reactor`](network::server::Reactor) owns the listening socket, the
//! epoll set and a registry of open connections. Behaviour is supplied by the
//! caller through the [`Connection`](network::Connection) trait. Linux only:
//! readiness comes from epoll.

pub mod config;
pub mod error;
pub mod network;

#[cfg(test)]
mod tests;

pub use error::{ConfigError, ReactorError};
pub use network::server::{Reactor, StopHandle};
pub use network::{
    BindTarget, ClientSocket, Connection, ConnectionFactory, Family, HookResult, PeerAddr,
    SocketConnection,
};
