use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::address::PeerAddr;

/// Result of a connection hook. Any error aborts the reactor loop.
pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// An accepted, non-blocking client socket
#[derive(Debug)]
pub enum ClientSocket {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ClientSocket {
    pub fn fd(&self) -> RawFd {
        match self {
            ClientSocket::Tcp(stream) => stream.as_raw_fd(),
            ClientSocket::Unix(stream) => stream.as_raw_fd(),
        }
    }

    /// One unbuffered write. Returns how many bytes the kernel took,
    /// which may be fewer than `data.len()`.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        match self {
            ClientSocket::Tcp(stream) => (&*stream).write(data),
            ClientSocket::Unix(stream) => (&*stream).write(data),
        }
    }

    /// One bounded read into `buf`
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ClientSocket::Tcp(stream) => (&*stream).read(buf),
            ClientSocket::Unix(stream) => (&*stream).read(buf),
        }
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            ClientSocket::Tcp(stream) => stream.shutdown(how),
            ClientSocket::Unix(stream) => stream.shutdown(how),
        }
    }

    /// A second handle on the same socket (dup'd descriptor)
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            ClientSocket::Tcp(stream) => stream.try_clone().map(ClientSocket::Tcp),
            ClientSocket::Unix(stream) => stream.try_clone().map(ClientSocket::Unix),
        }
    }
}

impl AsRawFd for ClientSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

/// Behaviour attached to one accepted client.
///
/// The reactor calls the hooks; a connection never calls them itself.
/// `connect` fires once before any `receive`, `close` fires once when the
/// peer hangs up, after which the connection is dropped.
pub trait Connection {
    /// The socket this connection was built with
    fn socket(&self) -> &ClientSocket;

    fn connect(&mut self) -> HookResult {
        Ok(())
    }

    /// Bytes from a single bounded read. May be empty.
    fn receive(&mut self, data: &[u8]) -> HookResult {
        let _ = data;
        Ok(())
    }

    fn close(&mut self) -> HookResult {
        Ok(())
    }

    /// Write `data` to the peer in a single attempt.
    ///
    /// Partial writes are not retried; the returned count says how much went out.
    fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket().send(data)
    }
}

/// Builds a [`Connection`] for each accepted socket
pub trait ConnectionFactory {
    type Connection: Connection;

    fn build(&mut self, socket: ClientSocket, peer: PeerAddr) -> Self::Connection;
}

impl<F, C> ConnectionFactory for F
where
    F: FnMut(ClientSocket, PeerAddr) -> C,
    C: Connection,
{
    type Connection = C;

    fn build(&mut self, socket: ClientSocket, peer: PeerAddr) -> C {
        self(socket, peer)
    }
}

/// A connection with no behaviour of its own
#[derive(Debug)]
pub struct SocketConnection {
    socket: ClientSocket,
    peer: PeerAddr,
}

impl SocketConnection {
    pub fn new(socket: ClientSocket, peer: PeerAddr) -> Self {
        Self { socket, peer }
    }

    pub fn peer_addr(&self) -> &PeerAddr {
        &self.peer
    }
}

impl Connection for SocketConnection {
    fn socket(&self) -> &ClientSocket {
        &self.socket
    }
}

impl fmt::Display for SocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client connection from {}", self.peer)
    }
}
