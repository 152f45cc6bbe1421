use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::ReactorConfig;
use crate::error::{Hook, ReactorError};

use super::address::{BindTarget, Family, PeerAddr, SockTarget};
use super::connection::{Connection, ConnectionFactory};
use super::epoll_wrapper::{Epoll, Interest, SocketEvent};
use super::listener::ListenSocket;

/// Stops a reactor from inside one of its own callbacks.
///
/// Removes the listening socket from the epoll set and clears the active
/// flag. The batch being dispatched still runs to the end; the loop exits
/// once it has.
#[derive(Debug, Clone)]
pub struct StopHandle {
    epoll: Rc<Epoll>,
    listen_fd: RawFd,
    active: Rc<Cell<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if let Err(e) = self.epoll.unregister(self.listen_fd) {
            warn!(fd = self.listen_fd, error = %e, "failed to deregister listening socket");
        }
        if self.active.replace(false) {
            info!(fd = self.listen_fd, "reactor stopping");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Single-threaded epoll server.
///
/// Owns the listening socket, the epoll set and the registry of open
/// connections keyed by descriptor. Every registry change happens on the
/// thread running [`start`](Self::start) or [`turn`](Self::turn).
pub struct Reactor<F: ConnectionFactory> {
    factory: F,
    family: Family,
    config: ReactorConfig,
    socket: ListenSocket,
    listen_fd: RawFd,
    listening: bool,
    epoll: Rc<Epoll>,
    control: StopHandle,
    connections: HashMap<RawFd, F::Connection>,
}

impl<F: ConnectionFactory> Reactor<F> {
    pub fn new(factory: F, family: Family) -> Result<Self, ReactorError> {
        Self::with_config(factory, family, ReactorConfig::default())
    }

    /// Create the non-blocking listening socket and an empty epoll set
    pub fn with_config(
        factory: F,
        family: Family,
        config: ReactorConfig,
    ) -> Result<Self, ReactorError> {
        let socket = ListenSocket::create(family).map_err(ReactorError::Socket)?;
        let epoll = Rc::new(Epoll::create(config.max_events).map_err(ReactorError::Poll)?);
        let listen_fd = socket.fd();

        let control = StopHandle {
            epoll: Rc::clone(&epoll),
            listen_fd,
            active: Rc::new(Cell::new(true)),
        };

        Ok(Self {
            factory,
            family,
            config,
            socket,
            listen_fd,
            listening: false,
            epoll,
            control,
            connections: HashMap::new(),
        })
    }

    /// Bind, listen and register the listening socket.
    ///
    /// A Unix-domain path that is already in use is unlinked and the bind
    /// retried once. Every other bind failure is returned.
    pub fn listen(&mut self, target: impl Into<BindTarget>) -> Result<(), ReactorError> {
        let target = target.into();
        let resolved = target
            .resolve(self.family)
            .map_err(|source| ReactorError::Resolve {
                target: target.to_string(),
                source,
            })?
            .ok_or_else(|| ReactorError::TargetMismatch {
                family: self.family,
                target: target.clone(),
            })?;

        match self.socket.bind(&resolved) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => match &resolved {
                SockTarget::Unix(path) => {
                    warn!(path = %path.display(), "socket path in use, removing stale file");
                    fs::remove_file(path).map_err(|source| ReactorError::StalePath {
                        path: path.clone(),
                        source,
                    })?;
                    self.socket
                        .bind(&resolved)
                        .map_err(|source| ReactorError::Bind {
                            target: target.clone(),
                            source,
                        })?;
                }
                SockTarget::Inet(_) => return Err(ReactorError::Bind { target, source: e }),
            },
            Err(source) => return Err(ReactorError::Bind { target, source }),
        }

        self.socket
            .listen(self.config.backlog)
            .map_err(ReactorError::Listen)?;
        self.epoll
            .register(self.listen_fd, Interest::readable())
            .map_err(ReactorError::Poll)?;
        self.listening = true;

        info!(bind = %target, fd = self.listen_fd, backlog = self.config.backlog, "listening");
        Ok(())
    }

    /// Run the event loop until stopped.
    ///
    /// Each batch returned by epoll is fully dispatched before the active
    /// flag is checked.
    pub fn start(&mut self) -> Result<(), ReactorError> {
        loop {
            self.turn(None)?;
            if !self.is_active() {
                break;
            }
        }
        Ok(())
    }

    /// Poll once and dispatch every event in the batch, in kernel order.
    /// Returns the number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<usize, ReactorError> {
        let events = self.epoll.poll(timeout).map_err(ReactorError::Poll)?;
        for event in &events {
            self.route_raw_event(*event)?;
        }
        Ok(events.len())
    }

    /// Deregister the listening socket and end the loop after the current batch.
    /// Open connections are left alone.
    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.control.clone()
    }

    pub fn route_raw_event(&mut self, event: SocketEvent) -> Result<(), ReactorError> {
        let fd = event.fd;

        // A read-side close still carries data: drain it before closing
        if event.is_hangup() && !event.is_read_closed() {
            if fd == self.listen_fd {
                warn!(fd, "hangup on listening socket");
                self.stop();
                Ok(())
            } else {
                self.close_connection(fd)
            }
        } else if fd == self.listen_fd {
            self.handle_new_client_connection()
        } else {
            self.handle_input_from_client(fd, event.peer_closed)
        }
    }

    /// Deregister `fd`, run its `close` hook and drop it from the registry
    pub fn close_connection(&mut self, fd: RawFd) -> Result<(), ReactorError> {
        if !self.connections.contains_key(&fd) {
            return Err(ReactorError::UnknownDescriptor(fd));
        }
        self.epoll.unregister(fd).map_err(ReactorError::Poll)?;

        let result = match self.connections.get_mut(&fd) {
            Some(connection) => connection.close(),
            None => return Err(ReactorError::UnknownDescriptor(fd)),
        };
        self.connections.remove(&fd);

        debug!(fd, open = self.connections.len(), "connection closed");
        result.map_err(|source| ReactorError::Hook {
            fd,
            hook: Hook::Close,
            source,
        })
    }

    /// Accept exactly one pending connection
    fn handle_new_client_connection(&mut self) -> Result<(), ReactorError> {
        let (socket, peer) = match self.socket.accept() {
            Ok(accepted) => accepted,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                ) =>
            {
                debug!(error = %e, "nothing to accept");
                return Ok(());
            }
            Err(e) => return Err(ReactorError::Accept(e)),
        };

        let fd = socket.fd();
        let connection = self.factory.build(socket, peer.clone());
        self.connections.insert(fd, connection);

        if let Err(e) = self.epoll.register(fd, Interest::client()) {
            self.connections.remove(&fd);
            return Err(ReactorError::Poll(e));
        }
        debug!(fd, peer = %peer, open = self.connections.len(), "accepted connection");

        match self.connections.get_mut(&fd) {
            Some(connection) => connection.connect().map_err(|source| ReactorError::Hook {
                fd,
                hook: Hook::Connect,
                source,
            }),
            None => Err(ReactorError::UnknownDescriptor(fd)),
        }
    }

    /// One bounded read, handed to `receive` even when empty.
    ///
    /// Once the peer has closed its writing half, an empty read means the
    /// queued data is used up and the connection is closed instead.
    fn handle_input_from_client(
        &mut self,
        fd: RawFd,
        peer_closed: bool,
    ) -> Result<(), ReactorError> {
        let mut buf = vec![0u8; self.config.read_size];
        let connection = self
            .connections
            .get_mut(&fd)
            .ok_or(ReactorError::UnknownDescriptor(fd))?;

        let n = match connection.socket().read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => {
                warn!(fd, error = %e, "read failed, dropping connection");
                return self.close_connection(fd);
            }
        };

        if n == 0 && peer_closed {
            return self.close_connection(fd);
        }

        trace!(fd, bytes = n, "received");
        connection
            .receive(&buf[..n])
            .map_err(|source| ReactorError::Hook {
                fd,
                hook: Hook::Receive,
                source,
            })
    }

    pub fn listen_fd(&self) -> RawFd {
        self.listen_fd
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn local_addr(&self) -> io::Result<PeerAddr> {
        self.socket.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, fd: RawFd) -> Option<&F::Connection> {
        self.connections.get(&fd)
    }

    /// Descriptors of all open connections
    pub fn connection_fds(&self) -> Vec<RawFd> {
        self.connections.keys().copied().collect()
    }

    /// Whether `fd` is in this reactor's epoll set
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.epoll.contains(fd)
    }
}
