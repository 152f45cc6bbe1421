mod address;
mod connection;
mod epoll_wrapper;
mod listener;
pub mod server;

pub use address::{BindTarget, Family, PeerAddr, local_hostname};
pub use connection::{ClientSocket, Connection, ConnectionFactory, HookResult, SocketConnection};
pub use epoll_wrapper::{Epoll, Interest, SocketEvent};
