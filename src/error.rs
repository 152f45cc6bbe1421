use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use thiserror::Error;

use crate::network::{BindTarget, Family};

/// Which connection hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Connect,
    Receive,
    Close,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::Connect => "connect",
            Hook::Receive => "receive",
            Hook::Close => "close",
        };
        f.write_str(name)
    }
}

/// Errors raised while setting up or running a reactor
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Creating or configuring a socket failed
    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    /// The local hostname or a port could not be resolved
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The bind target cannot be used with the reactor's address family
    #[error("cannot bind {family} socket to {target}")]
    TargetMismatch { family: Family, target: BindTarget },

    /// Binding failed and was not recoverable
    #[error("failed to bind {target}: {source}")]
    Bind {
        target: BindTarget,
        #[source]
        source: io::Error,
    },

    /// A Unix-domain path was in use and could not be removed
    #[error("failed to remove stale socket path {path:?}: {source}")]
    StalePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("listen failed: {0}")]
    Listen(#[source] io::Error),

    /// epoll create, ctl or wait failed
    #[error("epoll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// An event arrived for a descriptor missing from the registry
    #[error("no connection registered for fd {0}")]
    UnknownDescriptor(RawFd),

    /// A connection hook returned an error
    #[error("{hook} hook failed for fd {fd}: {source}")]
    Hook {
        fd: RawFd,
        hook: Hook,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ReactorError {
    /// True when a bind failed because the address or path is taken
    pub fn is_addr_in_use(&self) -> bool {
        matches!(
            self,
            ReactorError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse
        )
    }
}

/// Errors raised while loading a server configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line that is not `key = value`
    #[error("line {line}: expected `key = value`, got {content:?}")]
    Syntax { line: usize, content: String },

    #[error("line {line}: unknown key {key:?}")]
    UnknownKey { line: usize, key: String },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("missing required key {0:?}")]
    MissingKey(&'static str),
}
