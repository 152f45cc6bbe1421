use crate::network::{BindTarget, Family};

/// Default number of unaccepted connections the kernel queues
pub const DEFAULT_BACKLOG: i32 = 5;

/// Default size of the single read done per readiness event
pub const DEFAULT_READ_SIZE: usize = 4096;

/// Default number of events taken from one epoll_wait
pub const DEFAULT_MAX_EVENTS: usize = 128;

/// Tunables of one reactor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorConfig {
    /// listen(2) backlog
    pub backlog: i32,

    /// Upper bound on the bytes handed to one `receive`
    pub read_size: usize,

    /// Events returned per poll
    pub max_events: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            read_size: DEFAULT_READ_SIZE,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

/// This holds the server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub family: Family,
    pub listen: BindTarget,
    pub reactor: ReactorConfig,
}
