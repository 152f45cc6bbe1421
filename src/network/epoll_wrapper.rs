use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One readiness notification returned by [`Epoll::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketEvent {
    pub fd: RawFd,
    pub can_read: bool,
    pub has_error: bool,
    pub hung_up: bool,
    /// Peer shut down its writing half (EPOLLRDHUP)
    pub peer_closed: bool,
}

impl SocketEvent {
    /// A plain "data ready" event
    pub fn readable(fd: RawFd) -> Self {
        Self {
            fd,
            can_read: true,
            has_error: false,
            hung_up: false,
            peer_closed: false,
        }
    }

    /// A hangup event
    pub fn hangup(fd: RawFd) -> Self {
        Self {
            fd,
            can_read: false,
            has_error: false,
            hung_up: true,
            peer_closed: false,
        }
    }

    /// Any flag meaning the descriptor is finished
    pub fn is_hangup(&self) -> bool {
        self.hung_up || self.peer_closed || self.has_error
    }

    /// Peer closed its writing half but unread data may still be queued
    pub fn is_read_closed(&self) -> bool {
        self.can_read && self.peer_closed && !self.hung_up && !self.has_error
    }

    fn from_raw(ev: &libc::epoll_event) -> Self {
        let flags = ev.events;
        Self {
            fd: ev.u64 as RawFd,
            can_read: (flags & libc::EPOLLIN as u32) != 0,
            has_error: (flags & libc::EPOLLERR as u32) != 0,
            hung_up: (flags & libc::EPOLLHUP as u32) != 0,
            peer_closed: (flags & libc::EPOLLRDHUP as u32) != 0,
        }
    }
}

/// Interest flags for registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub peer_close: bool,
}

impl Interest {
    /// Incoming connections on a listening socket
    pub fn readable() -> Self {
        Self {
            read: true,
            peer_close: false,
        }
    }

    /// Data and peer shutdown on a client socket
    pub fn client() -> Self {
        Self {
            read: true,
            peer_close: true,
        }
    }
}

/// Epoll wrapper for I/O multiplexing
#[derive(Debug)]
pub struct Epoll {
    epoll_fd: RawFd,
    max_events: usize,
    registered: RefCell<HashSet<RawFd>>,
}

impl Epoll {
    /// Create new epoll instance returning at most `max_events` per poll
    pub fn create(max_events: usize) -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epoll_fd: fd,
            max_events: max_events.max(1),
            registered: RefCell::new(HashSet::new()),
        })
    }

    /// Register a file descriptor with specified interest
    pub fn register(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest)?;
        self.registered.borrow_mut().insert(fd);
        Ok(())
    }

    /// Whether `fd` was registered through this wrapper and not yet removed
    pub fn contains(&self, fd: RawFd) -> bool {
        self.registered.borrow().contains(&fd)
    }

    /// Remove fd from epoll
    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        let result = unsafe {
            libc::epoll_ctl(
                self.epoll_fd,
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };

        if result < 0 {
            // Ignore ENOENT - fd was already removed
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        self.registered.borrow_mut().remove(&fd);
        Ok(())
    }

    /// Wait for events. `None` blocks until something is ready.
    pub fn poll(&self, timeout: Option<Duration>) -> io::Result<Vec<SocketEvent>> {
        let mut raw_events = vec![libc::epoll_event { events: 0, u64: 0 }; self.max_events];
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let count = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                raw_events.as_mut_ptr(),
                raw_events.len() as i32,
                timeout_ms,
            )
        };

        if count < 0 {
            let err = io::Error::last_os_error();
            // EINTR is not a real error - just interrupted
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(raw_events[..count as usize]
            .iter()
            .map(SocketEvent::from_raw)
            .collect())
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: Self::build_event_mask(interest),
            u64: fd as u64,
        };

        let result = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Build event mask from interest flags
    fn build_event_mask(interest: Interest) -> u32 {
        let mut mask: u32 = 0;

        if interest.read {
            mask |= libc::EPOLLIN as u32;
        }
        if interest.peer_close {
            mask |= libc::EPOLLRDHUP as u32;
        }

        // Always watch for errors and hangups
        mask |= libc::EPOLLERR as u32;
        mask |= libc::EPOLLHUP as u32;

        mask
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll_fd) };
    }
}
