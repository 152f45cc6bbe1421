use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use crate::config::ReactorConfig;
use crate::network::server::Reactor;
use crate::network::{ClientSocket, Connection, ConnectionFactory, Family, HookResult, PeerAddr};

/// Hook calls in the order the reactor made them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connect(RawFd),
    Receive(RawFd, Vec<u8>),
    Close(RawFd),
}

pub type Log = Rc<RefCell<Vec<Seen>>>;

/// Records every hook into a shared log
pub struct Recorder {
    pub socket: ClientSocket,
    pub peer: PeerAddr,
    pub log: Log,
}

impl Connection for Recorder {
    fn socket(&self) -> &ClientSocket {
        &self.socket
    }

    fn connect(&mut self) -> HookResult {
        self.log.borrow_mut().push(Seen::Connect(self.socket.fd()));
        Ok(())
    }

    fn receive(&mut self, data: &[u8]) -> HookResult {
        self.log
            .borrow_mut()
            .push(Seen::Receive(self.socket.fd(), data.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> HookResult {
        self.log.borrow_mut().push(Seen::Close(self.socket.fd()));
        Ok(())
    }
}

pub fn recording_reactor(
    family: Family,
    config: ReactorConfig,
) -> (
    Reactor<impl ConnectionFactory<Connection = Recorder>>,
    Log,
) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let shared = Rc::clone(&log);
    let factory = move |socket: ClientSocket, peer: PeerAddr| Recorder {
        socket,
        peer,
        log: Rc::clone(&shared),
    };
    let reactor = Reactor::with_config(factory, family, config).expect("create reactor");
    (reactor, log)
}

/// Drive the reactor until `done` holds, failing after a few seconds
pub fn turn_until<F, P>(reactor: &mut Reactor<F>, mut done: P)
where
    F: ConnectionFactory,
    P: FnMut(&Reactor<F>) -> bool,
{
    for _ in 0..50 {
        if done(reactor) {
            return;
        }
        reactor
            .turn(Some(Duration::from_millis(100)))
            .expect("turn");
    }
    assert!(done(reactor), "reactor never reached the expected state");
}

pub fn received_by(log: &Log, fd: RawFd) -> Vec<u8> {
    log.borrow()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Receive(from, data) if *from == fd => Some(data.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn count(log: &Log, wanted: impl Fn(&Seen) -> bool) -> usize {
    log.borrow().iter().filter(|seen| wanted(seen)).count()
}
