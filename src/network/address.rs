use std::ffi::CStr;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Address family of the listening socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    #[default]
    Inet,
    Inet6,
    Unix,
}

impl Family {
    pub(crate) fn domain(self) -> libc::c_int {
        match self {
            Family::Inet => libc::AF_INET,
            Family::Inet6 => libc::AF_INET6,
            Family::Unix => libc::AF_UNIX,
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Family::Inet => addr.is_ipv4(),
            Family::Inet6 => addr.is_ipv6(),
            Family::Unix => false,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Inet => "inet",
            Family::Inet6 => "inet6",
            Family::Unix => "unix",
        };
        f.write_str(name)
    }
}

impl FromStr for Family {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inet" | "ipv4" => Ok(Family::Inet),
            "inet6" | "ipv6" => Ok(Family::Inet6),
            "unix" => Ok(Family::Unix),
            _ => Err(()),
        }
    }
}

/// Where `listen` should bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// A port on the local hostname
    Port(u16),
    /// An explicit IP address and port
    Addr(SocketAddr),
    /// A filesystem path for a Unix-domain socket
    Path(PathBuf),
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Port(port) => write!(f, "port {}", port),
            BindTarget::Addr(addr) => write!(f, "{}", addr),
            BindTarget::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<u16> for BindTarget {
    fn from(port: u16) -> Self {
        BindTarget::Port(port)
    }
}

impl From<SocketAddr> for BindTarget {
    fn from(addr: SocketAddr) -> Self {
        BindTarget::Addr(addr)
    }
}

impl From<PathBuf> for BindTarget {
    fn from(path: PathBuf) -> Self {
        BindTarget::Path(path)
    }
}

impl From<&Path> for BindTarget {
    fn from(path: &Path) -> Self {
        BindTarget::Path(path.to_path_buf())
    }
}

/// A bind target after resolution, ready for `bind(2)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SockTarget {
    Inet(SocketAddr),
    Unix(PathBuf),
}

impl BindTarget {
    /// Resolve against `family`. `Port` is looked up on the local hostname.
    pub(crate) fn resolve(&self, family: Family) -> io::Result<Option<SockTarget>> {
        match (self, family) {
            (BindTarget::Path(path), Family::Unix) => Ok(Some(SockTarget::Unix(path.clone()))),
            (BindTarget::Path(_), _) | (_, Family::Unix) => Ok(None),
            (BindTarget::Addr(addr), family) => {
                Ok(family.accepts(addr).then_some(SockTarget::Inet(*addr)))
            }
            (BindTarget::Port(port), family) => {
                let host = local_hostname()?;
                let found = (host.as_str(), *port)
                    .to_socket_addrs()?
                    .find(|addr| family.accepts(addr));
                match found {
                    Some(addr) => Ok(Some(SockTarget::Inet(addr))),
                    None => Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("hostname {} has no {} address", host, family),
                    )),
                }
            }
        }
    }
}

/// Address of the remote end of an accepted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Inet(SocketAddr),
    /// Unix peers are usually unnamed
    Unix(Option<PathBuf>),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Inet(addr) => write!(f, "{}", addr),
            PeerAddr::Unix(Some(path)) => write!(f, "{}", path.display()),
            PeerAddr::Unix(None) => f.write_str("(unnamed)"),
        }
    }
}

impl From<std::os::unix::net::SocketAddr> for PeerAddr {
    fn from(addr: std::os::unix::net::SocketAddr) -> Self {
        PeerAddr::Unix(addr.as_pathname().map(Path::to_path_buf))
    }
}

/// Hostname of this machine, as reported by gethostname(2)
pub fn local_hostname() -> io::Result<String> {
    let mut buf = [0 as libc::c_char; 256];
    let result = unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    // gethostname may not terminate a truncated name
    buf[buf.len() - 1] = 0;
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}
