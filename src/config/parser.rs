use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::types::{ReactorConfig, ServerConfig};
use crate::error::ConfigError;
use crate::network::{BindTarget, Family};

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ServerConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_string(&content)
}

pub fn parse_config_string(content: &str) -> Result<ServerConfig, ConfigError> {
    let mut family = Family::default();
    let mut listen: Option<String> = None;
    let mut reactor = ReactorConfig::default();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // "backlog = 16" -> ("backlog", "16")
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax {
                line: line_no,
                content: line.to_string(),
            });
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "family" => family = parse_value(key, value)?,
            "listen" => listen = Some(value.to_string()),
            "backlog" => reactor.backlog = parse_positive(key, value)?,
            "read_size" => reactor.read_size = parse_positive(key, value)?,
            "max_events" => reactor.max_events = parse_positive(key, value)?,
            _ => {
                return Err(ConfigError::UnknownKey {
                    line: line_no,
                    key: key.to_string(),
                });
            }
        }
    }

    // listen is read last: its meaning depends on the family
    let listen = listen.ok_or(ConfigError::MissingKey("listen"))?;
    let listen = parse_bind_target(family, &listen)?;

    Ok(ServerConfig {
        family,
        listen,
        reactor,
    })
}

/// Port number, `ip:port`, or a path for Unix sockets
fn parse_bind_target(family: Family, value: &str) -> Result<BindTarget, ConfigError> {
    if value.is_empty() {
        return Err(invalid("listen", value));
    }
    if family == Family::Unix {
        return Ok(BindTarget::Path(PathBuf::from(value)));
    }
    if let Ok(port) = value.parse::<u16>() {
        return Ok(BindTarget::Port(port));
    }
    value
        .parse::<SocketAddr>()
        .map(BindTarget::Addr)
        .map_err(|_| invalid("listen", value))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_value(key, value)?;
    if parsed <= T::default() {
        return Err(invalid(key, value));
    }
    Ok(parsed)
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
