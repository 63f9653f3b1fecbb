use mongodb::options::ServerAddress;

use crate::ConnectionError;
use crate::Result;

pub(crate) const DEFAULT_PORT: u16 = 27017;

/// Parses `host[:port]` as written in the configuration or reported by a
/// member. IPv6 literals must be bracketed.
pub(crate) fn parse_address(address: &str) -> Result<ServerAddress> {
    let invalid = |reason: &str| ConnectionError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty address").into());
    }

    let (host, port) = match trimmed.rsplit_once(':') {
        Some((host, _)) if !host.ends_with(']') && host.contains(':') => {
            return Err(invalid("IPv6 hosts must be bracketed").into());
        }
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
            if port == 0 {
                return Err(invalid("port cannot be 0").into());
            }
            (host, port)
        }
        None => (trimmed, DEFAULT_PORT),
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("empty host").into());
    }

    Ok(ServerAddress::Tcp {
        host: host.to_string(),
        port: Some(port),
    })
}

/// Canonical `host:port` form used to compare member names
pub(crate) fn member_key(address: &str) -> String {
    match parse_address(address) {
        Ok(ServerAddress::Tcp { host, port }) => {
            format!("{}:{}", host.to_ascii_lowercase(), port.unwrap_or(DEFAULT_PORT))
        }
        _ => address.trim().to_ascii_lowercase(),
    }
}
