//! Address parsing
//!
//! Splits a channel url into the destination (used as connection cache key)
//! and the object uri that follows it.
//!
//! ```text
//! tcp://host:port/objectUri
//! \\host\pipe\pipeName\objectUri
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, WireError};

const TCP_PREFIX: &str = "tcp://";
const PIPE_MARKER: &str = "pipe";

/// Destination of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// TCP endpoint
    Tcp { host: String, port: u16 },

    /// Local named pipe
    Pipe { host: String, name: String },
}

impl Address {
    /// Parse a bare destination (no object uri allowed)
    pub fn parse(address: &str) -> Result<Self> {
        let (destination, object_uri) = parse_url(address)?;
        if !object_uri.is_empty() {
            return Err(WireError::InvalidAddress(format!(
                "unexpected object uri '{}' in '{}'",
                object_uri, address
            )));
        }
        Ok(destination)
    }

    /// True for endpoints that can only be reached from this machine
    pub fn is_local(&self) -> bool {
        match self {
            Address::Tcp { host, .. } => {
                host == "localhost" || host == "127.0.0.1" || host == "::1" || host == "[::1]"
            }
            Address::Pipe { .. } => true,
        }
    }

    /// `host:port` form accepted by `std::net`
    pub(crate) fn socket_addr_string(&self) -> Option<String> {
        match self {
            Address::Tcp { host, port } => Some(format!("{}:{}", host, port)),
            Address::Pipe { .. } => None,
        }
    }

    /// Filesystem path backing a pipe address
    pub(crate) fn pipe_path(&self) -> Option<PathBuf> {
        match self {
            Address::Pipe { name, .. } => {
                Some(std::env::temp_dir().join(format!("wirecall-{}.sock", name)))
            }
            Address::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "{}{}:{}", TCP_PREFIX, host, port),
            Address::Pipe { host, name } => write!(f, r"\\{}\{}\{}", host, PIPE_MARKER, name),
        }
    }
}

/// Parse a channel url into its destination and object uri
///
/// The object uri keeps a leading `/` for tcp urls and is normalised to a
/// leading `/` for pipe urls, so both forms address services the same way.
/// An empty object uri is returned as an empty string.
pub fn parse_url(url: &str) -> Result<(Address, String)> {
    if let Some(rest) = url.strip_prefix(TCP_PREFIX) {
        return parse_tcp(url, rest);
    }
    if let Some(rest) = url.strip_prefix(r"\\") {
        return parse_pipe(url, rest);
    }
    Err(WireError::InvalidAddress(format!(
        "unsupported channel url '{}'",
        url
    )))
}

fn parse_tcp(url: &str, rest: &str) -> Result<(Address, String)> {
    let (authority, object_uri) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    // Bracketed IPv6 hosts contain ':' so split on the last one
    let colon = authority
        .rfind(':')
        .ok_or_else(|| WireError::InvalidAddress(format!("missing port in '{}'", url)))?;
    let host = &authority[..colon];
    let port = authority[colon + 1..]
        .parse::<u16>()
        .map_err(|_| WireError::InvalidAddress(format!("invalid port in '{}'", url)))?;

    if host.is_empty() {
        return Err(WireError::InvalidAddress(format!("missing host in '{}'", url)));
    }

    let object_uri = if object_uri == "/" { "" } else { object_uri };
    Ok((
        Address::Tcp {
            host: host.to_string(),
            port,
        },
        object_uri.to_string(),
    ))
}

fn parse_pipe(url: &str, rest: &str) -> Result<(Address, String)> {
    let mut parts = rest.splitn(4, '\\');
    let host = parts.next().unwrap_or_default();
    let marker = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    let object_uri = parts.next().unwrap_or_default();

    if host.is_empty() || !marker.eq_ignore_ascii_case(PIPE_MARKER) || name.is_empty() {
        return Err(WireError::InvalidAddress(format!(
            "expected \\\\host\\pipe\\name in '{}'",
            url
        )));
    }

    let object_uri = object_uri.replace('\\', "/");
    let object_uri = if object_uri.is_empty() || object_uri.starts_with('/') {
        object_uri
    } else {
        format!("/{}", object_uri)
    };

    Ok((
        Address::Pipe {
            host: host.to_string(),
            name: name.to_string(),
        },
        object_uri,
    ))
}
