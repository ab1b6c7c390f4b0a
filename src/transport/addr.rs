//! `protocol@address` strings used by discovery and `xdial`.

use std::fmt;
use std::str::FromStr;

use crate::error::RpcError;

/// Transport a client dials over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain TCP.
    Tcp,
    /// TCP through an HTTP `CONNECT` tunnel.
    Http,
    /// Unix domain socket.
    Unix,
}

impl Protocol {
    /// Name as it appears before the `@`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Unix => "unix",
        }
    }
}

impl FromStr for Protocol {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "unix" => Ok(Protocol::Unix),
            other => Err(RpcError::Discovery(format!(
                "unsupported protocol {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `protocol@address`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpcAddr {
    pub protocol: Protocol,
    pub address: String,
}

impl RpcAddr {
    pub fn new(protocol: Protocol, address: impl Into<String>) -> Self {
        Self {
            protocol,
            address: address.into(),
        }
    }
}

impl FromStr for RpcAddr {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wrong_format =
            || RpcError::Discovery(format!("wrong format '{}', expect protocol@addr", s));

        let (protocol, address) = s.split_once('@').ok_or_else(wrong_format)?;
        if address.is_empty() || address.contains('@') {
            return Err(wrong_format());
        }

        Ok(Self {
            protocol: protocol.parse()?,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for RpcAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.protocol, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        let addr: RpcAddr = "tcp@127.0.0.1:9999".parse().unwrap();
        assert_eq!(addr, RpcAddr::new(Protocol::Tcp, "127.0.0.1:9999"));

        let addr: RpcAddr = "unix@/tmp/tinyrpc.sock".parse().unwrap();
        assert_eq!(addr.protocol, Protocol::Unix);
        assert_eq!(addr.address, "/tmp/tinyrpc.sock");

        let addr: RpcAddr = "http@localhost:80".parse().unwrap();
        assert_eq!(addr.to_string(), "http@localhost:80");
    }

    #[test]
    fn test_wrong_format() {
        for bad in ["127.0.0.1:9999", "tcp@", "tcp@a@b"] {
            let err = bad.parse::<RpcAddr>().unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("rpc discovery: wrong format '{}', expect protocol@addr", bad)
            );
        }
    }

    #[test]
    fn test_unknown_protocol() {
        assert!("udp@1.2.3.4:5".parse::<RpcAddr>().is_err());
    }
}
