use thiserror::Error;

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::num::ParseIntError;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to get address for {address}: no port separator")]
    NoPortSeparator { address: String },
    #[error("failed to get port for {address}: {source}")]
    InvalidPort {
        address: String,
        source: ParseIntError,
    },
    #[error("failed to get address for {address}: {source}")]
    Lookup {
        address: String,
        source: std::io::Error,
    },
    #[error("failed to get address for {address}: no addresses found")]
    NoAddresses { address: String },
    #[error("failed to get address for {address}: no IPv4 addresses found")]
    NoIpv4Addresses { address: String },
}

/// The set of local addresses a socket may appear under in `/proc/net/udp`,
/// in the kernel's `IIIIIIII:PPPP` hex notation. Matching is
/// case-insensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressKeys {
    keys: BTreeSet<String>,
}

impl AddressKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into().to_ascii_uppercase());
    }

    /// Returns true if `candidate` matches one of the keys, ignoring case.
    pub fn matches(&self, candidate: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(candidate))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AddressKeys {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut keys = Self::new();
        for key in iter {
            keys.insert(key);
        }
        keys
    }
}

impl fmt::Display for AddressKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{key}")?;
        }
        write!(f, "]")
    }
}

/// Resolve a `host:port` listen address into the keys identifying its socket
/// in `/proc/net/udp`. Only IPv4 addresses (including IPv4-mapped IPv6
/// addresses) produce keys.
pub fn resolve(address: &str) -> Result<AddressKeys, ResolveError> {
    let (host, port) = address
        .split_once(':')
        .ok_or_else(|| ResolveError::NoPortSeparator {
            address: address.to_string(),
        })?;

    let port: u16 = port.parse().map_err(|source| ResolveError::InvalidPort {
        address: address.to_string(),
        source,
    })?;

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            address: address.to_string(),
            source,
        })?;

    address_keys(address, addrs.map(|a| a.ip()), port)
}

fn address_keys(
    address: &str,
    ips: impl IntoIterator<Item = IpAddr>,
    port: u16,
) -> Result<AddressKeys, ResolveError> {
    let mut resolved = 0;
    let mut keys = AddressKeys::new();

    for ip in ips {
        resolved += 1;

        let ipv4 = match ip {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(ip) => ip,
                None => continue,
            },
        };

        keys.insert(address_key(ipv4, port));
    }

    if resolved == 0 {
        return Err(ResolveError::NoAddresses {
            address: address.to_string(),
        });
    }

    if keys.is_empty() {
        return Err(ResolveError::NoIpv4Addresses {
            address: address.to_string(),
        });
    }

    Ok(keys)
}

/// Format an address the way the kernel prints the `local_address` column:
/// the address as a native (little-endian) u32 followed by the port, both in
/// uppercase hex.
pub fn address_key(ip: Ipv4Addr, port: u16) -> String {
    format!("{:08X}:{:04X}", u32::from_le_bytes(ip.octets()), port)
}
