use std::collections::BTreeSet;

use crate::error::LedgerError;

/// Reduce a peer URL such as `http://Node-A:5001/get_chain` to its
/// `host:port` authority (`node-a:5001`). Bare authorities are accepted as is.
pub fn normalize_peer(address: &str) -> Result<String, LedgerError> {
    let malformed = || LedgerError::MalformedPeer(address.to_string());

    let trimmed = address.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() => rest,
        Some(_) => return Err(malformed()),
        None => trimmed,
    };
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    if host_port.is_empty() || host_port.chars().any(char::is_whitespace) {
        return Err(malformed());
    }

    let (host, port) = match host_port.strip_prefix('[') {
        Some(bracketed) => {
            let (host, after) = bracketed.split_once(']').ok_or_else(malformed)?;
            match after {
                "" => (host, None),
                _ => (host, Some(after.strip_prefix(':').ok_or_else(malformed)?)),
            }
        }
        None => match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        },
    };
    if host.is_empty() || port.is_some_and(|p| !is_port(p)) {
        return Err(malformed());
    }
    Ok(host_port.to_ascii_lowercase())
}

fn is_port(port: &str) -> bool {
    !port.is_empty() && port.parse::<u16>().is_ok()
}

/// Known peers keyed by normalized `host:port`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerSet {
    peers: BTreeSet<String>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the peer was not already known.
    pub fn insert(&mut self, address: &str) -> Result<bool, LedgerError> {
        let key = normalize_peer(address)?;
        Ok(self.peers.insert(key))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }
}
