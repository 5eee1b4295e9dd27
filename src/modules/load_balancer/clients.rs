//! Client learning table.

use crate::packet::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// A host that has been observed on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Client {
    /// Network address.
    pub address: Ipv4Addr,
    /// Link-layer address.
    pub mac: MacAddr,
    /// Switch port the host was seen on.
    pub switch_port: u32,
}

/// Result of feeding an observation to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    /// First time this address was seen.
    New,
    /// Address known, but its MAC or port changed.
    Moved,
    /// Nothing changed.
    Unchanged,
}

/// Address → location table for every observed host.
///
/// Entries are never removed; a host that moves overwrites its entry.
#[derive(Debug, Clone, Default)]
pub struct ClientTable {
    clients: HashMap<Ipv4Addr, Client>,
}

impl ClientTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `address` was seen with `mac` on `switch_port`.
    pub fn learn(&mut self, address: Ipv4Addr, mac: MacAddr, switch_port: u32) -> Learned {
        let client = Client {
            address,
            mac,
            switch_port,
        };

        match self.clients.insert(address, client) {
            None => Learned::New,
            Some(previous) if previous == client => Learned::Unchanged,
            Some(_) => Learned::Moved,
        }
    }

    /// Look up a client.
    #[must_use]
    pub fn get(&self, address: Ipv4Addr) -> Option<&Client> {
        self.clients.get(&address)
    }

    /// Check whether `address` has been learned.
    #[must_use]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.clients.contains_key(&address)
    }

    /// Number of learned hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no host has been learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);

    #[test]
    fn test_learn_and_move() {
        let mut table = ClientTable::new();
        let mac = MacAddr::new(0, 0, 0, 0, 0, 4);

        assert_eq!(table.learn(HOST, mac, 4), Learned::New);
        assert_eq!(table.learn(HOST, mac, 4), Learned::Unchanged);
        assert_eq!(table.learn(HOST, mac, 5), Learned::Moved);

        let client = table.get(HOST).unwrap();
        assert_eq!(client.switch_port, 5);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_host() {
        let table = ClientTable::new();
        assert!(table.is_empty());
        assert!(!table.contains(HOST));
        assert!(table.get(HOST).is_none());
    }
}
