//! Session tracking for client/service affinity.

use super::backend::Backend;
use super::clients::Client;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies a session: one client talking to one service port.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionKey {
    /// Client address.
    pub client: Ipv4Addr,
    /// Service port on the virtual IP.
    pub service_port: u16,
}

impl SessionKey {
    /// Create a new session key.
    #[must_use]
    pub fn new(client: Ipv4Addr, service_port: u16) -> Self {
        Self {
            client,
            service_port,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.client, self.service_port)
    }
}

/// A client bound to a backend.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    pub key: SessionKey,

    /// Backend chosen for this session.
    pub backend: Arc<Backend>,

    /// Where the client was when the session's rules were installed.
    pub client: Client,

    /// Switch that made the decision.
    pub datapath_id: u64,

    /// Session creation time.
    pub created_at: Instant,

    /// Last packet-in that resolved to this session.
    pub last_seen: Instant,
}

impl Session {
    /// Create a new session.
    #[must_use]
    pub fn new(
        backend: Arc<Backend>,
        client: Client,
        service_port: u16,
        datapath_id: u64,
        now: Instant,
    ) -> Self {
        Self {
            key: SessionKey::new(client.address, service_port),
            backend,
            client,
            datapath_id,
            created_at: now,
            last_seen: now,
        }
    }

    /// Check if the session has been idle longer than `max_idle` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > max_idle
    }
}

/// Which way a teardown segment was travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client towards the service.
    Forward,
    /// Backend towards the client.
    Return,
}

/// All live sessions, keyed by (client, service port).
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Refresh a session's `last_seen`, returning it if present.
    pub fn touch(&mut self, key: &SessionKey, now: Instant) -> Option<&Session> {
        let session = self.sessions.get_mut(key)?;
        session.last_seen = now;
        Some(session)
    }

    /// Insert a session, replacing any previous one with the same key.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.key, session)
    }

    /// Remove a session.
    pub fn remove(&mut self, key: &SessionKey) -> Option<Session> {
        self.sessions.remove(key)
    }

    /// Find the session a FIN or RST belongs to.
    ///
    /// Segments addressed to the virtual IP are keyed on the destination
    /// port. Anything else is keyed on the source port, trying the sender as
    /// the client first and then the receiver.
    #[must_use]
    pub fn resolve_teardown(
        &self,
        virtual_ip: Ipv4Addr,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
    ) -> Option<(SessionKey, Direction)> {
        if dst == virtual_ip {
            let key = SessionKey::new(src, dst_port);
            return self.sessions.contains_key(&key).then_some((key, Direction::Forward));
        }

        let forward = SessionKey::new(src, src_port);
        if self.sessions.contains_key(&forward) {
            return Some((forward, Direction::Forward));
        }

        let reverse = SessionKey::new(dst, src_port);
        self.sessions
            .contains_key(&reverse)
            .then_some((reverse, Direction::Return))
    }

    /// Remove and return every session idle longer than `max_idle`.
    pub fn expire_idle(&mut self, now: Instant, max_idle: Duration) -> Vec<Session> {
        let expired: Vec<SessionKey> = self
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now, max_idle))
            .map(|s| s.key)
            .collect();

        expired
            .iter()
            .filter_map(|key| self.sessions.remove(key))
            .collect()
    }

    /// Iterate over live sessions.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
