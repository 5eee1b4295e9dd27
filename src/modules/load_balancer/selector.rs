//! Backend selection: session affinity first, then per-port round-robin.

use super::backend::{Backend, BackendRegistry};
use super::clients::Client;
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::session::{Session, SessionKey, SessionTable};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Outcome of a selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Backend the client is bound to.
    pub backend: Arc<Backend>,
    /// Client location recorded with the session.
    pub client: Client,
    /// Whether a new session was created for this decision.
    pub is_new: bool,
}

/// Round-robin cursors, one per service port.
///
/// Rotation for one port never disturbs another: B2 serving both 8080 and
/// 8181 advances independently on each.
#[derive(Debug, Clone, Default)]
pub struct BackendSelector {
    cursors: HashMap<u16, usize>,
}

impl BackendSelector {
    /// Create a selector with every cursor at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a backend for `client` on `service_port`.
    ///
    /// A live session wins, keeping the client location it was created
    /// with. Otherwise the next eligible backend for the port is chosen and a
    /// session is recorded for it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::NoEligibleBackend`] when no backend serves
    /// the port. No session is created in that case.
    pub fn select(
        &mut self,
        registry: &BackendRegistry,
        sessions: &mut SessionTable,
        client: Client,
        service_port: u16,
        datapath_id: u64,
        now: Instant,
    ) -> LoadBalancerResult<Selection> {
        let key = SessionKey::new(client.address, service_port);

        if let Some(session) = sessions.touch(&key, now) {
            return Ok(Selection {
                backend: Arc::clone(&session.backend),
                client: session.client,
                is_new: false,
            });
        }

        let eligible = registry.eligible(service_port);
        if eligible.is_empty() {
            return Err(LoadBalancerError::NoEligibleBackend(service_port));
        }

        let cursor = self.cursors.entry(service_port).or_insert(0);
        let backend = Arc::clone(&eligible[*cursor % eligible.len()]);
        *cursor = (*cursor + 1) % eligible.len();

        sessions.insert(Session::new(
            Arc::clone(&backend),
            client,
            service_port,
            datapath_id,
            now,
        ));

        info!(
            client = %client.address,
            port = service_port,
            backend = %backend.address(),
            "New session"
        );

        Ok(Selection {
            backend,
            client,
            is_new: true,
        })
    }

    /// Current cursor for `service_port`.
    #[must_use]
    pub fn cursor(&self, service_port: u16) -> usize {
        self.cursors.get(&service_port).copied().unwrap_or(0)
    }
}
