//! OpenFlow listener.

use super::error::ControllerResult;
use super::switch::{SwitchConnection, SwitchSettings};
use crate::modules::load_balancer::LoadBalancer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lower bound on the expiry sweep period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Accepts switch connections and runs one task per switch.
pub struct ControllerServer {
    listener: TcpListener,
    balancer: Arc<Mutex<LoadBalancer>>,
    settings: SwitchSettings,
}

impl std::fmt::Debug for ControllerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ControllerServer {
    /// Bind the OpenFlow listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        balancer: Arc<Mutex<LoadBalancer>>,
        settings: SwitchSettings,
    ) -> ControllerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            balancer,
            settings,
        })
    }

    /// The bound address (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> ControllerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve switches until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Never fails after binding; accept errors are logged and skipped.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> ControllerResult<()> {
        info!(addr = ?self.listener.local_addr().ok(), "OpenFlow controller listening");

        let sweeper = self.spawn_expiry_sweep().await;
        let mut connections = Vec::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            connections.retain(|h: &JoinHandle<()>| !h.is_finished());
                            connections.push(self.spawn_connection(stream, peer));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Controller shutting down");
                    break;
                }
            }
        }

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        for handle in connections {
            handle.abort();
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) -> JoinHandle<()> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let balancer = Arc::clone(&self.balancer);
        let settings = self.settings;
        tokio::spawn(async move {
            if let Err(e) =
                SwitchConnection::run(stream, peer.to_string(), balancer, settings).await
            {
                warn!(%peer, error = %e, "Switch connection closed with error");
            }
        })
    }

    async fn spawn_expiry_sweep(&self) -> Option<JoinHandle<()>> {
        let expiry = self.balancer.lock().await.config().session_expiry?;
        let period = (expiry / 2).max(MIN_SWEEP_INTERVAL);
        let balancer = Arc::clone(&self.balancer);

        debug!(?expiry, ?period, "Starting session expiry sweep");
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let expired = balancer.lock().await.expire_sessions(Instant::now());
                if expired > 0 {
                    debug!(expired, "Swept idle sessions");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::LoadBalancerConfig;

    #[tokio::test]
    async fn test_bind_and_shutdown() {
        let balancer = Arc::new(Mutex::new(
            LoadBalancer::with_config(LoadBalancerConfig::default()).unwrap(),
        ));
        let server = ControllerServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            balancer,
            SwitchSettings::default(),
        )
        .await
        .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(server.run(rx));
        tx.send(()).await.unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
