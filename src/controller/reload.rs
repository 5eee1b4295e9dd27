//! Configuration reload on SIGHUP.
//!
//! The `[load_balancer]` section is re-read and handed to the running
//! [`LoadBalancer`] through [`ModuleContract::reload`]. A file that fails to
//! parse or validate leaves the running configuration untouched. Listener
//! settings and the expiry sweep period are only read at startup.

use super::error::ControllerResult;
use crate::config::ConfigLoader;
use crate::module::{ModuleConfig, ModuleContract};
use crate::modules::load_balancer::LoadBalancer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Reloads the balancer from its configuration file.
#[derive(Debug)]
pub struct ConfigReloader {
    path: PathBuf,
    loader: ConfigLoader,
    balancer: Arc<Mutex<LoadBalancer>>,
}

impl ConfigReloader {
    /// Create a reloader for `path`.
    #[must_use]
    pub fn new(
        path: impl AsRef<Path>,
        loader: ConfigLoader,
        balancer: Arc<Mutex<LoadBalancer>>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            loader,
            balancer,
        }
    }

    /// Re-read the file and apply its `[load_balancer]` section.
    ///
    /// Sessions and rotation cursors start over with the new backend set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or validated, or the
    /// balancer rejects the section.
    pub async fn reload(&self) -> ControllerResult<()> {
        let config = self.loader.load(&self.path)?;
        let section = ModuleConfig::from_section(&config.load_balancer)?;

        let mut balancer = self.balancer.lock().await;
        balancer.reload(section)?;
        info!(
            path = %self.path.display(),
            backends = balancer.registry().len(),
            status = %balancer.status(),
            "Configuration reloaded"
        );
        Ok(())
    }

    /// Reload on every SIGHUP until the task is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler cannot be installed.
    #[cfg(unix)]
    pub fn spawn_on_hangup(self) -> std::io::Result<tokio::task::JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        Ok(tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                if let Err(e) = self.reload().await {
                    warn!(path = %self.path.display(), error = %e, "Reload failed, keeping current configuration");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadBalancerValidator;
    use crate::module::ModuleStatus;
    use crate::modules::load_balancer::LoadBalancerConfig;
    use tempfile::tempdir;

    const ONE_BACKEND: &str = r#"
[load_balancer]
[[load_balancer.backends]]
address = "10.0.0.1"
mac = "00:00:00:00:00:01"
port = 1
services = [8080]
"#;

    fn running_balancer() -> Arc<Mutex<LoadBalancer>> {
        let mut lb = LoadBalancer::new();
        lb.init(ModuleConfig::from_section(&LoadBalancerConfig::default()).unwrap())
            .unwrap();
        lb.start().unwrap();
        Arc::new(Mutex::new(lb))
    }

    #[tokio::test]
    async fn test_reload_applies_new_backends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pied-piper.toml");
        std::fs::write(&path, ONE_BACKEND).unwrap();

        let balancer = running_balancer();
        assert!(matches!(
            balancer.lock().await.status(),
            ModuleStatus::Degraded { .. }
        ));

        let reloader = ConfigReloader::new(&path, ConfigLoader::new(), Arc::clone(&balancer));
        reloader.reload().await.unwrap();

        let lb = balancer.lock().await;
        assert_eq!(lb.registry().len(), 1);
        assert_eq!(lb.status(), ModuleStatus::Running);
    }

    #[tokio::test]
    async fn test_rejected_file_keeps_running_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pied-piper.toml");
        std::fs::write(&path, ONE_BACKEND).unwrap();

        let balancer = running_balancer();
        let loader = ConfigLoader::new().with_validator(LoadBalancerValidator);
        let reloader = ConfigReloader::new(&path, loader, Arc::clone(&balancer));
        reloader.reload().await.unwrap();

        // The VIP may not also be a backend.
        std::fs::write(&path, ONE_BACKEND.replace("10.0.0.1", "10.0.0.100")).unwrap();
        assert!(reloader.reload().await.is_err());

        // Without validators the balancer itself refuses the section.
        let unchecked = ConfigReloader::new(&path, ConfigLoader::new(), Arc::clone(&balancer));
        assert!(matches!(
            unchecked.reload().await,
            Err(crate::controller::ControllerError::Module(_))
        ));

        let lb = balancer.lock().await;
        assert_eq!(lb.registry().len(), 1);
        assert_eq!(lb.status(), ModuleStatus::Running);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let reloader = ConfigReloader::new(
            dir.path().join("absent.toml"),
            ConfigLoader::new(),
            running_balancer(),
        );
        assert!(reloader.reload().await.is_err());
    }
}
