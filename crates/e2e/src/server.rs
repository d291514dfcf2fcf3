//! Server management - running and health checking the storefront server

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use bikegear_web::SiteServer;

use crate::error::{E2eError, E2eResult};

/// Handle to a storefront server running on the current runtime
pub struct ServerHandle {
    addr: SocketAddr,
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl ServerHandle {
    /// Bind, start serving and wait until `/health` answers
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port.unwrap_or(0)))
            .await
            .map_err(|e| {
                E2eError::ServerStartup(format!("bind {}:{:?}: {}", config.host, config.port, e))
            })?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        info!("Starting storefront on {}", addr);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(SiteServer::new().serve_with_shutdown(listener, async {
            let _ = rx.await;
        }));

        let mut handle = ServerHandle {
            addr,
            base_url,
            shutdown: Some(tx),
            task: Some(task),
        };

        if let Err(e) = handle.wait_for_healthy(config.startup_timeout).await {
            handle.stop();
            return Err(e);
        }

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}/health", self.base_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if self.task.as_ref().map(JoinHandle::is_finished).unwrap_or(true) {
                return Err(E2eError::ServerStartup("server task exited".to_string()));
            }

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) if !e.is_connect() => warn!("Health check error: {}", e),
                Err(_) => {}
            }

            sleep(Duration::from_millis(50)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown without waiting for it
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            info!("Stopping server at {}", self.addr);
            let _ = tx.send(());
        }
    }

    /// Shut down and wait for in-flight requests to drain
    pub async fn shutdown(mut self) -> E2eResult<()> {
        self.stop();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| E2eError::ServerStartup(format!("server task panicked: {}", e)))?
                .map_err(|e| E2eError::ServerStartup(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Configuration for starting a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,

    /// Port to listen on (None = ephemeral)
    pub port: Option<u16>,

    /// Timeout for server startup
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            startup_timeout: Duration::from_secs(10),
        }
    }
}
