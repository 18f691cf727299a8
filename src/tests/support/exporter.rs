// Exporter server bootstrap for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::config::Config;
use crate::liveness;
use crate::persistence::Gateway;
use crate::shutdown::GracefulShutdown;

/// Exporter server wrapper for tests, listening on an ephemeral port.
pub struct ExporterServer {
    addr: SocketAddr,
    app: App,
    shutdown_token: CancellationToken,
    graceful_shutdown: GracefulShutdown,
}

impl ExporterServer {
    /// Starts the exporter on top of `gateway`, restoring counters from it.
    pub async fn start(
        cfg: Config,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let shutdown_token = CancellationToken::new();
        let probe = Arc::new(liveness::Probe::new(Duration::from_secs(1)));
        let app = App::with_gateway(shutdown_token.clone(), cfg, probe, gateway).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone());
        graceful_shutdown
            .set_graceful_timeout(Duration::from_secs(5))
            .await;
        graceful_shutdown.add(1);
        app.serve_on(listener, Arc::new(graceful_shutdown.clone()))?;

        Ok(Self {
            addr,
            app,
            shutdown_token,
            graceful_shutdown,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the exporter, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Stops the exporter and waits for the final flush.
    pub async fn stop(self) {
        self.shutdown_token.cancel();
        if let Err(e) = self.graceful_shutdown.cancel_and_await_with_timeout().await {
            eprintln!("[exporter] stop failed: {}", e);
        }
    }
}
