// Main exporter application implementation.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::controller;
use crate::counters::{CounterStore, MetricRegistry};
use crate::http::{Controller, HttpServer, Middleware};
use crate::liveness;
use crate::middleware;
use crate::persistence::{self, Gateway};
use crate::shutdown::GracefulShutdown;
use crate::sync::Synchronizer;

/// Liveness of a running exporter.
///
/// Holds the server weakly: the server's router owns the probe controller,
/// which owns the probe watching this.
struct AppLiveness {
    server: Weak<HttpServer>,
    sync: Arc<Synchronizer>,
}

impl AppLiveness {
    fn check(&self) -> bool {
        match self.server.upgrade() {
            Some(server) if server.is_alive() => {}
            _ => {
                warn!(
                    component = "app",
                    scope = "http_server",
                    event = "gone_away",
                    "http server has gone away"
                );
                return false;
            }
        }
        if !self.sync.is_running() {
            warn!(
                component = "app",
                scope = "sync",
                event = "gone_away",
                "sync loop has gone away"
            );
            return false;
        }
        true
    }
}

impl liveness::Service for AppLiveness {
    fn is_alive(&self, _timeout: Duration) -> bool {
        self.check()
    }
}

/// Encapsulates the entire exporter state.
#[derive(Clone)]
pub struct App {
    cfg: Config,
    shutdown_token: CancellationToken,
    store: Arc<CounterStore>,
    registry: Arc<MetricRegistry>,
    sync: Arc<Synchronizer>,
    probe: Arc<liveness::Probe>,
    server: Arc<HttpServer>,
    liveness: Arc<AppLiveness>,
    serving: Arc<AtomicBool>,
}

impl App {
    /// Creates the exporter with the gateway selected by configuration.
    pub async fn new(
        shutdown_token: CancellationToken,
        cfg: Config,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        let gateway = persistence::from_config(&cfg).context("failed to create persistence gateway")?;
        Self::with_gateway(shutdown_token, cfg, probe, gateway).await
    }

    /// Creates the exporter on top of `gateway`, restoring counters from it.
    pub async fn with_gateway(
        shutdown_token: CancellationToken,
        cfg: Config,
        probe: Arc<liveness::Probe>,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self> {
        let registry = Arc::new(MetricRegistry::with_process_metrics());
        let store = Arc::new(
            CounterStore::new(cfg.definitions().to_vec(), registry.clone(), gateway.clone())
                .context("invalid metric definitions")?,
        );
        let sync = Arc::new(Synchronizer::new(
            store.clone(),
            gateway,
            cfg.sync_interval(),
        ));

        let report = sync.load_all().await;
        let registered = store.register_all().await;
        info!(
            component = "app",
            event = "metrics_restored",
            loaded = report.loaded,
            missing = report.missing,
            failed = report.failed,
            registered = registered,
            "registered metrics"
        );

        let server = HttpServer::new(
            shutdown_token.clone(),
            cfg.clone(),
            Self::controllers(&cfg, store.clone(), registry.clone(), sync.clone(), probe.clone()),
            Self::middlewares(registry.clone()),
        )?;

        let liveness = Arc::new(AppLiveness {
            server: Arc::downgrade(&server),
            sync: sync.clone(),
        });

        Ok(Self {
            cfg,
            shutdown_token,
            store,
            registry,
            sync,
            probe,
            server,
            liveness,
            serving: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    /// Binds the configured port and serves in the background.
    pub async fn serve(&self, gsh: Arc<GracefulShutdown>) -> Result<()> {
        let listener = self.server.bind().await?;
        self.serve_on(listener, gsh)
    }

    /// Serves on `listener` in the background; the final flush runs once the server stopped.
    ///
    /// An app serves once; a second call fails without touching `gsh`.
    pub fn serve_on(&self, listener: TcpListener, gsh: Arc<GracefulShutdown>) -> Result<()> {
        if self.serving.swap(true, Ordering::AcqRel) {
            anyhow::bail!("application has already been served");
        }

        self.sync.spawn(self.shutdown_token.clone());

        // Register liveness target before serving.
        self.probe
            .watch(vec![self.liveness.clone() as Arc<dyn liveness::Service>]);

        let server = self.server.clone();
        let app_for_close = self.clone();
        tokio::task::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(
                    component = "app",
                    scope = "server",
                    event = "serve_failed",
                    error = %e,
                    "server failed to serve"
                );
            }

            if let Err(e) = app_for_close.close().await {
                error!(
                    component = "app",
                    scope = "shutdown",
                    event = "close_failed",
                    error = %e,
                    "application close failed"
                );
            }

            gsh.done();
        });

        info!(
            component = "app",
            event = "started",
            sync_interval = ?self.cfg.sync_interval(),
            "application lifecycle"
        );

        Ok(())
    }

    /// Checks whether the HTTP server and the sync loop are still alive.
    pub fn is_alive(&self) -> bool {
        self.liveness.check()
    }

    /// Persists the counters one last time and stops everything else.
    pub async fn close(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let report = self.sync.flush_all().await;
        if report.failed() > 0 {
            warn!(
                component = "app",
                scope = "sync",
                event = "final_flush_incomplete",
                saved = report.saved,
                total = report.total,
                "final flush did not save every metric"
            );
        }

        info!(
            component = "app",
            event = "stopped",
            "exiting"
        );

        Ok(())
    }

    /// Returns all HTTP controllers for the server.
    fn controllers(
        cfg: &Config,
        store: Arc<CounterStore>,
        registry: Arc<MetricRegistry>,
        sync: Arc<Synchronizer>,
        probe: Arc<liveness::Probe>,
    ) -> Vec<Box<dyn Controller>> {
        vec![
            // Healthcheck probe endpoint
            Box::new(controller::LivenessProbeController::new(probe)),
            // Prometheus scrape endpoint
            Box::new(controller::PrometheusMetricsController::new(registry)),
            // Parser counters: read, increment, reset
            Box::new(controller::ParserMetricsController::new(
                store,
                sync,
                cfg.persist_on_increment(),
            )),
        ]
    }

    /// Returns the request middlewares for the server, executed in reverse order.
    fn middlewares(registry: Arc<MetricRegistry>) -> Vec<Box<dyn Middleware>> {
        vec![
            // Exec first - access log
            Box::new(middleware::AccessLogMiddleware::new()),
            // Exec second - panic recovery
            Box::new(middleware::PanicRecoverMiddleware::new(registry)),
        ]
    }
}
