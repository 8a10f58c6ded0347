//! Proxy server lifecycle.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{Router, serve::ListenerExt};
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::forward::{ProxyState, handle};

/// Line printed to stdout once the listener is bound.
pub const READY_PREFIX: &str = "PROXY_READY:";

/// Build the proxy router: every method and path goes to the forwarder.
pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

/// Cloneable stop hook bound to one proxy instance.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ShutdownHandle {
    /// Install a fresh shutdown channel for a newly started server.
    fn arm(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Stop accepting connections. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                // The server may already have exited on its own.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// Loopback HTTP proxy that rewrites model ids in upstream responses.
pub struct AgyProxy {
    config: ProxyConfig,
    port: Option<u16>,
    shutdown: ShutdownHandle,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl AgyProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            port: None,
            shutdown: ShutdownHandle::default(),
            task: None,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bound port, once started.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Bind `127.0.0.1:0`, announce readiness, and serve in the background.
    ///
    /// Calling `start` on a running proxy returns the existing port.
    pub async fn start(&mut self) -> ProxyResult<u16> {
        let running = self.task.as_ref().is_some_and(|task| !task.is_finished());
        if let Some(port) = self.port.filter(|_| running) {
            return Ok(port);
        }

        let state = ProxyState::new(self.config.clone())?;
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(addr).await.map_err(ProxyError::Bind)?;
        let port = listener.local_addr().map_err(ProxyError::Bind)?.port();

        // Streamed events must not sit in Nagle buffers.
        let listener = listener.tap_io(|tcp| {
            if let Err(err) = tcp.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY on client socket: {}", err);
            }
        });

        let shutdown = self.shutdown.arm();
        let app = router(state);
        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.await;
                    debug!("Proxy listener closing");
                })
                .await
        }));
        self.port = Some(port);

        info!(
            "Proxy listening on 127.0.0.1:{} -> {}",
            port, self.config.upstream_url
        );
        announce_ready(port);
        Ok(port)
    }

    /// Stop accepting new connections. In-flight requests run to completion.
    ///
    /// Safe before `start`, after `stop`, and when called repeatedly.
    pub fn stop(&self) {
        if self.shutdown.stop() {
            info!("Proxy stopped");
        }
    }

    /// Wait for the serve loop to exit. Returns immediately when not started.
    pub async fn wait(&mut self) -> ProxyResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ProxyError::Serve(err.to_string())),
            Err(err) => Err(ProxyError::Serve(err.to_string())),
        }
    }
}

impl Drop for AgyProxy {
    fn drop(&mut self) {
        self.shutdown.stop();
    }
}

fn announce_ready(port: u16) {
    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{READY_PREFIX}{port}").and_then(|()| stdout.flush()) {
        warn!("Failed to write readiness line: {}", err);
    }
}
