use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use coding_agent::runtime::ConcurrencyFault;
use coding_agent::Copilot;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub mod api;
pub mod events;

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    faults: mpsc::UnboundedReceiver<ConcurrencyFault>,
}

impl Server {
    /// Binds `addr` and serves the copilot endpoints on a spawned task.
    pub async fn bind(copilot: Arc<Copilot>, addr: SocketAddr) -> std::io::Result<Self> {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let app = router(Arc::new(ServerState {
            copilot,
            faults: fault_tx,
        }));

        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = served {
                warn!(%error, "http server stopped");
            }
        });
        info!(%addr, "copilot server listening");

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            faults: fault_rx,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits for the next stream that could not reacquire the worker slot.
    pub async fn next_fault(&mut self) -> Option<ConcurrencyFault> {
        self.faults.recv().await
    }

    pub fn shutdown(&mut self) -> Result<(), String> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| "failed to send server shutdown signal".to_string())
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

pub(crate) struct ServerState {
    pub(crate) copilot: Arc<Copilot>,
    pub(crate) faults: mpsc::UnboundedSender<ConcurrencyFault>,
}

fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/send_message", post(api::send_message))
        .route("/control", post(api::control))
        .route("/events", get(events::stream_events))
        .with_state(state)
        .layer(cors)
}
