use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use coding_agent::{AgentConfig, AgentFactory, Copilot, SessionArbiter};
use ide_copilot::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Time given to in-flight agent runs once the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // The project bridge uses a blocking HTTP client, so services are built
    // before the async runtime exists.
    let config = AgentConfig::from_env()?;
    let factory = AgentFactory::from_config(&config)?;
    let copilot = Arc::new(Copilot::new(
        Arc::new(SessionArbiter::new()),
        factory,
        config.entry_role,
    ));
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.http_port));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let served = runtime.block_on(serve(copilot, addr));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    served
}

async fn serve(copilot: Arc<Copilot>, addr: SocketAddr) -> anyhow::Result<()> {
    let mut server = Server::bind(copilot, addr).await?;

    tokio::select! {
        fault = server.next_fault() => {
            if let Some(fault) = fault {
                error!(%fault, "concurrency fault, shutting down");
                return Err(fault.into());
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupted, shutting down");
        }
    }

    server.shutdown().map_err(anyhow::Error::msg)?;
    Ok(())
}
