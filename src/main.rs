use std::sync::Arc;

use serde_json::json;
use tracing::{error, info};

use wspoll::config::Config;
use wspoll::listener::ListenerConfig;
use wspoll::router::Router;
use wspoll::{logging, Server, WorkerPool};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    info!("Starting wspoll {}", wspoll::VERSION);
    config.log_summary();

    // Readiness and blocking work live on the pool; tokio only waits for signals.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pool = WorkerPool::with_name(config.pool, "wspoll-worker")?;
    let server = Server::new(pool)?;

    let listener = ListenerConfig::tcp(config.server.listen_addr)
        .with_backlog(config.server.listen_backlog);
    let addr = server.bind(&listener, config.listen_config(), Arc::new(router()))?;
    info!("Accepting WebSocket connections on ws://{}", addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down...");
    server.shutdown();
    Ok(())
}

fn router() -> Router {
    let mut router = Router::new();
    router
        .register("echo", |req| req.write_success(req.params().clone()))
        .register("ping", |req| {
            req.write_success(json!({ "pong": true, "socket": req.socket().id().to_string() }))
        });
    router
}
