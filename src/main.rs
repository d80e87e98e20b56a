mod api;
mod config;
mod core;
mod queue;
mod rpc;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::api::ApiState;
use crate::config::Config;
use crate::core::state::PipelineState;
use crate::queue::RedisQueue;
use crate::rpc::EthRpc;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("txsentry=info".parse().unwrap()),
        )
        .init();

    tracing::info!("txsentry starting...");

    // Load configuration
    let mut config = Config::load("config.toml");
    config.apply_env_overrides();
    tracing::info!("Config: {:?}", config);

    // Shared pipeline state: bounded alert/log caches plus counters,
    // owned here and passed by reference everywhere else.
    let state = Arc::new(PipelineState::new());

    // Connect the durable queue store
    let queue = RedisQueue::connect(&config.queue)
        .await
        .expect("Failed to connect to queue store");
    tracing::info!("Queue store connected, list key '{}'", config.queue.key);

    // Create the chain RPC client
    let rpc = EthRpc::from_config(&config.chain);
    tracing::info!("Chain RPC client configured for {}", config.chain.rpc_url);

    // Producer and consumer run detached for the life of the process,
    // decoupled by the queue; neither is ever joined.
    let poll_interval = Duration::from_millis(config.chain.poll_interval_ms);
    let idle_wait = Duration::from_millis(config.queue.idle_wait_ms);
    tokio::spawn(core::pipeline::run_listener(
        rpc,
        queue.clone(),
        state.clone(),
        poll_interval,
    ));
    tokio::spawn(core::pipeline::run_scoring_loop(
        queue.clone(),
        state.clone(),
        idle_wait,
    ));
    tracing::info!("Pipeline tasks started");

    // Serve the query API (blocks)
    let addr = config
        .listen_addr()
        .parse()
        .expect("Invalid listen address");
    api::serve(
        addr,
        ApiState {
            pipeline: state,
            queue: Arc::new(queue),
        },
    )
    .await;
}
