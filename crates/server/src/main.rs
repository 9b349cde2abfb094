//! HTTP entry point: loads configuration, wires the model host client, tool
//! registry, and tokenizer registry into a [`memos_runtime::SharedResources`],
//! and serves the `axum` router.

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use memos_core::{EmbeddingModel, LanguageModel};
use memos_llm::HostClient;
use memos_runtime::{ConversationRuntime, SharedResources};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process");

    let config_path = std::env::var("MEMOS_CONFIG").ok().map(std::path::PathBuf::from);
    let settings = memos_config::Settings::load(config_path.as_deref())?;
    settings.validate()?;

    let host_client = Arc::new(HostClient::new(
        settings.host.url.clone(),
        Duration::from_secs(settings.host.request_timeout_secs),
    ));
    host_client.warm_up(&settings.host.model_name).await?;

    let registry = Arc::new(memos_functions::default_registry()?);
    let llm: Arc<dyn LanguageModel> = host_client.clone();
    let embedder: Arc<dyn EmbeddingModel> = host_client.clone();

    let shared = SharedResources::new(settings, registry, llm, embedder)?;
    let runtime = Arc::new(ConversationRuntime::new(shared));

    let addr: SocketAddr = std::env::var("MEMOS_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:4999".to_string())
        .parse()?;

    let state = AppState { runtime };
    let app = build_router(state, metrics_handle);

    tracing::info!(%addr, "memos-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState, metrics_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    Router::new()
        .route("/conversation-ids", get(handlers::conversation_ids))
        .route("/personas/agents", get(handlers::agent_personas))
        .route("/personas/humans", get(handlers::human_personas))
        .route("/agent", post(handlers::create_agent).delete(handlers::delete_agent))
        .route("/agent/humans", get(handlers::agent_humans).post(handlers::create_human))
        .route("/messages/send", post(handlers::send_message))
        .route("/messages/send/first-message", post(handlers::send_first_message))
        .route("/messages/send/no-heartbeat", post(handlers::send_no_heartbeat))
        .route(
            "/metrics",
            get(move || {
                let metrics_handle = metrics_handle.clone();
                async move { metrics_handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memos_server=info,memos_agent=info,memos_runtime=info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
