mod config;
mod constants;
mod copilot;
mod error;
mod models;
mod routes;
mod transforms;

use axum::ServiceExt;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use clap::Parser;
use config::{Config, CorsMode};
use copilot::CopilotClient;
use error::ProxyError;
use models::{CapabilityRegistry, ModelCatalog};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transforms::{TiktokenCounter, TokenCounter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub copilot: CopilotClient,
    pub catalog: ModelCatalog,
    pub token_counter: Box<dyn TokenCounter>,
}

impl AppState {
    /// Reload the upstream model list into the catalog
    pub async fn refresh_models(&self) -> Result<usize, ProxyError> {
        let models = self.copilot.get_models().await?.data;
        let thinking: Vec<&str> = models
            .iter()
            .filter(|m| CapabilityRegistry::shared().is_thinking_mode_model(&m.id))
            .map(|m| m.id.as_str())
            .collect();
        debug!("Thinking-mode models: {:?}", thinking);

        let count = models.len();
        self.catalog.replace(models).await;
        Ok(count)
    }
}

#[derive(Parser)]
#[command(name = "copilot-proxy")]
#[command(about = "Anthropic-compatible proxy for the GitHub Copilot API")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "COPILOT_PROXY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "COPILOT_PROXY_PORT")]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);

    let copilot = CopilotClient::new(&config).expect("Failed to create HTTP client");
    if !copilot.has_token() {
        warn!(
            "No Copilot token configured (set COPILOT_TOKEN or write {})",
            config.data_dir.join("copilot_token").display()
        );
    }
    info!("Upstream: {}", config.base_url());

    let state = Arc::new(AppState {
        copilot,
        catalog: ModelCatalog::new(),
        token_counter: Box::new(TiktokenCounter),
    });

    // BPE tables are slow to build; keep that off the request path
    let _ = tokio::task::spawn_blocking(TiktokenCounter::preload);

    match state.refresh_models().await {
        Ok(count) => info!("Loaded {} models", count),
        Err(e) => warn!("Failed to load models: {}", e),
    }

    // CORS configuration based on environment
    let cors_origins = config.cors_mode.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &cors_origins {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-api-key"),
            header::HeaderName::from_static("anthropic-version"),
            header::HeaderName::from_static("anthropic-beta"),
        ])
        .allow_credentials(true);

    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }

    let api_routes = Router::new()
        .route("/chat/completions", post(routes::openai::chat_completions))
        .route("/models", get(routes::openai::list_models))
        .route("/responses", post(routes::responses::responses))
        .route("/messages", post(routes::anthropic::messages))
        .route(
            "/messages/count_tokens",
            post(routes::anthropic::count_tokens),
        );

    let app = NormalizePath::trim_trailing_slash(
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/version", get(routes::health::version))
            .nest("/v1", api_routes)
            .layer(cors)
            .with_state(state),
    );

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting copilot-proxy v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await
    .expect("Server error");
}
