//! PeerDesk API Gateway
//!
//! HTTP front end of the review portal: accounts, submissions, the review
//! workflow, and manuscript downloads.

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use peerdesk_common::{
    auth::JwtManager,
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, MemoryRepository, PaperStore, Repository, UserStore},
    identity::AccountService,
    metrics::{register_metrics, LATENCY_BUCKETS},
    notify::{create_mailer, Notifier},
    storage::create_blob_store,
    ReviewWorkflow,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{rate_limit_middleware, RateLimit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub workflow: ReviewWorkflow,
    pub accounts: AccountService,
    pub jwt: Arc<JwtManager>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl AppState {
    /// Wire services over the given stores
    pub fn new(
        config: AppConfig,
        papers: Arc<dyn PaperStore>,
        users: Arc<dyn UserStore>,
    ) -> anyhow::Result<Self> {
        let secret = config
            .auth
            .jwt_secret
            .clone()
            .context("auth.jwt_secret must be set (APP__AUTH__JWT_SECRET)")?;
        let jwt = Arc::new(JwtManager::new(&secret, config.auth.jwt_expiration_secs));

        let notifier = Notifier::new(create_mailer(&config.mail)?, config.mail.portal_url.clone());
        let blobs = create_blob_store(&config.storage)?;

        let workflow = ReviewWorkflow::new(
            papers,
            users.clone(),
            blobs,
            notifier.clone(),
            config.auth.generated_password_len,
        );
        let accounts = AccountService::new(users, jwt.clone(), notifier);

        Ok(Self {
            config: Arc::new(config),
            workflow,
            accounts,
            jwt,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting PeerDesk API Gateway v{}",
        peerdesk_common::VERSION
    );

    // Initialize metrics
    init_metrics(&config.observability)?;

    // Initialize stores
    let (papers, users) = connect_stores(&config).await?;

    // Create app state
    let admin = config.admin.clone();
    let state = AppState::new(config, papers, users)?;
    if state.accounts.seed_admin(&admin).await? {
        info!("Seeded initial admin account");
    }

    // Build the router
    let app = create_router(state.clone());

    // Start the server
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    register_metrics();
    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Postgres when a URL is configured, the in-process store for "memory"
async fn connect_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn PaperStore>, Arc<dyn UserStore>)> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on restart");
        let repo = Arc::new(MemoryRepository::new());
        let papers: Arc<dyn PaperStore> = repo.clone();
        let users: Arc<dyn UserStore> = repo;
        return Ok((papers, users));
    }

    let pool = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        pool.migrate().await?;
    }

    let repo = Arc::new(Repository::new(pool));
    let papers: Arc<dyn PaperStore> = repo.clone();
    let users: Arc<dyn UserStore> = repo;
    Ok((papers, users))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = match config
        .server
        .client_url
        .as_deref()
        .and_then(|url| url.parse::<axum::http::HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    let paper_routes = Router::new()
        .route("/submit", post(handlers::papers::submit))
        .route("/published", get(handlers::papers::published))
        .route("/my-papers", get(handlers::papers::my_papers))
        .route("/all", get(handlers::papers::all))
        .route("/assigned", get(handlers::papers::assigned))
        .route("/assign", post(handlers::papers::assign))
        .route("/remove-reviewer", post(handlers::papers::remove_reviewer))
        .route("/review", post(handlers::papers::review))
        .route("/decision", post(handlers::papers::decision))
        .route("/{id}/file", get(handlers::papers::file));

    let user_routes = Router::new()
        .route("/pending-reviewers", get(handlers::users::pending_reviewers))
        .route("/reviewers", get(handlers::users::reviewers))
        .route("/reviewer-status", post(handlers::users::reviewer_status));

    let mut api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/papers", paper_routes)
        .nest("/users", user_routes);

    if config.rate_limit.enabled {
        let rate_limit = RateLimit::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));
    }

    let mut app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes);

    // Local manuscripts are served by the gateway itself
    if config.storage.provider == "local" {
        app = app.nest_service("/uploads", ServeDir::new(&config.storage.local_dir));
    }

    app.layer(axum::middleware::from_fn(
        middleware::metrics::track_metrics,
    ))
    .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
    .layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(cors),
    )
    .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
