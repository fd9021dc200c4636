//! Web server module with JWT authentication

pub mod auth;
pub mod error;
pub mod http;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::notify::{self, Mailer};
use crate::store::SqliteStore;
use crate::tutor::{
    ChatBackend, ContentGenerator, DifficultyPredictor, LlmError, OpenRouterClient, ScriptPredictor,
    TutorService, UnconfiguredBackend,
};
use auth::AuthState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub store: SqliteStore,
    pub auth_state: Arc<AuthState>,
    pub tutor: Arc<TutorService>,
    pub content: ContentGenerator,
    pub mailer: Arc<dyn Mailer>,
}

impl ServerState {
    /// Wire the services together around the given collaborators
    pub fn new(
        config: Config,
        store: SqliteStore,
        chat: Arc<dyn ChatBackend>,
        predictor: Arc<dyn DifficultyPredictor>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let auth_state = AuthState::new(&config.auth, config.jwt_secret());
        let tutor = TutorService::new(chat.clone(), predictor, &config);
        let content = ContentGenerator::new(chat, config.openrouter.default_model.clone());

        Self {
            config: Arc::new(config),
            store,
            auth_state,
            tutor: Arc::new(tutor),
            content,
            mailer,
        }
    }

    /// Production collaborators: SQLite file, OpenRouter, the prediction
    /// script and the configured mailer
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.database.path)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;

        let chat = chat_backend(&config);
        let predictor: Arc<dyn DifficultyPredictor> = Arc::new(ScriptPredictor::new(&config.predictor));
        let mailer = notify::from_config(&config.mail);

        Ok(Self::new(config, store, chat, predictor, mailer))
    }
}

/// OpenRouter client, or a backend that reports the missing key on use
pub fn chat_backend(config: &Config) -> Arc<dyn ChatBackend> {
    match OpenRouterClient::from_config(config) {
        Ok(client) => Arc::new(client),
        Err(LlmError::MissingApiKey) => {
            tracing::warn!("OPENROUTER_API_KEY is not set; tutor and content generation are disabled");
            Arc::new(UnconfiguredBackend)
        }
        Err(e) => {
            tracing::error!("Failed to build LLM client: {}", e);
            Arc::new(UnconfiguredBackend)
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Protected routes (bearer header or ?token=)
    let protected = Router::new()
        .route("/questions/generate-content-ai", post(http::generate_content_handler))
        .route(
            "/dashboard/progress",
            get(http::progress_handler).post(http::save_progress_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.auth_state.clone(),
            auth::auth_middleware,
        ));

    let public = Router::new()
        .route("/register", post(http::register_handler))
        .route("/login", post(http::login_handler))
        .route("/auth/refresh", post(http::refresh_handler))
        .route("/auth/logout", post(http::logout_handler))
        .route("/forgot-password", post(http::forgot_password_handler))
        .route("/reset-password/{token}", post(http::reset_password_handler))
        .route("/questions", get(http::questions_handler))
        .route("/verify-answer", post(http::verify_answer_handler))
        .route("/chat/tutor", post(http::tutor_handler))
        .route("/api/status", get(http::status_handler));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(
    config: Config,
    host: &str,
    port: u16,
    https: bool,
    cert: Option<String>,
    key: Option<String>,
) -> Result<()> {
    let state = ServerState::from_config(config).await?;
    let stats = state.store.stats().await?;

    // Periodically drop expired revocations and lockouts
    let auth_state = state.auth_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            auth_state.cleanup();
        }
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;
    let app = router(state);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     SmartSkill Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Server binding to: {}", addr);
    println!(
        "✓ Questions: {} ({} awaiting content)",
        stats.questions, stats.questions_missing_content
    );
    println!("✓ Users: {}, quizzes taken: {}", stats.users, stats.quizzes_taken);
    if https {
        println!("✓ HTTPS enabled");
    } else {
        println!("⚠ HTTPS disabled");
    }
    println!();
    println!("🚀 Listening on http{}://{}", if https { "s" } else { "" }, addr);
    println!();

    if https {
        let (Some(cert_path), Some(key_path)) = (cert, key) else {
            anyhow::bail!("--https requires --cert and --key");
        };
        let cert_data = tokio::fs::read(&cert_path)
            .await
            .context("Failed to read certificate file")?;
        let key_data = tokio::fs::read(&key_path)
            .await
            .context("Failed to read key file")?;

        let tls = axum_server::tls_rustls::RustlsConfig::from_pem(cert_data, key_data).await?;
        info!("Serving HTTPS on {}", addr);
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    info!("Serving HTTP on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
