use axum::http::{header, HeaderValue, Method};
use ractor::Actor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use windsite::actors::ledger::{LedgerActor, LedgerArguments};
use windsite::api;
use windsite::app_state::AppState;

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    // Search the current directory and ancestors so running from `windsite/`
    // still picks up a repo-root `.env`.
    load_env_file();

    tracing::info!("Starting Windsite API Server");

    let data_dir = std::env::var("WINDSITE_DATA_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("data/sessions"));
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");
    tracing::info!(data_dir = %data_dir.display(), "Session ledger directory ready");

    let (ledger, _handle) = Actor::spawn(
        None,
        LedgerActor,
        LedgerArguments {
            data_dir: data_dir.clone(),
        },
    )
    .await
    .expect("Failed to spawn LedgerActor");
    tracing::info!("LedgerActor started");

    let app_state = Arc::new(AppState::new(ledger));
    let _ = app_state
        .ensure_orchestrator()
        .await
        .expect("Failed to spawn OrchestratorActor");
    tracing::info!("OrchestratorActor started");

    let allowed_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]
        .iter()
        .map(|origin| HeaderValue::from_str(origin).expect("Invalid CORS origin"))
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    let api_state = api::ApiState { app_state };
    let app = api::router().with_state(api_state).layer(cors);

    let port = std::env::var("WINDSITE_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    tracing::info!("Starting HTTP server on http://0.0.0.0:{port}");

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await
}
