use crate::admission::mutate_handler;
use crate::config::Tls;
use crate::state::AppState;
use anyhow::Context;
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use tracing::info;

pub async fn readiness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn liveness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .with_state(state)
}

/// Serves the webhook over TLS. The API server only calls admission webhooks
/// over HTTPS.
pub async fn serve(addr: SocketAddr, tls: &Tls, app: Router) -> anyhow::Result<()> {
    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS certificate {} and key {}",
                tls.cert_file.display(),
                tls.key_file.display()
            )
        })?;

    info!("Starting webhook server on {}", addr);
    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await
        .context("Webhook server terminated")?;

    Ok(())
}
