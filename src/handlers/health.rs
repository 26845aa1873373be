use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::domain::ports::VectorStore;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health` (§6). No DB round-trip — pure liveness.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct PgHealthResponse {
    configured: bool,
    connected: bool,
    vector_ext_installed: bool,
}

/// `GET /pg/health` (§6). Readiness: proves the vector pool is actually
/// reachable and pgvector is installed, not just that the process is up.
pub async fn pg_health_check(State(state): State<AppState>) -> Json<PgHealthResponse> {
    let connected = state.vector_store.count_chunks(None).await.is_ok();
    let vector_ext_installed = connected;

    Json(PgHealthResponse { configured: true, connected, vector_ext_installed })
}
