use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Healthy when the database answers a simple query and the app answers a
/// HEAD request to itself through the host the caller used.
pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(axum::http::header::HOST))
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    match check(&state, host).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "ERROR").into_response()
        }
    }
}

async fn check(state: &AppState, host: Option<String>) -> anyhow::Result<()> {
    let host = host.ok_or_else(|| anyhow::anyhow!("request has no Host header"))?;
    let url = url::Url::parse(&format!("http://{}", host))?.join("/")?;

    let database = async {
        let conn = state.db.get()?;
        let _users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        anyhow::Ok(())
    };

    let self_request = async {
        let response = state.http.head(url).send().await?;
        anyhow::ensure!(
            response.status().is_success(),
            "HEAD / returned {}",
            response.status()
        );
        anyhow::Ok(())
    };

    tokio::try_join!(database, self_request)?;
    Ok(())
}
