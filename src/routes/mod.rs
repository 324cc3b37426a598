pub mod auth;
pub mod health;
pub mod home;
pub mod posts;
pub mod profile;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        .route("/health", get(health::health))
        .merge(auth::router())
        .merge(posts::router())
        .merge(profile::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
