use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::guard;
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// Path and query of the request, used as the post-login return target.
fn return_path(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string())
}

/// The signed-in user's full record.
/// No session redirects to login; a session for a deleted user is logged out.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let redirect_to = return_path(parts);
        guard::require_user(state, &parts.headers, &redirect_to)
            .await
            .map(CurrentUser)
    }
}

/// Optional user for pages that render for everyone.
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn username(&self) -> Option<String> {
        self.0.as_ref().map(|u| u.username.clone())
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.id.as_str())
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let redirect_to = return_path(parts);
        guard::get_user(state, &parts.headers, &redirect_to)
            .await
            .map(MaybeUser)
    }
}
