use askama::Template;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::{Form, Router};

use crate::account;
use crate::auth::guard;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::forms::{DeleteAccountForm, FieldErrors};
use crate::routes::home::{rejected_form, Html};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub email: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(profile_page).post(delete_account))
}

async fn profile_page(CurrentUser(user): CurrentUser) -> Html<ProfileTemplate> {
    Html(ProfileTemplate {
        email: user.email,
        errors: FieldErrors::new(),
        username: Some(user.username),
    })
}

async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentUser(user): CurrentUser,
    Form(form): Form<DeleteAccountForm>,
) -> AppResult<Response> {
    match account::delete_account(&state.db, &state.hasher, &user.id, &form.email).await {
        Ok(_) => Ok(guard::logout(&state, &headers, "/")),
        Err(AppError::Validation(errors)) => Ok(rejected_form(ProfileTemplate {
            email: user.email,
            errors,
            username: Some(user.username),
        })),
        Err(e @ AppError::AnonymousUnavailable) => Ok(rejected_form(ProfileTemplate {
            email: user.email,
            errors: FieldErrors::single("email", e.to_string()),
            username: Some(user.username),
        })),
        Err(e) => Err(e),
    }
}
