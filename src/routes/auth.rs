use askama::Template;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::guard;
use crate::error::{AppError, AppResult};
use crate::forms::{
    validated, FieldErrors, ForgotPasswordForm, JoinForm, LoginForm, ResetPasswordForm,
};
use crate::routes::home::{rejected_form, Html};
use crate::state::AppState;
use crate::users::{self, NewUser};

const INVALID_LOGIN: &str = "Invalid email or password";
const RESET_SENT: &str = "Check your email for password reset instructions!";
const RESET_INVALID: &str = "This reset link is invalid or has expired";

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub email: String,
    pub redirect_to: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/join.html")]
pub struct JoinTemplate {
    pub email: String,
    pub chosen_username: String,
    pub redirect_to: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/forgot_password.html")]
pub struct ForgotPasswordTemplate {
    pub email: String,
    pub message: Option<String>,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/reset_password.html")]
pub struct ResetPasswordTemplate {
    pub token: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

// --- Query strings ---

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/join", get(join_page).post(join))
        .route("/logout", get(logout_page).post(logout))
        .route(
            "/forgot-password",
            get(forgot_password_page).post(forgot_password),
        )
        .route("/reset-password", get(reset_password_page).post(reset_password))
}

// --- Handlers ---

async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RedirectQuery>,
) -> Response {
    if guard::get_user_id(&state, &headers).is_some() {
        return guard::redirect("/", None);
    }

    Html(LoginTemplate {
        email: String::new(),
        redirect_to: guard::safe_redirect(query.redirect_to.as_deref()),
        errors: FieldErrors::new(),
        username: None,
    })
    .into_response()
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let redirect_to = guard::safe_redirect(form.redirect_to.as_deref());
    let rejected = |email: String, errors: FieldErrors| {
        rejected_form(LoginTemplate {
            email,
            redirect_to: redirect_to.clone(),
            errors,
            username: None,
        })
    };

    let form = match validated(form) {
        Ok(form) => form,
        Err(errors) => return Ok(rejected(String::new(), errors)),
    };

    match users::verify_login(&state.db, &state.hasher, &form.email, &form.password).await? {
        Some(user) => {
            guard::create_user_session(&state, &headers, &user.id, form.remember(), &redirect_to)
        }
        None => {
            tracing::debug!("Failed login attempt");
            Ok(rejected(
                form.email,
                FieldErrors::single("email", INVALID_LOGIN),
            ))
        }
    }
}

async fn join_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RedirectQuery>,
) -> Response {
    if guard::get_user_id(&state, &headers).is_some() {
        return guard::redirect("/", None);
    }

    Html(JoinTemplate {
        email: String::new(),
        chosen_username: String::new(),
        redirect_to: guard::safe_redirect(query.redirect_to.as_deref()),
        errors: FieldErrors::new(),
        username: None,
    })
    .into_response()
}

async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<JoinForm>,
) -> AppResult<Response> {
    let redirect_to = guard::safe_redirect(form.redirect_to.as_deref());
    let rejected = |form: &JoinForm, errors: FieldErrors| {
        rejected_form(JoinTemplate {
            email: form.email.clone(),
            chosen_username: form.username.clone(),
            redirect_to: redirect_to.clone(),
            errors,
            username: None,
        })
    };

    let form = match validated(form.clone()) {
        Ok(form) => form,
        Err(errors) => return Ok(rejected(&form, errors)),
    };

    let new_user = NewUser {
        email: form.email.clone(),
        username: form.username.clone(),
        password: form.password.clone(),
    };

    match users::create_user(&state.db, &state.hasher, new_user).await {
        Ok(user) => {
            guard::create_user_session(&state, &headers, &user.id, form.remember(), &redirect_to)
        }
        Err(AppError::Conflict { field }) => {
            let message = AppError::Conflict {
                field: field.clone(),
            }
            .to_string();
            Ok(rejected(&form, FieldErrors::single(field, message)))
        }
        Err(AppError::Validation(errors)) => Ok(rejected(&form, errors)),
        Err(e) => Err(e),
    }
}

/// Visiting `/logout` directly just ends the session and goes home.
async fn logout_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    guard::logout(&state, &headers, "/")
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReturnQuery>,
) -> Response {
    let to = guard::safe_redirect(query.return_to.as_deref());
    guard::logout(&state, &headers, &to)
}

async fn forgot_password_page() -> Html<ForgotPasswordTemplate> {
    Html(ForgotPasswordTemplate {
        email: String::new(),
        message: None,
        errors: FieldErrors::new(),
        username: None,
    })
}

async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> AppResult<Response> {
    let form = match validated(form.clone()) {
        Ok(form) => form,
        Err(errors) => {
            return Ok(rejected_form(ForgotPasswordTemplate {
                email: form.email,
                message: None,
                errors,
                username: None,
            }))
        }
    };

    // Same answer whether or not the address is registered.
    if let Some(token) = users::create_reset_token(&state.db, &form.email, Utc::now()).await? {
        tracing::debug!(
            "Reset token for user {} expires {}: {}",
            token.user_id,
            token.expiry,
            token.token
        );
    }

    Ok(Html(ForgotPasswordTemplate {
        email: String::new(),
        message: Some(RESET_SENT.to_string()),
        errors: FieldErrors::new(),
        username: None,
    })
    .into_response())
}

async fn reset_password_page(Query(query): Query<TokenQuery>) -> Html<ResetPasswordTemplate> {
    Html(ResetPasswordTemplate {
        token: query.token.unwrap_or_default(),
        errors: FieldErrors::new(),
        username: None,
    })
}

async fn reset_password(
    State(state): State<AppState>,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Response> {
    let rejected = |token: String, errors: FieldErrors| {
        rejected_form(ResetPasswordTemplate {
            token,
            errors,
            username: None,
        })
    };

    let form = match validated(form.clone()) {
        Ok(form) => form,
        Err(errors) => return Ok(rejected(form.token, errors)),
    };

    match users::reset_password(
        &state.db,
        &state.hasher,
        &form.token,
        &form.password,
        Utc::now(),
    )
    .await?
    {
        Some(_) => Ok(guard::redirect("/login", None)),
        None => Ok(rejected(
            form.token,
            FieldErrors::single("token", RESET_INVALID),
        )),
    }
}
