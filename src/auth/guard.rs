//! Request-level authentication: who is asking, and what happens when
//! nobody is.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::session::USER_SESSION_KEY;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users;

pub fn get_user_id(state: &AppState, headers: &HeaderMap) -> Option<String> {
    state
        .sessions
        .get_session(headers)
        .user_id()
        .map(str::to_string)
}

/// The session's user id, or a redirect to the login page that will bring
/// the visitor back to `redirect_to` afterwards.
pub fn require_user_id(state: &AppState, headers: &HeaderMap, redirect_to: &str) -> AppResult<String> {
    get_user_id(state, headers).ok_or_else(|| AppError::Redirect {
        location: login_location(redirect_to),
        set_cookie: None,
    })
}

/// Resolve the full user behind the session. A session pointing at a user
/// that no longer exists is destroyed and the request ends in a redirect
/// to `redirect_to`.
pub async fn get_user(state: &AppState, headers: &HeaderMap, redirect_to: &str) -> AppResult<Option<User>> {
    let Some(user_id) = get_user_id(state, headers) else {
        return Ok(None);
    };

    match users::get_user_by_id(&state.db, &user_id).await? {
        Some(user) => Ok(Some(user)),
        None => {
            tracing::debug!("Session refers to missing user {}", user_id);
            Err(logout_redirect(state, headers, redirect_to))
        }
    }
}

pub async fn require_user(state: &AppState, headers: &HeaderMap, redirect_to: &str) -> AppResult<User> {
    let user_id = require_user_id(state, headers, redirect_to)?;

    match users::get_user_by_id(&state.db, &user_id).await? {
        Some(user) => Ok(user),
        None => Err(logout_redirect(state, headers, redirect_to)),
    }
}

/// Store `user_id` in the session and redirect. `remember` keeps the cookie
/// for the configured remember-me period instead of the browser session.
pub fn create_user_session(
    state: &AppState,
    headers: &HeaderMap,
    user_id: &str,
    remember: bool,
    redirect_to: &str,
) -> AppResult<Response> {
    let mut session = state.sessions.get_session(headers);
    session.set(USER_SESSION_KEY, user_id);

    let max_age = remember.then(|| state.config.remember_me_max_age());
    let set_cookie = state.sessions.commit_session(&session, max_age)?;

    Ok(redirect(redirect_to, Some(set_cookie)))
}

pub fn logout(state: &AppState, headers: &HeaderMap, redirect_to: &str) -> Response {
    let session = state.sessions.get_session(headers);
    redirect(redirect_to, Some(state.sessions.destroy_session(&session)))
}

fn logout_redirect(state: &AppState, headers: &HeaderMap, redirect_to: &str) -> AppError {
    let session = state.sessions.get_session(headers);
    AppError::Redirect {
        location: redirect_to.to_string(),
        set_cookie: Some(state.sessions.destroy_session(&session)),
    }
}

fn login_location(redirect_to: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirectTo", redirect_to)
        .finish();
    format!("/login?{}", query)
}

/// 302 with an optional `Set-Cookie`.
pub fn redirect(location: &str, set_cookie: Option<String>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response();

    if let Some(cookie) = set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Dropping unencodable Set-Cookie header: {}", e),
        }
    }

    response
}

/// Only same-site absolute paths are followed; anything else lands on `/`.
pub fn safe_redirect(to: Option<&str>) -> String {
    match to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SessionSecret};
    use crate::db;
    use crate::users::NewUser;

    fn test_state() -> AppState {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let mut config = Config::default();
        config.auth.session_secret = SessionSecret::new("guard-test-secret");
        config.auth.bcrypt_cost = 4;
        AppState::new(pool, config)
    }

    fn cookie_headers(set_cookie: &str) -> HeaderMap {
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    fn set_cookie_of(response: &Response) -> String {
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn signed_in(state: &AppState) -> (User, HeaderMap) {
        let user = users::create_user(
            &state.db,
            &state.hasher,
            NewUser {
                email: "guard@example.com".into(),
                username: "guard".into(),
                password: "password123".into(),
            },
        )
        .await
        .unwrap();
        let response = create_user_session(state, &HeaderMap::new(), &user.id, false, "/").unwrap();
        let headers = cookie_headers(&set_cookie_of(&response));
        (user, headers)
    }

    #[test]
    fn anonymous_request_has_no_user_id() {
        assert!(get_user_id(&test_state(), &HeaderMap::new()).is_none());
    }

    #[test]
    fn require_user_id_redirects_to_login_with_return_path() {
        let state = test_state();
        match require_user_id(&state, &HeaderMap::new(), "/post/new") {
            Err(AppError::Redirect {
                location,
                set_cookie,
            }) => {
                assert_eq!(location, "/login?redirectTo=%2Fpost%2Fnew");
                assert!(set_cookie.is_none());
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_round_trips_through_guard() {
        let state = test_state();
        let (user, headers) = signed_in(&state).await;

        assert_eq!(get_user_id(&state, &headers).as_deref(), Some(user.id.as_str()));
        let resolved = require_user(&state, &headers, "/profile").await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn remember_me_extends_cookie_lifetime() {
        let state = test_state();
        let response = create_user_session(&state, &HeaderMap::new(), "u1", true, "/").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(set_cookie_of(&response).contains("Max-Age=604800"));

        let response = create_user_session(&state, &HeaderMap::new(), "u1", false, "/").unwrap();
        assert!(!set_cookie_of(&response).contains("Max-Age"));
    }

    #[tokio::test]
    async fn stale_session_is_logged_out() {
        let state = test_state();
        let (user, headers) = signed_in(&state).await;
        users::delete_user_by_email(&state.db, &user.email)
            .await
            .unwrap();

        match get_user(&state, &headers, "/profile").await {
            Err(AppError::Redirect {
                location,
                set_cookie,
            }) => {
                assert_eq!(location, "/profile");
                assert!(set_cookie.unwrap().contains("Max-Age=0"));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_user_without_session_is_none() {
        let state = test_state();
        assert!(get_user(&state, &HeaderMap::new(), "/").await.unwrap().is_none());
    }

    #[test]
    fn logout_clears_cookie_and_redirects() {
        let state = test_state();
        let response = logout(&state, &HeaderMap::new(), "/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(set_cookie_of(&response).contains("Max-Age=0"));
    }

    #[test]
    fn safe_redirect_rejects_offsite_targets() {
        assert_eq!(safe_redirect(Some("/post/1")), "/post/1");
        assert_eq!(safe_redirect(Some("//evil.example")), "/");
        assert_eq!(safe_redirect(Some("https://evil.example")), "/");
        assert_eq!(safe_redirect(None), "/");
    }
}
