use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::posts;
use crate::state::AppState;

pub struct PostRow {
    pub id: String,
    pub title: String,
    pub author: String,
    pub created_at: String,
    pub comment_count: i64,
}

#[derive(Template)]
#[template(path = "pages/index.html")]
pub struct IndexTemplate {
    pub posts: Vec<PostRow>,
    pub username: Option<String>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Re-render a form page with its field errors.
pub fn rejected_form<T: Template>(page: T) -> Response {
    (StatusCode::BAD_REQUEST, Html(page)).into_response()
}

pub async fn index(State(state): State<AppState>, user: MaybeUser) -> AppResult<Html<IndexTemplate>> {
    let posts = posts::list_posts(&state.db)
        .await?
        .into_iter()
        .map(|summary| PostRow {
            created_at: posts::format_timestamp(&summary.post.created_at),
            id: summary.post.id,
            title: summary.post.title,
            author: summary.author_username,
            comment_count: summary.comment_count,
        })
        .collect();

    Ok(Html(IndexTemplate {
        posts,
        username: user.username(),
    }))
}
