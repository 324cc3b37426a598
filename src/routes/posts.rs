use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::Utc;

use crate::db::models::PostWithComments;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::forms::{FieldErrors, PostActionForm, PostForm, PostIntent};
use crate::posts::{self, CommentRef, NewComment, NewPost, PostUpdate};
use crate::routes::home::{rejected_form, Html};
use crate::state::AppState;

// --- View structs ---

pub struct PostView {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: String,
}

pub struct CommentView {
    pub id: String,
    pub content: String,
    pub author: String,
    pub created_at: String,
    pub age: String,
    pub can_delete: bool,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/post.html")]
pub struct PostTemplate {
    pub post: PostView,
    pub comments: Vec<CommentView>,
    pub user_created_post: bool,
    pub draft: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/post_form.html")]
pub struct PostFormTemplate {
    pub heading: &'static str,
    pub action: String,
    pub title: String,
    pub content: String,
    pub errors: FieldErrors,
    pub username: Option<String>,
}

impl PostTemplate {
    fn build(loaded: PostWithComments, viewer: &MaybeUser) -> Self {
        let now = Utc::now();
        let viewer_id = viewer.id();

        let comments = loaded
            .comments
            .into_iter()
            .map(|c| CommentView {
                can_delete: posts::can_delete_comment(&c.comment, viewer_id, now),
                created_at: posts::format_timestamp(&c.comment.created_at),
                age: posts::format_relative_time(&c.comment.created_at, now),
                id: c.comment.id,
                content: c.comment.content,
                author: c.author_username,
            })
            .collect();

        Self {
            user_created_post: viewer_id == Some(loaded.post.author_id.as_str()),
            post: PostView {
                created_at: posts::format_timestamp(&loaded.post.created_at),
                id: loaded.post.id,
                title: loaded.post.title,
                content: loaded.post.content,
                author: loaded.author_username,
            },
            comments,
            draft: String::new(),
            errors: FieldErrors::new(),
            username: viewer.username(),
        }
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post/new", get(new_post_page).post(create_post))
        .route("/post/{id}", get(post_page).post(post_action))
        .route("/post/{id}/edit", get(edit_post_page).post(update_post))
}

// --- Handlers ---

async fn new_post_page(CurrentUser(user): CurrentUser) -> Html<PostFormTemplate> {
    Html(PostFormTemplate {
        heading: "New post",
        action: "/post/new".to_string(),
        title: String::new(),
        content: String::new(),
        errors: FieldErrors::new(),
        username: Some(user.username),
    })
}

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let input = NewPost {
        title: form.title.clone(),
        content: form.content.clone(),
        author_id: user.id,
    };

    match posts::create_post(&state.db, input).await {
        Ok(post) => Ok(Redirect::to(&format!("/post/{}", post.id)).into_response()),
        Err(AppError::Validation(errors)) => Ok(rejected_form(PostFormTemplate {
            heading: "New post",
            action: "/post/new".to_string(),
            title: form.title,
            content: form.content,
            errors,
            username: Some(user.username),
        })),
        Err(e) => Err(e),
    }
}

async fn post_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Html<PostTemplate>> {
    let loaded = posts::get_post_with_comments(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Html(PostTemplate::build(loaded, &viewer)))
}

/// The post page's form: add a comment, or delete one of your own.
async fn post_action(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<PostActionForm>,
) -> AppResult<Response> {
    let back = format!("/post/{}", id);

    match form.intent() {
        PostIntent::Comment => {
            let input = NewComment {
                content: form.content.clone(),
                author_id: user.id.clone(),
                post_id: id.clone(),
            };
            match posts::create_comment(&state.db, input, Utc::now()).await {
                Ok(_) => {}
                Err(AppError::Validation(errors)) => {
                    let loaded = posts::get_post_with_comments(&state.db, &id)
                        .await?
                        .ok_or(AppError::NotFound)?;
                    let mut page = PostTemplate::build(loaded, &MaybeUser(Some(user)));
                    page.draft = form.content;
                    page.errors = errors;
                    return Ok(rejected_form(page));
                }
                Err(e) => return Err(e),
            }
        }
        PostIntent::DeleteComment => {
            let comment_id = form.comment_id.ok_or(AppError::NotFound)?;
            let target = CommentRef {
                id: comment_id,
                author_id: user.id,
                post_id: id,
            };
            if let Err(e) = posts::delete_comment(&state.db, target, Utc::now()).await {
                tracing::info!("Comment delete rejected: {}", e);
                return Err(e);
            }
        }
    }

    Ok(Redirect::to(&back).into_response())
}

async fn edit_post_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Html<PostFormTemplate>> {
    let post = posts::get_post_for_author(&state.db, &id, &user.id).await?;

    Ok(Html(PostFormTemplate {
        heading: "Edit post",
        action: format!("/post/{}/edit", post.id),
        title: post.title,
        content: post.content,
        errors: FieldErrors::new(),
        username: Some(user.username),
    }))
}

async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let input = PostUpdate {
        id: id.clone(),
        author_id: user.id,
        title: form.title.clone(),
        content: form.content.clone(),
    };

    match posts::update_post(&state.db, input).await {
        Ok(post) => Ok(Redirect::to(&format!("/post/{}", post.id)).into_response()),
        Err(AppError::Validation(errors)) => Ok(rejected_form(PostFormTemplate {
            heading: "Edit post",
            action: format!("/post/{}/edit", id),
            title: form.title,
            content: form.content,
            errors,
            username: Some(user.username),
        })),
        Err(e) => Err(e),
    }
}
