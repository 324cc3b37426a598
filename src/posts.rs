//! Posts and comments, with the authorship rules that guard every mutation.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use validator::Validate;

use crate::db::models::{Comment, CommentWithAuthor, Post, PostSummary, PostWithComments};
use crate::error::{AppError, AppResult};
use crate::forms::validated;
use crate::state::DbPool;

/// Comments may only be removed by their author within this window.
pub const COMMENT_DELETE_WINDOW_MINUTES: i64 = 20;

#[derive(Debug, Clone, Validate)]
pub struct NewPost {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub content: String,
    pub author_id: String,
}

#[derive(Debug, Clone, Validate)]
pub struct PostUpdate {
    pub id: String,
    pub author_id: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub content: String,
}

#[derive(Debug, Clone, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, message = "Comment is required"))]
    pub content: String,
    pub author_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone)]
pub struct CommentRef {
    pub id: String,
    pub author_id: String,
    pub post_id: String,
}

pub async fn create_post(db: &DbPool, input: NewPost) -> AppResult<Post> {
    let input = validated(input)?;
    let now = Utc::now();
    let post = Post {
        id: uuid::Uuid::now_v7().to_string(),
        title: input.title,
        content: input.content,
        author_id: input.author_id,
        created_at: now,
        updated_at: now,
    };

    let conn = db.get()?;
    conn.execute(
        "INSERT INTO posts (id, title, content, author_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            post.id,
            post.title,
            post.content,
            post.author_id,
            post.created_at,
            post.updated_at
        ],
    )?;

    Ok(post)
}

/// Only the author's own row is touched. A non-author (or unknown id)
/// updates nothing and gets `NotFound`.
pub async fn update_post(db: &DbPool, input: PostUpdate) -> AppResult<Post> {
    let input = validated(input)?;

    let conn = db.get()?;
    let rows = conn.execute(
        "UPDATE posts SET title = ?1, content = ?2, updated_at = ?3
         WHERE id = ?4 AND author_id = ?5",
        params![input.title, input.content, Utc::now(), input.id, input.author_id],
    )?;

    if rows == 0 {
        tracing::debug!(
            "Post {} not updated: missing or not authored by {}",
            input.id,
            input.author_id
        );
        return Err(AppError::NotFound);
    }

    find_post(&conn, &input.id)?.ok_or(AppError::NotFound)
}

pub async fn get_post(db: &DbPool, id: &str) -> AppResult<Option<Post>> {
    let conn = db.get()?;
    find_post(&conn, id)
}

/// The post, provided `author_id` wrote it.
pub async fn get_post_for_author(db: &DbPool, id: &str, author_id: &str) -> AppResult<Post> {
    match get_post(db, id).await? {
        Some(post) if post.author_id == author_id => Ok(post),
        _ => Err(AppError::NotFound),
    }
}

/// Every post, newest first, with author name and comment count.
pub async fn list_posts(db: &DbPool) -> AppResult<Vec<PostSummary>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(
        "SELECT p.id AS id, p.title AS title, p.content AS content,
                p.author_id AS author_id, p.created_at AS created_at,
                p.updated_at AS updated_at, u.username AS author_username,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
         FROM posts p
         JOIN users u ON u.id = p.author_id
         ORDER BY p.created_at DESC, p.id DESC",
    )?;

    let posts = stmt
        .query_map([], |row| {
            Ok(PostSummary {
                post: Post::from_row(row)?,
                author_username: row.get("author_username")?,
                comment_count: row.get("comment_count")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

/// A post with all of its comments, oldest comment first.
pub async fn get_post_with_comments(db: &DbPool, id: &str) -> AppResult<Option<PostWithComments>> {
    let conn = db.get()?;

    let post = conn
        .query_row(
            "SELECT p.id AS id, p.title AS title, p.content AS content,
                    p.author_id AS author_id, p.created_at AS created_at,
                    p.updated_at AS updated_at, u.username AS author_username
             FROM posts p
             JOIN users u ON u.id = p.author_id
             WHERE p.id = ?1",
            params![id],
            |row| Ok((Post::from_row(row)?, row.get::<_, String>("author_username")?)),
        )
        .optional()?;

    let Some((post, author_username)) = post else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT c.id AS id, c.content AS content, c.author_id AS author_id,
                c.post_id AS post_id, c.created_at AS created_at,
                u.username AS author_username
         FROM comments c
         JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;
    let comments = stmt
        .query_map(params![id], |row| {
            Ok(CommentWithAuthor {
                comment: Comment::from_row(row)?,
                author_username: row.get("author_username")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(PostWithComments {
        post,
        author_username,
        comments,
    }))
}

pub async fn create_comment(db: &DbPool, input: NewComment, now: DateTime<Utc>) -> AppResult<Comment> {
    let input = validated(input)?;

    let conn = db.get()?;
    if find_post(&conn, &input.post_id)?.is_none() {
        return Err(AppError::NotFound);
    }

    let comment = Comment {
        id: uuid::Uuid::now_v7().to_string(),
        content: input.content,
        author_id: input.author_id,
        post_id: input.post_id,
        created_at: now,
    };

    conn.execute(
        "INSERT INTO comments (id, content, author_id, post_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            comment.id,
            comment.content,
            comment.author_id,
            comment.post_id,
            comment.created_at
        ],
    )?;

    Ok(comment)
}

/// Delete a comment the requester wrote on the given post, provided it is
/// still inside the deletion window at `now`.
pub async fn delete_comment(db: &DbPool, target: CommentRef, now: DateTime<Utc>) -> AppResult<()> {
    let conn = db.get()?;

    let comment = conn
        .query_row(
            "SELECT id, content, author_id, post_id, created_at FROM comments
             WHERE id = ?1 AND post_id = ?2 AND author_id = ?3",
            params![target.id, target.post_id, target.author_id],
            Comment::from_row,
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    if !within_delete_window(comment.created_at, now) {
        tracing::debug!("Refusing to delete comment {}: too old", comment.id);
        return Err(AppError::CommentTooOld);
    }

    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment.id])?;
    Ok(())
}

/// Whether `user_id` may still delete this comment at `now`.
pub fn can_delete_comment(comment: &Comment, user_id: Option<&str>, now: DateTime<Utc>) -> bool {
    user_id == Some(comment.author_id.as_str()) && within_delete_window(comment.created_at, now)
}

fn within_delete_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at <= Duration::minutes(COMMENT_DELETE_WINDOW_MINUTES)
}

fn find_post(conn: &Connection, id: &str) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(
            "SELECT id, title, content, author_id, created_at, updated_at
             FROM posts WHERE id = ?1",
            params![id],
            Post::from_row,
        )
        .optional()?;
    Ok(post)
}

/// `M/d/yyyy h:mm a`, e.g. `3/7/2024 4:05 PM`.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%-m/%-d/%Y %-I:%M %p").to_string()
}

pub fn format_relative_time(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}
