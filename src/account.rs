//! Account deletion. A departing user's posts and comments are handed to a
//! shared `anonymous` account so the threads they took part in stay intact.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::auth::password::{get_reset_token, PasswordHasher};
use crate::db::unique_violation_field;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub const ANONYMOUS_USERNAME: &str = "anonymous";
pub const ANONYMOUS_EMAIL: &str = "anonymous@wtf.rent";

const FIND_ANONYMOUS: &str = "SELECT id FROM users WHERE username = ?1 AND email = ?2";

/// The form field a registration must not claim because it belongs to the
/// anonymous account. Compared case-insensitively.
pub fn reserved_field(email: &str, username: &str) -> Option<&'static str> {
    if email.eq_ignore_ascii_case(ANONYMOUS_EMAIL) {
        Some("email")
    } else if username.eq_ignore_ascii_case(ANONYMOUS_USERNAME) {
        Some("username")
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub anonymous_id: String,
    pub posts_reassigned: usize,
    pub comments_reassigned: usize,
}

/// Delete `user_id` once `confirm_email` matches its email exactly.
///
/// Reassignment and deletion happen in one IMMEDIATE transaction: either the
/// user is gone and everything they wrote belongs to `anonymous`, or nothing
/// changed.
pub async fn delete_account(
    db: &DbPool,
    hasher: &PasswordHasher,
    user_id: &str,
    confirm_email: &str,
) -> AppResult<DeletionReport> {
    if confirm_email.is_empty() {
        return Err(AppError::validation(
            "email",
            "you must confirm your account's email",
        ));
    }

    let (matches, anonymous_exists) = {
        let conn = db.get()?;
        let matches: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE id = ?1 AND email = ?2",
            params![user_id, confirm_email],
            |row| row.get(0),
        )?;
        let anonymous_exists = conn
            .query_row(
                FIND_ANONYMOUS,
                params![ANONYMOUS_USERNAME, ANONYMOUS_EMAIL],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .is_some();
        (matches, anonymous_exists)
    };

    if !matches {
        return Err(AppError::validation("email", "no match"));
    }

    // Nobody can log in as anonymous: its password is the hash of a random
    // token nobody ever sees. Hashed before any connection is taken.
    let anonymous_password = if anonymous_exists {
        None
    } else {
        Some(hasher.hash(&get_reset_token()).await?)
    };

    let mut conn = db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut anonymous_id: Option<String> = tx
        .query_row(
            FIND_ANONYMOUS,
            params![ANONYMOUS_USERNAME, ANONYMOUS_EMAIL],
            |row| row.get(0),
        )
        .optional()?;

    if anonymous_id.is_none() {
        // The password was only hashed when the account was missing up front.
        let password = anonymous_password.ok_or_else(|| {
            AppError::Internal("anonymous account vanished during deletion".into())
        })?;
        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO users (id, email, username, password, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                ANONYMOUS_EMAIL,
                ANONYMOUS_USERNAME,
                password,
                chrono::Utc::now()
            ],
        )
        .map_err(|e| match unique_violation_field(&e) {
            // Only a row holding one of the two reserved values gets here.
            Some(field) => {
                tracing::error!("Anonymous account {} is held by another user", field);
                AppError::AnonymousUnavailable
            }
            None => AppError::Database(e),
        })?;
        tracing::info!("Created anonymous account {}", id);
        anonymous_id = Some(id);
    }

    let anonymous_id = anonymous_id
        .ok_or_else(|| AppError::Internal("anonymous account missing".into()))?;

    if anonymous_id == user_id {
        return Err(AppError::validation("email", "no match"));
    }

    let comments_reassigned = tx.execute(
        "UPDATE comments SET author_id = ?1 WHERE author_id = ?2",
        params![anonymous_id, user_id],
    )?;
    let posts_reassigned = tx.execute(
        "UPDATE posts SET author_id = ?1 WHERE author_id = ?2",
        params![anonymous_id, user_id],
    )?;
    tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    tx.commit()?;

    tracing::info!(
        "Deleted account {}: reassigned {} posts and {} comments to {}",
        user_id,
        posts_reassigned,
        comments_reassigned,
        anonymous_id
    );

    Ok(DeletionReport {
        anonymous_id,
        posts_reassigned,
        comments_reassigned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::User;
    use crate::posts::{self, NewComment, NewPost};
    use crate::users::{self, NewUser};
    use chrono::Utc;

    fn test_db() -> DbPool {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        pool
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    async fn user(db: &DbPool, name: &str) -> User {
        users::create_user(
            db,
            &hasher(),
            NewUser {
                email: format!("{}@example.com", name),
                username: name.into(),
                password: "password123".into(),
            },
        )
        .await
        .unwrap()
    }

    async fn post_by(db: &DbPool, author: &User) -> String {
        posts::create_post(
            db,
            NewPost {
                title: "title".into(),
                content: "<p>content</p>".into(),
                author_id: author.id.clone(),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn comment_by(db: &DbPool, author: &User, post_id: &str) -> String {
        posts::create_comment(
            db,
            NewComment {
                content: "comment".into(),
                author_id: author.id.clone(),
                post_id: post_id.into(),
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .id
    }

    fn author_of(db: &DbPool, table: &str, id: &str) -> String {
        let conn = db.get().unwrap();
        conn.query_row(
            &format!("SELECT author_id FROM {} WHERE id = ?1", table),
            params![id],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn anonymous_count(db: &DbPool) -> i64 {
        let conn = db.get().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            params![ANONYMOUS_USERNAME],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn deletion_reassigns_content_to_anonymous() {
        let db = test_db();
        let u = user(&db, "umbrella").await;
        let other = user(&db, "other").await;
        let p1 = post_by(&db, &u).await;
        let p2 = post_by(&db, &u).await;
        let theirs = post_by(&db, &other).await;
        let c1 = comment_by(&db, &u, &theirs).await;

        let report = delete_account(&db, &hasher(), &u.id, &u.email).await.unwrap();
        assert_eq!(report.posts_reassigned, 2);
        assert_eq!(report.comments_reassigned, 1);

        assert!(users::get_user_by_id(&db, &u.id).await.unwrap().is_none());
        assert_eq!(author_of(&db, "posts", &p1), report.anonymous_id);
        assert_eq!(author_of(&db, "posts", &p2), report.anonymous_id);
        assert_eq!(author_of(&db, "comments", &c1), report.anonymous_id);
        assert_eq!(author_of(&db, "posts", &theirs), other.id);

        let anonymous = users::get_user_by_id(&db, &report.anonymous_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anonymous.email, ANONYMOUS_EMAIL);
    }

    #[tokio::test]
    async fn anonymous_account_is_reused() {
        let db = test_db();
        let a = user(&db, "a").await;
        let b = user(&db, "b").await;
        post_by(&db, &a).await;
        post_by(&db, &b).await;

        let first = delete_account(&db, &hasher(), &a.id, &a.email).await.unwrap();
        let second = delete_account(&db, &hasher(), &b.id, &b.email).await.unwrap();

        assert_eq!(first.anonymous_id, second.anonymous_id);
        assert_eq!(anonymous_count(&db), 1);
    }

    #[tokio::test]
    async fn empty_confirmation_is_rejected() {
        let db = test_db();
        let u = user(&db, "u").await;

        match delete_account(&db, &hasher(), &u.id, "").await {
            Err(AppError::Validation(errors)) => assert_eq!(
                errors.get("email"),
                Some("you must confirm your account's email")
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(users::get_user_by_id(&db, &u.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mismatched_email_changes_nothing() {
        let db = test_db();
        let u = user(&db, "u").await;
        let other = user(&db, "other").await;
        let p = post_by(&db, &u).await;

        for attempt in ["U@example.com", other.email.as_str()] {
            match delete_account(&db, &hasher(), &u.id, attempt).await {
                Err(AppError::Validation(errors)) => {
                    assert_eq!(errors.get("email"), Some("no match"))
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }

        assert!(users::get_user_by_id(&db, &u.id).await.unwrap().is_some());
        assert_eq!(author_of(&db, "posts", &p), u.id);
        assert_eq!(anonymous_count(&db), 0);
    }

    #[tokio::test]
    async fn anonymous_account_cannot_log_in() {
        let db = test_db();
        let u = user(&db, "u").await;
        delete_account(&db, &hasher(), &u.id, &u.email).await.unwrap();

        for guess in ["", "anonymous", "password123"] {
            assert!(
                users::verify_login(&db, &hasher(), ANONYMOUS_EMAIL, guess)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
    }

    /// Plants a row directly, the way data written before registration
    /// refused the anonymous identity could look.
    fn plant_user(db: &DbPool, email: &str, username: &str) -> User {
        let conn = db.get().unwrap();
        users::insert_user(&conn, email, username, "not-a-bcrypt-hash").unwrap()
    }

    #[tokio::test]
    async fn registered_anonymous_username_never_receives_content() {
        let db = test_db();
        let squatter = plant_user(&db, "mallory@example.com", ANONYMOUS_USERNAME);
        let victim = user(&db, "victim").await;
        let p = post_by(&db, &victim).await;

        match delete_account(&db, &hasher(), &victim.id, &victim.email).await {
            Err(AppError::AnonymousUnavailable) => {}
            other => panic!("expected anonymous to be unavailable, got {:?}", other),
        }

        assert!(users::get_user_by_id(&db, &victim.id).await.unwrap().is_some());
        assert_eq!(author_of(&db, "posts", &p), victim.id);
        assert_ne!(author_of(&db, "posts", &p), squatter.id);
    }

    #[tokio::test]
    async fn registered_anonymous_email_fails_cleanly() {
        let db = test_db();
        plant_user(&db, ANONYMOUS_EMAIL, "squatter");
        let victim = user(&db, "victim").await;
        let p = post_by(&db, &victim).await;

        match delete_account(&db, &hasher(), &victim.id, &victim.email).await {
            Err(AppError::AnonymousUnavailable) => {}
            other => panic!("expected anonymous to be unavailable, got {:?}", other),
        }

        assert!(users::get_user_by_id(&db, &victim.id).await.unwrap().is_some());
        assert_eq!(author_of(&db, "posts", &p), victim.id);
    }

    #[test]
    fn reserved_fields_match_case_insensitively() {
        assert_eq!(reserved_field("ANONYMOUS@wtf.rent", "bob"), Some("email"));
        assert_eq!(reserved_field("bob@example.com", "Anonymous"), Some("username"));
        assert_eq!(reserved_field("bob@example.com", "anonymous2"), None);
    }
}
