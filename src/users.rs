//! User directory: lookups, registration, login verification and password
//! reset tokens.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::account::reserved_field;
use crate::auth::password::{get_reset_token, PasswordHasher};
use crate::db::models::{ResetToken, User};
use crate::db::unique_violation_field;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// How long a password-reset token stays redeemable.
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

const USER_COLUMNS: &str = "id, email, username, password, created_at";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

pub async fn get_user_by_id(db: &DbPool, id: &str) -> AppResult<Option<User>> {
    let conn = db.get()?;
    find_user(&conn, "id", id)
}

pub async fn get_user_by_email(db: &DbPool, email: &str) -> AppResult<Option<User>> {
    let conn = db.get()?;
    find_user(&conn, "email", email)
}

/// Hashes the password, then inserts. Duplicate email or username comes
/// back as `AppError::Conflict` naming the offending column; the anonymous
/// account's email and username are refused as a validation error.
pub async fn create_user(db: &DbPool, hasher: &PasswordHasher, new_user: NewUser) -> AppResult<User> {
    if let Some(field) = reserved_field(&new_user.email, &new_user.username) {
        return Err(AppError::validation(field, format!("This {} is reserved", field)));
    }

    let password = hasher.hash(&new_user.password).await?;

    let conn = db.get()?;
    let user = insert_user(&conn, &new_user.email, &new_user.username, &password)?;
    tracing::info!("Created user {}", user.id);
    Ok(user)
}

pub async fn delete_user_by_email(db: &DbPool, email: &str) -> AppResult<bool> {
    let conn = db.get()?;
    let rows = conn.execute("DELETE FROM users WHERE email = ?1", params![email])?;
    Ok(rows > 0)
}

/// `None` for both an unknown email and a wrong password; callers must not
/// tell the two apart.
pub async fn verify_login(
    db: &DbPool,
    hasher: &PasswordHasher,
    email: &str,
    password: &str,
) -> AppResult<Option<User>> {
    let Some(user) = get_user_by_email(db, email).await? else {
        return Ok(None);
    };

    if !hasher.verify(password, &user.password).await? {
        return Ok(None);
    }

    Ok(Some(user))
}

/// Create or replace the user's reset token. Unknown emails yield `None`.
pub async fn create_reset_token(
    db: &DbPool,
    email: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<ResetToken>> {
    let conn = db.get()?;
    let Some(user) = find_user(&conn, "email", email)? else {
        return Ok(None);
    };

    let token = ResetToken {
        user_id: user.id,
        token: get_reset_token(),
        expiry: now + Duration::hours(RESET_TOKEN_TTL_HOURS),
    };

    conn.execute(
        "INSERT INTO reset_tokens (user_id, token, expiry) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
           token = excluded.token,
           expiry = excluded.expiry",
        params![token.user_id, token.token, token.expiry],
    )?;

    Ok(Some(token))
}

/// Redeem a reset token. Returns the user id on success, `None` if the token
/// is unknown or expired. A redeemed token is deleted.
pub async fn reset_password(
    db: &DbPool,
    hasher: &PasswordHasher,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<String>> {
    let found = {
        let conn = db.get()?;
        conn.query_row(
            "SELECT user_id, expiry FROM reset_tokens WHERE token = ?1",
            params![token],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, DateTime<Utc>>(1)?)),
        )
        .optional()?
    };

    let Some((user_id, expiry)) = found else {
        return Ok(None);
    };

    if expiry < now {
        let conn = db.get()?;
        conn.execute("DELETE FROM reset_tokens WHERE token = ?1", params![token])?;
        return Ok(None);
    }

    let password = hasher.hash(new_password).await?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;
    let consumed = tx.execute(
        "DELETE FROM reset_tokens WHERE token = ?1 AND user_id = ?2",
        params![token, user_id],
    )?;
    if consumed == 0 {
        // Redeemed by a concurrent request in the meantime.
        return Ok(None);
    }
    tx.execute(
        "UPDATE users SET password = ?1 WHERE id = ?2",
        params![password, user_id],
    )?;
    tx.commit()?;

    tracing::info!("Password reset for user {}", user_id);
    Ok(Some(user_id))
}

pub(crate) fn find_user(conn: &Connection, column: &str, value: &str) -> AppResult<Option<User>> {
    // `column` only ever comes from the fixed names above.
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let user = conn
        .query_row(&sql, params![value], User::from_row)
        .optional()?;
    Ok(user)
}

pub(crate) fn insert_user(
    conn: &Connection,
    email: &str,
    username: &str,
    password_hash: &str,
) -> AppResult<User> {
    let user = User {
        id: uuid::Uuid::now_v7().to_string(),
        email: email.to_string(),
        username: username.to_string(),
        password: password_hash.to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, email, username, password, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.id, user.email, user.username, user.password, user.created_at],
    )
    .map_err(|e| match unique_violation_field(&e) {
        Some(field) => AppError::Conflict { field },
        None => AppError::Database(e),
    })?;

    Ok(user)
}
