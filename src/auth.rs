//! 注册、登录和基于 cookie 的会话。
//!
//! 会话表只保存令牌的 SHA-256 摘要，原始令牌只出现在 cookie 里。

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, AppError},
    models::{Session, User},
    state::SharedState,
};

pub const SESSION_COOKIE: &str = "session";

pub const EMAIL_TAKEN: &str = "Email already taken!";
pub const PHONE_TAKEN: &str = "Phone already taken!";
pub const INVALID_CREDENTIALS: &str = "Invalid username and password";

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// 首字母大写，其余小写
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("密码摘要无法解析: {e}");
            false
        }
    }
}

async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// SQLite 的唯一约束错误信息形如 `UNIQUE constraint failed: users.phone`
fn taken_message(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Database(db) if db.message().contains("users.phone") => PHONE_TAKEN,
        _ => EMAIL_TAKEN,
    }
}

/// 新建用户。邮箱或手机号已被占用时返回 `Conflict`，不写入任何行。
pub async fn register(pool: &SqlitePool, form: &RegisterForm) -> Result<User, AppError> {
    if find_by_email(pool, &form.email).await?.is_some() {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let phone_taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE phone = ?)")
        .bind(&form.phone)
        .fetch_one(pool)
        .await?;
    if phone_taken {
        return Err(AppError::Conflict(PHONE_TAKEN.to_string()));
    }

    let password = hash_password(&form.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, surname, email, phone, password)
         VALUES (?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(capitalize(&form.username))
    .bind(capitalize(&form.surname))
    .bind(&form.email)
    .bind(&form.phone)
    .bind(password)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        // 并发注册时由唯一约束兜底
        if is_unique_violation(&e) {
            AppError::Conflict(taken_message(&e).to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    info!("新用户注册: {}", user.id);
    Ok(user)
}

pub async fn authenticate(
    pool: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<Option<User>, sqlx::Error> {
    Ok(find_by_email(pool, email)
        .await?
        .filter(|user| verify_password(&user.password, password)))
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// 创建会话并返回原始令牌，同时清理所有已过期的会话
pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    ttl_hours: i64,
) -> Result<String, sqlx::Error> {
    let token = Uuid::new_v4().simple().to_string();
    let now = Utc::now();

    // 时间都以 UTC RFC 3339 文本保存，按字典序比较即可
    let purged = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
    if purged > 0 {
        info!("清理过期会话 {} 个", purged);
    }

    sqlx::query(
        "INSERT INTO sessions (user_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token_digest(&token))
    .bind(now)
    .bind(now + Duration::hours(ttl_hours))
    .execute(pool)
    .await?;

    Ok(token)
}

/// 解析有效会话对应的用户，过期会话顺便删除
pub async fn session_user(pool: &SqlitePool, token: &str) -> Result<Option<User>, sqlx::Error> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(token_digest(token))
        .fetch_optional(pool)
        .await?;

    let Some(session) = session else {
        return Ok(None);
    };

    if session.expires_at <= Utc::now() {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session.id)
            .execute(pool)
            .await?;
        return Ok(None);
    }

    find_user(pool, session.user_id).await
}

pub async fn destroy_session(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_digest(token))
        .execute(pool)
        .await?;
    Ok(())
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// 已登录用户。没有有效会话时重定向到 `/login`。
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_owned())
            .ok_or(AppError::Unauthorized)?;

        let user = session_user(&state.pool, &token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(Self { user, token })
    }
}
