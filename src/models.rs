use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    /// Argon2 PHC 字符串
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Genre {
    pub genre_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subgenre {
    pub id: i64,
    pub name: String,
    pub genre_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub price: i64,
    pub genre: String,
    pub cover: Option<String>,
    pub description: Option<String>,
    pub rating: Option<i64>,
    pub year: Option<String>,
}

/// 购物车中的一本书及其数量
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartLine {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub book: Book,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub order_number: i64,
    pub phone: String,
    pub delivery_method: String,
    pub message: String,
    pub total: i64,
    pub delivery_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
