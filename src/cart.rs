//! 每个用户自己的购物车。没有数量字段，同一本书的重复行就是数量。

use sqlx::{SqliteExecutor, SqlitePool};
use tracing::info;

use crate::{catalog, error::AppError, models::CartLine};

/// 加入一本书。书不存在时返回 `NotFound`。
pub async fn add(pool: &SqlitePool, user_id: i64, book_id: i64) -> Result<(), AppError> {
    if catalog::find_book(pool, book_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    sqlx::query("INSERT INTO cart_item (user_id, book_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(book_id)
        .execute(pool)
        .await?;

    info!("用户 {} 加入图书 {} 到购物车", user_id, book_id);
    Ok(())
}

/// 删除该书的所有行，返回删除的行数
pub async fn remove(pool: &SqlitePool, user_id: i64, book_id: i64) -> Result<u64, sqlx::Error> {
    let removed = sqlx::query("DELETE FROM cart_item WHERE user_id = ? AND book_id = ?")
        .bind(user_id)
        .bind(book_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!("用户 {} 从购物车移除图书 {} ({} 行)", user_id, book_id, removed);
    Ok(removed)
}

pub async fn lines<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: i64,
) -> Result<Vec<CartLine>, sqlx::Error> {
    sqlx::query_as::<_, CartLine>(
        "SELECT b.*, COUNT(c.id) AS quantity
         FROM cart_item c
         JOIN book b ON b.book_id = c.book_id
         WHERE c.user_id = ?
         GROUP BY b.book_id
         ORDER BY b.book_id",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
}

pub async fn count<'e>(executor: impl SqliteExecutor<'e>, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM cart_item WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(executor)
        .await
}

/// 所有行的价格之和，重复行按数量计入
pub async fn sum<'e>(executor: impl SqliteExecutor<'e>, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(b.price), 0)
         FROM cart_item c
         JOIN book b ON b.book_id = c.book_id
         WHERE c.user_id = ?",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
}

pub async fn clear<'e>(executor: impl SqliteExecutor<'e>, user_id: i64) -> Result<u64, sqlx::Error> {
    Ok(sqlx::query("DELETE FROM cart_item WHERE user_id = ?")
        .bind(user_id)
        .execute(executor)
        .await?
        .rows_affected())
}
