//! 启动时的一次性导入：把 JSON 目录文件写入数据库。
//!
//! 已存在的主键会被忽略，所以重复导入是安全的。JSON 格式错误只记录日志，不会中断启动。

use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub price: i64,
    pub genre: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub year: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenreRecord {
    pub genre_id: i64,
    pub name: String,
    #[serde(default)]
    pub subgenres: Vec<SubgenreRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SubgenreRecord {
    pub id: i64,
    pub name: String,
}

/// 年份在目录里有时是数字有时是字符串
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

/// 读取 JSON 数组并逐条解析。
///
/// 文件缺失或整体不是合法 JSON 数组时返回 `None`；单条记录格式错误只跳过该条。
fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    if !path.exists() {
        warn!("目录文件 {} 不存在，跳过导入", path.display());
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("读取 {} 失败", path.display()))?;

    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            error!("JSON 格式错误 {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("跳过 {} 中第 {} 条记录: {}", path.display(), index, e);
                None
            }
        })
        .collect();

    Ok(Some(records))
}

/// 导入图书，返回新插入的行数
pub async fn load_books(pool: &SqlitePool, path: &Path) -> Result<u64> {
    let Some(books) = read_records::<BookRecord>(path)? else {
        return Ok(0);
    };

    info!("开始导入 {} 本图书", books.len());

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for book in &books {
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO book
                (book_id, title, author, price, genre, cover, description, rating, year)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price)
        .bind(&book.genre)
        .bind(&book.cover)
        .bind(&book.description)
        .bind(book.rating)
        .bind(&book.year)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("插入图书 {} 失败", book.id))?
        .rows_affected();
    }

    tx.commit().await?;

    info!("图书导入完成: 新增 {} 本，跳过 {} 本", inserted, books.len() as u64 - inserted);
    Ok(inserted)
}

/// 导入类别及其子类别，返回新插入的行数
pub async fn load_genres(pool: &SqlitePool, path: &Path) -> Result<u64> {
    let Some(genres) = read_records::<GenreRecord>(path)? else {
        return Ok(0);
    };

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for genre in &genres {
        inserted += sqlx::query("INSERT OR IGNORE INTO genre (genre_id, name) VALUES (?, ?)")
            .bind(genre.genre_id)
            .bind(&genre.name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("插入类别 {} 失败", genre.name))?
            .rows_affected();

        for sub in &genre.subgenres {
            inserted += sqlx::query(
                "INSERT OR IGNORE INTO subgenre (id, name, genre_id) VALUES (?, ?, ?)",
            )
            .bind(sub.id)
            .bind(&sub.name)
            .bind(genre.genre_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("插入子类别 {} 失败", sub.name))?
            .rows_affected();
        }
    }

    tx.commit().await?;

    info!("类别导入完成: 新增 {} 行", inserted);
    Ok(inserted)
}
