//! 目录浏览：类别、子类别和图书的只读查询。
//!
//! 不存在的 id 或名称只会得到空列表。

use sqlx::SqlitePool;

use crate::models::{Book, Genre, Subgenre};

pub async fn list_genres(pool: &SqlitePool) -> Result<Vec<Genre>, sqlx::Error> {
    sqlx::query_as::<_, Genre>("SELECT genre_id, name FROM genre ORDER BY genre_id")
        .fetch_all(pool)
        .await
}

pub async fn list_subgenres(pool: &SqlitePool, genre_id: i64) -> Result<Vec<Subgenre>, sqlx::Error> {
    sqlx::query_as::<_, Subgenre>(
        "SELECT id, name, genre_id FROM subgenre WHERE genre_id = ? ORDER BY id",
    )
    .bind(genre_id)
    .fetch_all(pool)
    .await
}

/// 按类别名称精确匹配（区分大小写）
pub async fn books_by_genre(pool: &SqlitePool, genre: &str) -> Result<Vec<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM book WHERE genre = ? ORDER BY book_id")
        .bind(genre)
        .fetch_all(pool)
        .await
}

pub async fn list_books(pool: &SqlitePool) -> Result<Vec<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM book ORDER BY book_id")
        .fetch_all(pool)
        .await
}

pub async fn find_book(pool: &SqlitePool, book_id: i64) -> Result<Option<Book>, sqlx::Error> {
    sqlx::query_as::<_, Book>("SELECT * FROM book WHERE book_id = ?")
        .bind(book_id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    pub(crate) async fn seed_book(pool: &SqlitePool, book_id: i64, genre: &str, price: i64) {
        sqlx::query(
            "INSERT INTO book (book_id, title, author, price, genre) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(book_id)
        .bind(format!("Book {book_id}"))
        .bind("Author")
        .bind(price)
        .bind(genre)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn books_by_genre_requires_exact_match() {
        let db = DatabaseManager::in_memory().await.unwrap();
        seed_book(&db.pool, 1, "Fantasy", 10).await;
        seed_book(&db.pool, 2, "fantasy", 20).await;
        seed_book(&db.pool, 3, "Fantasy ", 30).await;
        seed_book(&db.pool, 4, "Science Fantasy", 40).await;
        seed_book(&db.pool, 5, "Fantasy", 50).await;

        let books = books_by_genre(&db.pool, "Fantasy").await.unwrap();
        let ids: Vec<i64> = books.iter().map(|b| b.book_id).collect();
        assert_eq!(ids, vec![1, 5]);
        assert!(books.iter().all(|b| b.genre == "Fantasy"));

        assert!(books_by_genre(&db.pool, "Horror").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subgenres_are_filtered_by_genre_id() {
        let db = DatabaseManager::in_memory().await.unwrap();
        sqlx::query("INSERT INTO genre (genre_id, name) VALUES (1, 'Fiction'), (2, 'Science')")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO subgenre (id, name, genre_id) VALUES (1, 'Fantasy', 1), (2, 'Physics', 2), (3, 'Horror', 1)",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        assert_eq!(list_genres(&db.pool).await.unwrap().len(), 2);

        let names: Vec<String> = list_subgenres(&db.pool, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Fantasy", "Horror"]);

        assert!(list_subgenres(&db.pool, 99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_book_returns_none_for_unknown_id() {
        let db = DatabaseManager::in_memory().await.unwrap();
        seed_book(&db.pool, 7, "Poetry", 12).await;

        assert_eq!(find_book(&db.pool, 7).await.unwrap().unwrap().price, 12);
        assert!(find_book(&db.pool, 8).await.unwrap().is_none());
        assert_eq!(list_books(&db.pool).await.unwrap().len(), 1);
    }
}
