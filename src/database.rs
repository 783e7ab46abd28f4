use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{error, info, warn};

const TABLES: [&str; 7] = [
    "users", "sessions", "genre", "subgenre", "book", "cart_item", "orders",
];

/// 数据库管理器，基于SQLx的SQLite连接池
pub struct DatabaseManager {
    pub pool: SqlitePool,
}

impl DatabaseManager {
    /// 按连接串创建连接池，文件不存在时自动创建
    pub async fn new_with_config(database_url: &str) -> Result<Self> {
        info!("正在连接数据库...");

        let options = SqliteConnectOptions::from_str(database_url)
            .context("解析 DATABASE_URL 失败")?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("无法创建数据库目录 {}", parent.display()))?;
            }
        }

        let pool = SqlitePool::connect_with(options)
            .await
            .context("无法连接到数据库")?;

        // 测试连接
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .context("数据库连接测试失败")?;

        info!("数据库连接验证成功");
        Ok(Self { pool })
    }

    /// 单连接的内存数据库，已执行迁移。
    ///
    /// 每个连接都有独立的内存库，所以连接池只保留一个连接且永不回收。
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await
            .context("无法创建内存数据库")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    /// 执行嵌入的迁移
    pub async fn migrate(&self) -> Result<()> {
        info!("开始执行数据库迁移...");

        match sqlx::migrate!("./migrations").run(&self.pool).await {
            Ok(()) => {
                info!("数据库迁移完成");
                self.print_migration_status().await?;
                Ok(())
            }
            Err(e) => {
                error!("迁移失败: {}", e);
                self.check_data_integrity().await;
                Err(anyhow::anyhow!("数据库迁移失败: {}", e))
            }
        }
    }

    /// 迁移失败后列出关键表是否存在
    async fn check_data_integrity(&self) {
        for table in TABLES {
            let exists: Result<bool, sqlx::Error> = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await;

            match exists {
                Ok(true) => info!("表 {} 存在", table),
                Ok(false) => warn!("关键表 {} 不存在", table),
                Err(e) => warn!("检查表 {} 失败: {}", table, e),
            }
        }
    }

    async fn print_migration_status(&self) -> Result<()> {
        let migrations = sqlx::query(
            "SELECT version, description, success, execution_time
             FROM _sqlx_migrations
             ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await
        .context("读取迁移记录失败")?;

        for row in migrations {
            let version: i64 = row.get("version");
            let description: String = row.get("description");
            let success: bool = row.get("success");
            let execution_time: i64 = row.get("execution_time");

            let status = if success { "成功" } else { "失败" };
            info!(
                "  v{}: {} ({}, {}ns)",
                version, description, status, execution_time
            );
        }

        Ok(())
    }

    /// 输出各表行数
    pub async fn log_table_stats(&self) -> Result<()> {
        info!("数据库表统计信息:");

        for table in TABLES {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("获取表 {} 行数失败", table))?;

            info!("  - {} 表: {} 行", table, count);
        }

        Ok(())
    }

    /// 关闭连接池
    pub async fn close(self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_has_every_table() {
        let db = DatabaseManager::in_memory().await.unwrap();

        for table in TABLES {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&db.pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{table} should start empty");
        }

        db.log_table_stats().await.unwrap();
    }

    #[tokio::test]
    async fn file_database_is_created_with_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let db = DatabaseManager::new_with_config(&url).await.unwrap();
        db.migrate().await.unwrap();
        // 重复迁移是空操作
        db.migrate().await.unwrap();
        db.close().await;

        assert!(path.exists());
    }
}
