use anyhow::Result;
use bookshop::{config::Config, database::DatabaseManager, loader, state::AppState};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 图书商城启动中");

    let config = Config::load()?;

    let db_manager = match DatabaseManager::new_with_config(&config.database_url).await {
        Ok(manager) => {
            info!("✅ 数据库连接成功");
            manager
        }
        Err(e) => {
            error!("❌ 数据库连接失败: {}", e);
            return Err(e);
        }
    };

    db_manager.migrate().await?;

    // 导入失败不是致命错误，继续启动
    if let Some(path) = &config.genres_catalog {
        if let Err(e) = loader::load_genres(&db_manager.pool, path).await {
            error!("⚠️  类别导入失败: {:#}", e);
        }
    }
    if let Err(e) = loader::load_books(&db_manager.pool, &config.books_catalog).await {
        error!("⚠️  图书导入失败: {:#}", e);
    }

    if let Err(e) = db_manager.log_table_stats().await {
        error!("⚠️  表统计信息获取失败: {}", e);
    }

    let state = AppState::new(db_manager.pool.clone(), config);
    let served = bookshop::start_server(state).await;

    db_manager.close().await;
    served
}
