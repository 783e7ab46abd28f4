//! # Bookshop
//!
//! 小型图书商城：注册登录、按类别浏览图书、购物车和下单。
//!
//! ## 路由
//!
//! | 方法 | 路径 | 说明 |
//! |---|---|---|
//! | GET | `/` | 所有类别 |
//! | GET | `/{genre_id}` | 该类别下的子类别 |
//! | GET | `/{genre_name}` | 该类别名称下的图书 |
//! | GET/POST | `/register` | 注册 |
//! | GET/POST | `/login` | 登录 |
//! | GET/POST | `/dashboard` | 图书列表 / 加入购物车 |
//! | GET/POST | `/cart` | 查看购物车 / 移出购物车 |
//! | GET/POST | `/create_order` | 结算 / 下单 |
//! | GET | `/order` | 我的订单 |
//! | GET | `/logout` | 退出 |
//!
//! 页面以 JSON 视图返回。
//!
//! ## 配置
//!
//! 见 [`config::Config`]，支持 `.env` 文件。
//!
//! ```sh
//! RUST_LOG=info cargo run
//! ```

use axum::{routing::get, Router};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod loader;
pub mod models;
pub mod orders;
pub mod routes;
pub mod state;

use routes::{
    add_to_cart_handler, cart_handler, catalog_handler, checkout_handler, create_order_handler,
    dashboard_handler, genre_handler, home_handler, login_handler, login_page, logout_handler,
    orders_handler, register_handler, register_page, remove_from_cart_handler,
};
use state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/register", get(register_page).post(register_handler))
        .route("/login", get(login_page).post(login_handler))
        .route("/dashboard", get(dashboard_handler).post(add_to_cart_handler))
        .route("/cart", get(cart_handler).post(remove_from_cart_handler))
        .route("/create_order", get(checkout_handler).post(create_order_handler))
        .route("/order", get(orders_handler))
        .route("/logout", get(logout_handler))
        .route("/catalog", get(catalog_handler))
        .route("/{segment}", get(genre_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: SharedState) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    info!("绑定地址 {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("✅ 服务已启动: {address}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务正在关闭...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl+C，准备关闭"),
            Err(e) => {
                error!("无法注册 Ctrl+C 处理器: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("收到终止信号，准备关闭");
            }
            Err(e) => {
                error!("无法注册信号处理器: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
