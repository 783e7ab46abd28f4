use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{self, CurrentUser, LoginForm, RegisterForm, INVALID_CREDENTIALS},
    cart, catalog,
    error::AppError,
    models::{Book, CartLine, Genre, Order, Subgenre},
    orders::{self, OrderForm},
    state::SharedState,
};

#[derive(Debug, Default, Serialize)]
pub struct HomeView {
    pub genres: Vec<Genre>,
    pub subgenres: Vec<Subgenre>,
    pub books: Vec<Book>,
}

#[derive(Debug, Default, Serialize)]
pub struct AuthView {
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub username: String,
    pub books: Vec<Book>,
    pub cart_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub count: i64,
    pub sum: i64,
}

#[derive(Debug, Serialize)]
pub struct OrdersView {
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct CartForm {
    pub book_id: i64,
}

fn auth_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(AuthView {
            error: Some(message.into()),
        }),
    )
        .into_response()
}

pub async fn home_handler(State(state): State<SharedState>) -> Result<Json<HomeView>, AppError> {
    Ok(Json(HomeView {
        genres: catalog::list_genres(&state.pool).await?,
        ..Default::default()
    }))
}

/// 只由 ASCII 数字组成且不溢出的段才是类别 id
fn genre_id_segment(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// 数字段按类别 id 列出子类别，否则按类别名称列出图书
pub async fn genre_handler(
    State(state): State<SharedState>,
    Path(segment): Path<String>,
) -> Result<Json<HomeView>, AppError> {
    let view = match genre_id_segment(&segment) {
        Some(genre_id) => HomeView {
            subgenres: catalog::list_subgenres(&state.pool, genre_id).await?,
            ..Default::default()
        },
        None => HomeView {
            books: catalog::books_by_genre(&state.pool, &segment).await?,
            ..Default::default()
        },
    };

    Ok(Json(view))
}

pub async fn register_page() -> Json<AuthView> {
    Json(AuthView::default())
}

pub async fn register_handler(
    State(state): State<SharedState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    match auth::register(&state.pool, &form).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(AppError::Conflict(message)) => Ok(auth_error(StatusCode::CONFLICT, message)),
        Err(e) => Err(e),
    }
}

pub async fn login_page() -> Json<AuthView> {
    Json(AuthView::default())
}

pub async fn login_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let Some(user) = auth::authenticate(&state.pool, &form.email, &form.password).await? else {
        return Ok(auth_error(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
    };

    // 重新登录时作废请求里带来的旧会话
    if let Some(previous) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state.pool, previous.value()).await?;
    }

    let token =
        auth::create_session(&state.pool, user.id, state.config.session_ttl_hours).await?;
    info!("用户 {} 登录", user.id);

    let jar = jar.add(auth::session_cookie(token, state.config.cookie_secure));
    Ok((jar, Redirect::to("/dashboard")).into_response())
}

pub async fn dashboard_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
) -> Result<Json<DashboardView>, AppError> {
    Ok(Json(DashboardView {
        books: catalog::list_books(&state.pool).await?,
        cart_count: cart::count(&state.pool, current.user.id).await?,
        username: current.user.username,
    }))
}

pub async fn add_to_cart_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
    Form(form): Form<CartForm>,
) -> Result<Redirect, AppError> {
    cart::add(&state.pool, current.user.id, form.book_id).await?;
    Ok(Redirect::to("/dashboard"))
}

async fn cart_view(state: &SharedState, user_id: i64) -> Result<CartView, AppError> {
    Ok(CartView {
        lines: cart::lines(&state.pool, user_id).await?,
        count: cart::count(&state.pool, user_id).await?,
        sum: cart::sum(&state.pool, user_id).await?,
    })
}

pub async fn cart_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(cart_view(&state, current.user.id).await?))
}

pub async fn remove_from_cart_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
    Form(form): Form<CartForm>,
) -> Result<Redirect, AppError> {
    cart::remove(&state.pool, current.user.id, form.book_id).await?;
    Ok(Redirect::to("/cart"))
}

pub async fn checkout_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
) -> Result<Json<CartView>, AppError> {
    Ok(Json(cart_view(&state, current.user.id).await?))
}

pub async fn create_order_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
    Form(form): Form<OrderForm>,
) -> Result<Redirect, AppError> {
    orders::place(&state.pool, current.user.id, &form).await?;
    Ok(Redirect::to("/dashboard"))
}

pub async fn orders_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
) -> Result<Json<OrdersView>, AppError> {
    Ok(Json(OrdersView {
        orders: orders::list_for_user(&state.pool, current.user.id).await?,
    }))
}

pub async fn logout_handler(
    State(state): State<SharedState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    auth::destroy_session(&state.pool, &current.token).await?;
    info!("用户 {} 退出登录", current.user.id);

    Ok((jar.remove(auth::expired_session_cookie()), Redirect::to("/login")))
}

pub async fn catalog_handler() -> Redirect {
    Redirect::to("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsigned_digits_are_genre_ids() {
        assert_eq!(genre_id_segment("1"), Some(1));
        assert_eq!(genre_id_segment("007"), Some(7));
        assert_eq!(genre_id_segment("-1"), None);
        assert_eq!(genre_id_segment("+1"), None);
        assert_eq!(genre_id_segment("Fantasy"), None);
        assert_eq!(genre_id_segment(""), None);
        assert_eq!(genre_id_segment("99999999999999999999"), None);
    }
}
