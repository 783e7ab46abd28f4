use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{cart, error::AppError, models::Order};

/// 订单号取值区间 `[ORDER_NUMBER_MIN, ORDER_NUMBER_MAX)`
pub const ORDER_NUMBER_MIN: i64 = 1000;
pub const ORDER_NUMBER_MAX: i64 = 100_000;

const ORDER_NUMBER_ATTEMPTS: usize = 32;

#[derive(Debug, Default, Deserialize)]
pub struct OrderForm {
    pub phone: String,
    pub delivery_method: String,
    #[serde(default)]
    pub message: String,
    /// `YYYY-MM-DD`，为空时取当天
    #[serde(default)]
    pub delivery_date: Option<String>,
}

fn parse_delivery_date(raw: Option<&str>) -> Result<NaiveDate, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("Invalid delivery date: {s}"))),
        None => Ok(Utc::now().date_naive()),
    }
}

fn random_order_number() -> i64 {
    let span = (ORDER_NUMBER_MAX - ORDER_NUMBER_MIN) as u128;
    ORDER_NUMBER_MIN + (Uuid::new_v4().as_u128() % span) as i64
}

/// 随机抽取一个未被使用的订单号
async fn unique_order_number(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = random_order_number();
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = ?)")
                .bind(candidate)
                .fetch_one(&mut *conn)
                .await?;

        if !taken {
            return Ok(candidate);
        }
        warn!("订单号 {} 已被使用，重新抽取", candidate);
    }

    Err(AppError::Internal(
        "could not allocate a free order number".to_string(),
    ))
}

/// 把当前购物车结算成订单并清空购物车，全部在一个事务里完成
pub async fn place(pool: &SqlitePool, user_id: i64, form: &OrderForm) -> Result<Order, AppError> {
    let delivery_date = parse_delivery_date(form.delivery_date.as_deref())?;

    let mut tx = pool.begin().await?;

    let items = cart::count(&mut *tx, user_id).await?;
    if items == 0 {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let total = cart::sum(&mut *tx, user_id).await?;
    cart::clear(&mut *tx, user_id).await?;

    let order_number = unique_order_number(&mut *tx).await?;

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders
            (user_id, order_number, phone, delivery_method, message, total, delivery_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(user_id)
    .bind(order_number)
    .bind(&form.phone)
    .bind(&form.delivery_method)
    .bind(&form.message)
    .bind(total)
    .bind(delivery_date)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "用户 {} 下单 {} ({} 件，总价 {})",
        user_id, order.order_number, items, order.total
    );
    Ok(order)
}

pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{self, tests::form},
        catalog::tests::seed_book,
        database::DatabaseManager,
    };

    fn order_form(delivery_date: Option<&str>) -> OrderForm {
        OrderForm {
            phone: "555-0100".to_string(),
            delivery_method: "courier".to_string(),
            message: "leave at the door".to_string(),
            delivery_date: delivery_date.map(str::to_string),
        }
    }

    async fn setup() -> (DatabaseManager, i64) {
        let db = DatabaseManager::in_memory().await.unwrap();
        seed_book(&db.pool, 1, "Fantasy", 300).await;
        seed_book(&db.pool, 2, "Poetry", 120).await;
        let user = auth::register(&db.pool, &form("anna@example.com", "100")).await.unwrap();
        (db, user.id)
    }

    #[test]
    fn order_numbers_stay_in_range() {
        for _ in 0..1000 {
            let n = random_order_number();
            assert!((ORDER_NUMBER_MIN..ORDER_NUMBER_MAX).contains(&n));
        }
    }

    #[test]
    fn delivery_date_parsing() {
        assert_eq!(
            parse_delivery_date(Some("2026-12-24")).unwrap(),
            NaiveDate::from_ymd_opt(2026, 12, 24).unwrap()
        );
        assert_eq!(parse_delivery_date(Some("  ")).unwrap(), Utc::now().date_naive());
        assert_eq!(parse_delivery_date(None).unwrap(), Utc::now().date_naive());
        assert!(matches!(
            parse_delivery_date(Some("24/12/2026")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn placing_an_order_snapshots_total_and_empties_cart() {
        let (db, user) = setup().await;
        cart::add(&db.pool, user, 1).await.unwrap();
        cart::add(&db.pool, user, 1).await.unwrap();
        cart::add(&db.pool, user, 2).await.unwrap();
        let expected = cart::sum(&db.pool, user).await.unwrap();

        let order = place(&db.pool, user, &order_form(Some("2026-12-24"))).await.unwrap();

        assert_eq!(order.total, expected);
        assert_eq!(order.total, 720);
        assert_eq!(order.delivery_date, NaiveDate::from_ymd_opt(2026, 12, 24).unwrap());
        assert_eq!(order.message, "leave at the door");
        assert!((ORDER_NUMBER_MIN..ORDER_NUMBER_MAX).contains(&order.order_number));
        assert_eq!(cart::count(&db.pool, user).await.unwrap(), 0);

        let orders = list_for_user(&db.pool, user).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_number, order.order_number);
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let (db, user) = setup().await;

        let result = place(&db.pool, user, &order_form(None)).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(list_for_user(&db.pool, user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_date_keeps_the_cart() {
        let (db, user) = setup().await;
        cart::add(&db.pool, user, 2).await.unwrap();

        let result = place(&db.pool, user, &order_form(Some("tomorrow"))).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(cart::count(&db.pool, user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let (db, user) = setup().await;

        let mut numbers = Vec::new();
        for _ in 0..20 {
            cart::add(&db.pool, user, 2).await.unwrap();
            numbers.push(place(&db.pool, user, &order_form(None)).await.unwrap().order_number);
        }

        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 20);
    }
}
