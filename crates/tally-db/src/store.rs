//! Row operations.
//!
//! Every function takes a `&mut PgConnection`, in practice the deref of a
//! `sqlx::Transaction` owned by the caller, so multi-row units of work
//! (withdrawal, accrual apply) compose atomically.  `for_update` reads take a
//! row-exclusive lock held until the enclosing transaction ends.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::debug;

use crate::{Order, OrderStatus, StoreError, User, Withdrawal};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn user_by_login(conn: &mut PgConnection, login: &str) -> Result<User, StoreError> {
    let row = sqlx::query(
        r#"
        select id, login, password_hash, balance, withdrawn, created_at, updated_at
        from users
        where login = $1
        "#,
    )
    .bind(login)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(map_user).transpose()?.ok_or(StoreError::NotFound)
}

pub async fn user_by_id(
    conn: &mut PgConnection,
    id: i64,
    for_update: bool,
) -> Result<User, StoreError> {
    let sql = if for_update {
        r#"
        select id, login, password_hash, balance, withdrawn, created_at, updated_at
        from users
        where id = $1
        for update
        "#
    } else {
        r#"
        select id, login, password_hash, balance, withdrawn, created_at, updated_at
        from users
        where id = $1
        "#
    };

    let row = sqlx::query(sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(map_user).transpose()?.ok_or(StoreError::NotFound)
}

/// Insert a new user; a duplicate login surfaces as `AlreadyExists`.
pub async fn create_user(
    conn: &mut PgConnection,
    login: &str,
    password_hash: &str,
) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        insert into users (login, password_hash)
        values ($1, $2)
        returning id
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .fetch_one(&mut *conn)
    .await
    .map_err(classify_conflict)?;

    let id: i64 = row.try_get("id")?;
    debug!(user_id = id, "created user");
    Ok(id)
}

/// Overwrite both balance fields.  The caller must hold the user row lock
/// (`user_by_id(.., for_update = true)`) in the same transaction.
pub async fn update_user_balance(
    conn: &mut PgConnection,
    user_id: i64,
    balance: f64,
    withdrawn: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        update users
        set balance = $2,
            withdrawn = $3,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(user_id)
    .bind(balance)
    .bind(withdrawn)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub async fn order_by_id(
    conn: &mut PgConnection,
    order_id: i64,
    for_update: bool,
) -> Result<Order, StoreError> {
    let sql = if for_update {
        r#"
        select id, status, user_id, accrual, created_at, updated_at
        from orders
        where id = $1
        for update
        "#
    } else {
        r#"
        select id, status, user_id, accrual, created_at, updated_at
        from orders
        where id = $1
        "#
    };

    let row = sqlx::query(sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(map_order).transpose()?.ok_or(StoreError::NotFound)
}

/// Insert an order with status NEW.  A colliding order number surfaces as
/// `AlreadyExists`; the business layer disambiguates the uploader.
pub async fn create_order(
    conn: &mut PgConnection,
    user_id: i64,
    order_id: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into orders (id, status, user_id)
        values ($1, $2, $3)
        "#,
    )
    .bind(order_id)
    .bind(OrderStatus::New.as_str())
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(classify_conflict)?;

    debug!(order_id, user_id, "created order");
    Ok(())
}

pub async fn update_order(
    conn: &mut PgConnection,
    order_id: i64,
    accrual: Option<f64>,
    status: OrderStatus,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        update orders
        set status = $2,
            accrual = $3,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(order_id)
    .bind(status.as_str())
    .bind(accrual)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// All orders uploaded by a user, oldest first.
pub async fn orders_by_user(conn: &mut PgConnection, user_id: i64) -> Result<Vec<Order>, StoreError> {
    let rows = sqlx::query(
        r#"
        select id, status, user_id, accrual, created_at, updated_at
        from orders
        where user_id = $1
        order by created_at asc
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(map_order).collect()
}

/// Orders the sync job still has to resolve: status NEW or PROCESSING,
/// oldest first.  Terminal orders are excluded here, which is what keeps the
/// applier from ever re-crediting a finished order.
pub async fn unfinished_orders(conn: &mut PgConnection) -> Result<Vec<Order>, StoreError> {
    let rows = sqlx::query(
        r#"
        select id, status, user_id, accrual, created_at, updated_at
        from orders
        where status in ('NEW', 'PROCESSING')
        order by created_at asc
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(map_order).collect()
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

/// Insert a withdrawal row.  The caller is responsible for adjusting the user
/// balance in the same transaction (see the business layer's withdraw path).
pub async fn create_withdrawal(
    conn: &mut PgConnection,
    user_id: i64,
    order_id: i64,
    sum: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into withdrawals (order_id, user_id, sum)
        values ($1, $2, $3)
        "#,
    )
    .bind(order_id)
    .bind(user_id)
    .bind(sum)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// All withdrawals by a user, oldest first.
pub async fn withdrawals_by_user(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Vec<Withdrawal>, StoreError> {
    let rows = sqlx::query(
        r#"
        select id, order_id, user_id, sum, created_at
        from withdrawals
        where user_id = $1
        order by created_at asc
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(map_withdrawal).collect()
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn map_user(row: PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        password_hash: row.try_get("password_hash")?,
        balance: row.try_get("balance")?,
        withdrawn: row.try_get("withdrawn")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_order(row: PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: row.try_get("id")?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status")?)?,
        user_id: row.try_get("user_id")?,
        accrual: row.try_get("accrual")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_withdrawal(row: PgRow) -> Result<Withdrawal, StoreError> {
    Ok(Withdrawal {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        sum: row.try_get("sum")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Map a Postgres unique-constraint violation (SQLSTATE 23505) to
/// `AlreadyExists`; anything else stays a database error.
fn classify_conflict(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::AlreadyExists
        }
        _ => StoreError::Database(err),
    }
}
