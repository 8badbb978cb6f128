//! Order upload semantics: first upload is accepted, a repeat by the same
//! user and a repeat by a different user are told apart.
//!
//! Runs against a real Postgres; skips when `DATABASE_URI` is not set.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use tally_core::{Service, ServiceError};
use tally_db::OrderStatus;

async fn test_service() -> anyhow::Result<Option<Service>> {
    let url = match std::env::var(tally_db::ENV_DATABASE_URI) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URI not set");
            return Ok(None);
        }
    };

    let pool: PgPool = PgPoolOptions::new().max_connections(4).connect(&url).await?;
    tally_db::migrate(&pool).await?;
    Ok(Some(Service::new(pool)))
}

fn unique_login(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn unique_order_id() -> i64 {
    (Uuid::new_v4().as_u128() as i64 & i64::MAX).max(1)
}

#[tokio::test]
async fn upload_then_repeat_then_foreign_repeat() -> anyhow::Result<()> {
    let Some(service) = test_service().await? else {
        return Ok(());
    };

    let alice = service
        .register_user(&unique_login("core-alice"), "hash")
        .await?;
    let bob = service
        .register_user(&unique_login("core-bob"), "hash")
        .await?;
    let order_id = unique_order_id();

    service.create_order(alice, order_id).await?;

    let again = service.create_order(alice, order_id).await;
    assert!(matches!(again, Err(ServiceError::OrderAlreadyUploaded)));

    let foreign = service.create_order(bob, order_id).await;
    assert!(matches!(foreign, Err(ServiceError::OrderOwnedByAnotherUser)));

    let orders = service.orders(alice).await?;
    let uploaded = orders.iter().find(|o| o.id == order_id).unwrap();
    assert_eq!(uploaded.status, OrderStatus::New);
    assert!(service.orders(bob).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn duplicate_registration_is_refused() -> anyhow::Result<()> {
    let Some(service) = test_service().await? else {
        return Ok(());
    };

    let login = unique_login("core-dup");
    service.register_user(&login, "hash-1").await?;

    let second = service.register_user(&login, "hash-2").await;
    assert!(matches!(second, Err(ServiceError::LoginTaken)));

    // The original registration is untouched.
    let user = service.user_by_login(&login).await?;
    assert_eq!(user.password_hash, "hash-1");

    Ok(())
}

#[tokio::test]
async fn lookups_for_unknown_users_are_not_found() -> anyhow::Result<()> {
    let Some(service) = test_service().await? else {
        return Ok(());
    };

    let missing = service.user_by_login(&unique_login("core-missing")).await;
    assert!(matches!(missing, Err(ServiceError::NotFound)));

    Ok(())
}
