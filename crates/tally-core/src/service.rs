use sqlx::PgPool;
use tracing::debug;

use tally_db::{store, Order, StoreError, User, Withdrawal};

use crate::ServiceError;

/// Domain service shared by the HTTP handlers.
///
/// Cloning is cheap; the only state is the pool handle.
#[derive(Debug, Clone)]
pub struct Service {
    pool: PgPool,
}

impl Service {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        tally_db::ping(&self.pool).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Register a new user.  The password arrives pre-hashed; this layer only
    /// decides whether the login is free.
    pub async fn register_user(
        &self,
        login: &str,
        password_hash: &str,
    ) -> Result<i64, ServiceError> {
        let mut tx = self.pool.begin().await?;

        match store::user_by_login(&mut tx, login).await {
            Ok(_) => {
                tx.rollback().await?;
                Err(ServiceError::LoginTaken)
            }
            Err(StoreError::NotFound) => {
                let id = store::create_user(&mut tx, login, password_hash).await?;
                tx.commit().await?;
                debug!(user_id = id, "registered user");
                Ok(id)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn user_by_login(&self, login: &str) -> Result<User, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let user = store::user_by_login(&mut tx, login).await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn user_by_id(&self, id: i64) -> Result<User, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let user = store::user_by_id(&mut tx, id, false).await?;
        tx.commit().await?;
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Record an uploaded order number, disambiguating repeats.
    ///
    /// The number is Luhn-checked at the API edge before this is called.
    pub async fn create_order(&self, user_id: i64, order_id: i64) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        match store::order_by_id(&mut tx, order_id, false).await {
            Err(StoreError::NotFound) => {
                store::create_order(&mut tx, user_id, order_id).await?;
                tx.commit().await?;
                Ok(())
            }
            Ok(existing) if existing.user_id == user_id => {
                tx.rollback().await?;
                Err(ServiceError::OrderAlreadyUploaded)
            }
            Ok(_) => {
                tx.rollback().await?;
                Err(ServiceError::OrderOwnedByAnotherUser)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn orders(&self, user_id: i64) -> Result<Vec<Order>, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let orders = store::orders_by_user(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    // -----------------------------------------------------------------------
    // Withdrawals
    // -----------------------------------------------------------------------

    /// Spend points.  The user row is read under FOR UPDATE so the funds
    /// check and the two writes are serialised against concurrent withdrawals
    /// and against the accrual applier crediting the same user.
    pub async fn withdraw(
        &self,
        user_id: i64,
        order_id: i64,
        sum: f64,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let user = store::user_by_id(&mut tx, user_id, true).await?;
        if user.balance < sum {
            tx.rollback().await?;
            return Err(ServiceError::InsufficientFunds);
        }

        store::update_user_balance(&mut tx, user.id, user.balance - sum, user.withdrawn + sum)
            .await?;
        store::create_withdrawal(&mut tx, user_id, order_id, sum).await?;
        tx.commit().await?;

        debug!(user_id, order_id, sum, "withdrawal committed");
        Ok(())
    }

    pub async fn withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let withdrawals = store::withdrawals_by_user(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(withdrawals)
    }
}
