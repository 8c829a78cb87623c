use serde::Deserialize;
use sqlx::postgres::PgListener;
use uuid::Uuid;

use kernel::interface::mirror::{ChangeFeed, ChangeSubscription, CycleLockChange};
use kernel::prelude::entity::CycleId;
use kernel::KernelError;

use crate::database::PostgresDatabase;
use crate::error::ConvertError;

/// NOTIFY channel fed by the `cycles_lock_notify` trigger whenever a row's
/// `is_rented` flips. Payloads fire on commit, so a subscriber never sees
/// a claim that later rolled back.
static CYCLE_LOCK_CHANNEL: &str = "cycle_lock";

pub struct PgChangeFeed {
    db: PostgresDatabase,
}

impl PgChangeFeed {
    pub fn new(db: PostgresDatabase) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ChangeFeed for PgChangeFeed {
    type Subscription = PgChangeSubscription;

    async fn subscribe(&self) -> error_stack::Result<Self::Subscription, KernelError> {
        let mut listener = PgListener::connect_with(self.db.pool())
            .await
            .convert_error()?;
        listener.listen(CYCLE_LOCK_CHANNEL).await.convert_error()?;
        Ok(PgChangeSubscription { listener })
    }
}

#[derive(Debug, Deserialize)]
struct LockPayload {
    cycle_id: Uuid,
    is_rented: bool,
}

pub struct PgChangeSubscription {
    listener: PgListener,
}

#[async_trait::async_trait]
impl ChangeSubscription for PgChangeSubscription {
    async fn next_change(&mut self) -> error_stack::Result<CycleLockChange, KernelError> {
        let notification = self.listener.recv().await.convert_error()?;
        let payload: LockPayload =
            serde_json::from_str(notification.payload()).convert_error()?;
        Ok(CycleLockChange {
            cycle_id: CycleId::new(payload.cycle_id),
            is_rented: payload.is_rented,
        })
    }
}
