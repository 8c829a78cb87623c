use deadpool_redis::redis::AsyncCommands;
use error_stack::{Report, ResultExt};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::interface::mirror::{LockMirror, LockState};
use kernel::prelude::entity::CycleId;
use kernel::KernelError;

use crate::database::RedisDatabase;
use crate::error::ConvertError;

/// Key layout: one hash per cycle plus an index set so `clear` can drop
/// the whole mirror without a blocking scan.
fn record_key(id: &CycleId) -> String {
    format!("cycle:lock:{id}")
}

static INDEX_KEY: &str = "cycle:lock:index";

/// The hardware-facing lock mirror. Everything here is disposable state;
/// the rebuild path in the sync component is the source of truth recovery.
pub struct RedisLockMirror {
    db: RedisDatabase,
}

impl RedisLockMirror {
    pub fn new(db: RedisDatabase) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl LockMirror for RedisLockMirror {
    async fn set_locked(
        &self,
        id: &CycleId,
        locked: bool,
        at: OffsetDateTime,
    ) -> error_stack::Result<(), KernelError> {
        let updated_at = at
            .format(&Rfc3339)
            .change_context_lazy(|| KernelError::Internal)?;
        let flag = if locked { "1" } else { "0" };
        let mut con = self.db.connection().await?;
        con.hset_multiple::<_, _, _, ()>(
            record_key(id),
            &[("locked", flag.to_string()), ("updated_at", updated_at)],
        )
        .await
        .convert_error()?;
        con.sadd::<_, _, ()>(INDEX_KEY, id.to_string())
            .await
            .convert_error()?;
        Ok(())
    }

    async fn get(&self, id: &CycleId) -> error_stack::Result<Option<LockState>, KernelError> {
        let mut con = self.db.connection().await?;
        let fields: (Option<String>, Option<String>) = con
            .hget(record_key(id), &["locked", "updated_at"])
            .await
            .convert_error()?;
        let (Some(locked), Some(updated_at)) = fields else {
            return Ok(None);
        };
        let updated_at = OffsetDateTime::parse(&updated_at, &Rfc3339)
            .change_context_lazy(|| KernelError::Internal)
            .attach_printable_lazy(|| format!("mirror timestamp for {id}"))?;
        Ok(Some(LockState {
            locked: locked == "1",
            updated_at,
        }))
    }

    async fn clear(&self) -> error_stack::Result<(), KernelError> {
        let mut con = self.db.connection().await?;
        let ids: Vec<String> = con.smembers(INDEX_KEY).await.convert_error()?;
        for id in &ids {
            let id: Uuid = id
                .parse()
                .map_err(|_| Report::new(KernelError::Internal))
                .attach_printable_lazy(|| format!("mirror index entry {id:?}"))?;
            con.del::<_, ()>(record_key(&CycleId::new(id)))
                .await
                .convert_error()?;
        }
        con.del::<_, ()>(INDEX_KEY).await.convert_error()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use kernel::interface::mirror::LockMirror;
    use kernel::prelude::entity::CycleId;
    use kernel::KernelError;

    use crate::database::{RedisDatabase, RedisLockMirror};

    #[test_with::env(REDIS_TEST)]
    #[tokio::test]
    async fn set_get_clear_roundtrip() -> error_stack::Result<(), KernelError> {
        let mirror = RedisLockMirror::new(RedisDatabase::new()?);
        let id = CycleId::new(Uuid::new_v4());

        mirror
            .set_locked(&id, true, OffsetDateTime::now_utc())
            .await?;
        let state = mirror.get(&id).await?;
        assert!(state.is_some_and(|state| state.locked));

        mirror
            .set_locked(&id, false, OffsetDateTime::now_utc())
            .await?;
        let state = mirror.get(&id).await?;
        assert!(state.is_some_and(|state| !state.locked));

        mirror.clear().await?;
        assert!(mirror.get(&id).await?.is_none());
        Ok(())
    }
}
