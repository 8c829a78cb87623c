use std::marker::PhantomData;
use std::sync::Mutex;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use kernel::interface::config::SyncConfig;
use kernel::interface::database::{DatabaseConnection, DependOnDatabaseConnection, Transaction};
use kernel::interface::mirror::{
    ChangeFeed, ChangeSubscription, CycleLockChange, DependOnChangeFeed, DependOnLockMirror,
    LockMirror,
};
use kernel::interface::query::{CycleQuery, DependOnCycleQuery};
use kernel::KernelError;

/// Mirror maintenance operations. The mirror is a disposable cache: resync
/// clears it and rebuilds from the availability store, and a single record
/// failing to write is logged, not fatal.
#[async_trait::async_trait]
pub trait MirrorSyncService<Connection: Transaction>:
    'static
    + Sync
    + Send
    + DependOnDatabaseConnection<Connection>
    + DependOnCycleQuery<Connection>
    + DependOnLockMirror
{
    /// Full rebuild. Run on every (re)start of the sync loop because the
    /// mirror carries no durability guarantee and incremental catch-up
    /// cannot prove it missed nothing.
    async fn resync(&self) -> error_stack::Result<usize, KernelError> {
        let mut con = self.database_connection().transact().await?;
        let cycles = self.cycle_query().find_all(&mut con).await?;
        con.commit().await?;

        self.lock_mirror().clear().await?;

        let now = OffsetDateTime::now_utc();
        let mut synced = 0;
        for cycle in &cycles {
            match self
                .lock_mirror()
                .set_locked(cycle.id(), cycle.is_rented(), now)
                .await
            {
                Ok(()) => synced += 1,
                Err(report) => warn!("mirror write for {} skipped: {report:?}", cycle.id()),
            }
        }
        Ok(synced)
    }

    async fn apply_change(&self, change: &CycleLockChange) -> error_stack::Result<(), KernelError> {
        self.lock_mirror()
            .set_locked(
                &change.cycle_id,
                change.is_rented,
                OffsetDateTime::now_utc(),
            )
            .await
    }
}

impl<Connection: Transaction, T> MirrorSyncService<Connection> for T where
    T: DependOnDatabaseConnection<Connection> + DependOnCycleQuery<Connection> + DependOnLockMirror
{
}

/// Owned background component: resync, subscribe, push transitions, and on
/// any feed failure back off, resubscribe and resync again. Propagation
/// lag is acceptable; propagation loss is not.
pub struct MirrorSync<M, Connection> {
    module: M,
    config: SyncConfig,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    _connection: PhantomData<fn() -> Connection>,
}

impl<M, Connection> MirrorSync<M, Connection>
where
    Connection: Transaction,
    M: MirrorSyncService<Connection> + DependOnChangeFeed + Clone,
{
    pub fn new(module: M, config: SyncConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            module,
            config,
            shutdown,
            handle: Mutex::new(None),
            _connection: PhantomData,
        }
    }

    pub fn start(&self) {
        let module = self.module.clone();
        let config = self.config.clone();
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                match module.resync().await {
                    Ok(synced) => info!(synced, "mirror rebuilt from availability store"),
                    Err(report) => {
                        error!("mirror resync failed: {report:?}");
                        sleep(config.reconnect_delay()).await;
                        continue;
                    }
                }

                let mut subscription = match module.change_feed().subscribe().await {
                    Ok(subscription) => subscription,
                    Err(report) => {
                        error!("change feed subscription failed: {report:?}");
                        sleep(config.reconnect_delay()).await;
                        continue;
                    }
                };
                info!("availability change feed connected");

                let disconnected = loop {
                    tokio::select! {
                        _ = shutdown.changed() => break false,
                        change = subscription.next_change() => match change {
                            Ok(change) => {
                                if let Err(report) = module.apply_change(&change).await {
                                    warn!(
                                        "mirror update for {} dropped: {report:?}",
                                        change.cycle_id,
                                    );
                                }
                            }
                            Err(report) => {
                                error!("change feed disconnected: {report:?}");
                                break true;
                            }
                        },
                    }
                };

                if !disconnected {
                    break;
                }
                sleep(config.reconnect_delay()).await;
            }
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(join) = handle.await {
                error!("mirror sync task did not shut down cleanly: {join}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration as StdDuration;

    use rust_decimal::Decimal;
    use uuid::Uuid;

    use kernel::interface::config::SyncConfig;
    use kernel::interface::mirror::CycleLockChange;
    use kernel::prelude::entity::CycleId;

    use crate::mock::{MockConnection, MockModule};
    use crate::service::{MirrorSync, MirrorSyncService};

    #[tokio::test]
    async fn resync_clears_and_rebuilds_the_mirror() {
        let module = MockModule::new();
        let free = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rented = module.seed_cycle("owner", Decimal::new(10, 0), true, true);
        // Stale record for a cycle that no longer exists.
        module.pollute_mirror(Uuid::new_v4());

        let synced = module.resync().await.unwrap();
        assert_eq!(synced, 2);
        assert_eq!(module.mirror_len(), 2);
        assert_eq!(module.mirror_locked(free), Some(false));
        assert_eq!(module.mirror_locked(rented), Some(true));
    }

    #[tokio::test]
    async fn apply_change_updates_a_single_record() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        module.resync().await.unwrap();

        module
            .apply_change(&CycleLockChange {
                cycle_id: CycleId::new(cycle_id),
                is_rented: true,
            })
            .await
            .unwrap();
        assert_eq!(module.mirror_locked(cycle_id), Some(true));
    }

    #[tokio::test]
    async fn component_pushes_feed_changes_into_the_mirror() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);

        let sync: MirrorSync<MockModule, MockConnection> = MirrorSync::new(
            module.clone(),
            SyncConfig::new(StdDuration::from_millis(10)),
        );
        sync.start();

        // Give the task time to resync and subscribe, then feed it a
        // transition.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(module.mirror_locked(cycle_id), Some(false));

        module.push_change(CycleLockChange {
            cycle_id: CycleId::new(cycle_id),
            is_rented: true,
        });
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(module.mirror_locked(cycle_id), Some(true));

        sync.stop().await;
    }
}
