use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::CycleId;
use crate::KernelError;

/// One mirror record: the lock flag the physical hardware consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub locked: bool,
    pub updated_at: OffsetDateTime,
}

/// The low-latency secondary store feeding lock hardware. Never
/// authoritative: disposable, rebuilt in full from the availability store
/// whenever sync (re)starts.
#[async_trait::async_trait]
pub trait LockMirror: 'static + Sync + Send {
    async fn set_locked(
        &self,
        id: &CycleId,
        locked: bool,
        at: OffsetDateTime,
    ) -> error_stack::Result<(), KernelError>;

    async fn get(&self, id: &CycleId) -> error_stack::Result<Option<LockState>, KernelError>;

    /// Drops every record ahead of a full rebuild.
    async fn clear(&self) -> error_stack::Result<(), KernelError>;
}

pub trait DependOnLockMirror: 'static + Sync + Send {
    type LockMirror: LockMirror;
    fn lock_mirror(&self) -> &Self::LockMirror;
}

/// One `is_rented` transition observed on the availability store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleLockChange {
    pub cycle_id: CycleId,
    pub is_rented: bool,
}

/// Change-feed subscription over availability transitions. Implementations
/// deliver at-least-once after subscribe; anything missed while
/// unsubscribed is recovered by the full resync, never by catch-up.
#[async_trait::async_trait]
pub trait ChangeFeed: 'static + Sync + Send {
    type Subscription: ChangeSubscription;
    async fn subscribe(&self) -> error_stack::Result<Self::Subscription, KernelError>;
}

#[async_trait::async_trait]
pub trait ChangeSubscription: Send {
    /// Waits for the next transition. An error means the feed is broken
    /// and the subscriber must resubscribe (and resync).
    async fn next_change(&mut self) -> error_stack::Result<CycleLockChange, KernelError>;
}

pub trait DependOnChangeFeed: 'static + Sync + Send {
    type ChangeFeed: ChangeFeed;
    fn change_feed(&self) -> &Self::ChangeFeed;
}
