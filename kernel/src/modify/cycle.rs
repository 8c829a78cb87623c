use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::database::Transaction;
use crate::entity::{Cycle, CycleId, UserId};
use crate::KernelError;

#[async_trait::async_trait]
pub trait CycleModifier<Connection: Transaction>: 'static + Sync + Send {
    async fn create(
        &self,
        con: &mut Connection,
        cycle: &Cycle,
    ) -> error_stack::Result<(), KernelError>;

    /// The atomic check-and-claim: set `is_rented`, record the renter,
    /// guarded by `is_active AND NOT is_rented`, all in one conditional
    /// update. Returns the pre-claim snapshot when the predicate matched,
    /// `None` when the cycle was concurrently claimed, deactivated or
    /// deleted; the caller re-reads fresh state to produce an accurate
    /// diagnostic.
    async fn claim(
        &self,
        con: &mut Connection,
        id: &CycleId,
        renter: &UserId,
        at: OffsetDateTime,
    ) -> error_stack::Result<Option<Cycle>, KernelError>;

    /// Unconditional release. Idempotent on purpose: repair tooling or the
    /// sweep may already have touched the row, and releasing twice must
    /// not fail.
    async fn release(
        &self,
        con: &mut Connection,
        id: &CycleId,
    ) -> error_stack::Result<(), KernelError>;

    /// Owner-facing bookkeeping recorded at completion.
    async fn record_completion(
        &self,
        con: &mut Connection,
        id: &CycleId,
        earnings: Decimal,
    ) -> error_stack::Result<(), KernelError>;
}

pub trait DependOnCycleModifier<Connection: Transaction>: 'static + Sync + Send {
    type CycleModifier: CycleModifier<Connection>;
    fn cycle_modifier(&self) -> &Self::CycleModifier;
}
