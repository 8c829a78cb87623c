use rust_decimal::Decimal;

use crate::database::Transaction;
use crate::entity::{Cycle, CycleId, GeoPoint, UserId};
use crate::KernelError;

/// Availability-listing filters. All optional; `near` is an approximate
/// bounding-circle predicate, not a spatial index.
#[derive(Debug, Clone, Default)]
pub struct CycleFilter {
    pub near: Option<CircleFilter>,
    pub min_hourly_rate: Option<Decimal>,
    pub max_hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Copy)]
pub struct CircleFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

#[async_trait::async_trait]
pub trait CycleQuery<Connection: Transaction>: 'static + Sync + Send {
    async fn find_by_id(
        &self,
        con: &mut Connection,
        id: &CycleId,
    ) -> error_stack::Result<Option<Cycle>, KernelError>;

    async fn find_available(
        &self,
        con: &mut Connection,
        filter: &CycleFilter,
    ) -> error_stack::Result<Vec<Cycle>, KernelError>;

    async fn find_by_owner(
        &self,
        con: &mut Connection,
        owner: &UserId,
    ) -> error_stack::Result<Vec<Cycle>, KernelError>;

    /// Every cycle, rented or not. Mirror rebuilds need the full set.
    async fn find_all(
        &self,
        con: &mut Connection,
    ) -> error_stack::Result<Vec<Cycle>, KernelError>;

    /// Cycles flagged rented with no matching active ledger entry. These
    /// are invariant violations left behind by crashes or manual edits;
    /// the sweep repairs them.
    async fn find_orphaned_rented(
        &self,
        con: &mut Connection,
    ) -> error_stack::Result<Vec<CycleId>, KernelError>;
}

pub trait DependOnCycleQuery<Connection: Transaction>: 'static + Sync + Send {
    type CycleQuery: CycleQuery<Connection>;
    fn cycle_query(&self) -> &Self::CycleQuery;
}
