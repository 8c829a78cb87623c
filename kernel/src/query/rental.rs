use time::OffsetDateTime;

use crate::database::Transaction;
use crate::entity::{CycleId, Rental, RentalId, UserId};
use crate::KernelError;

#[async_trait::async_trait]
pub trait RentalQuery<Connection: Transaction>: 'static + Sync + Send {
    async fn find_by_id(
        &self,
        con: &mut Connection,
        id: &RentalId,
    ) -> error_stack::Result<Option<Rental>, KernelError>;

    async fn find_active_by_renter(
        &self,
        con: &mut Connection,
        renter: &UserId,
    ) -> error_stack::Result<Option<Rental>, KernelError>;

    async fn find_active_by_cycle(
        &self,
        con: &mut Connection,
        cycle_id: &CycleId,
    ) -> error_stack::Result<Option<Rental>, KernelError>;

    /// Renter history, newest first.
    async fn find_by_renter(
        &self,
        con: &mut Connection,
        renter: &UserId,
    ) -> error_stack::Result<Vec<Rental>, KernelError>;

    /// Completed rentals whose payment is still pending and whose last
    /// update is older than `threshold`. Timeout-sweep input.
    async fn find_payment_overdue(
        &self,
        con: &mut Connection,
        threshold: OffsetDateTime,
    ) -> error_stack::Result<Vec<Rental>, KernelError>;
}

pub trait DependOnRentalQuery<Connection: Transaction>: 'static + Sync + Send {
    type RentalQuery: RentalQuery<Connection>;
    fn rental_query(&self) -> &Self::RentalQuery;
}
