use crate::database::Transaction;
use crate::entity::{Payment, RentalId, TransactionId};
use crate::KernelError;

#[async_trait::async_trait]
pub trait PaymentQuery<Connection: Transaction>: 'static + Sync + Send {
    /// Callbacks only carry the gateway's reference, so this is the
    /// primary lookup path for settlement.
    async fn find_by_transaction_id(
        &self,
        con: &mut Connection,
        transaction_id: &TransactionId,
    ) -> error_stack::Result<Option<Payment>, KernelError>;

    async fn find_by_rental_id(
        &self,
        con: &mut Connection,
        rental_id: &RentalId,
    ) -> error_stack::Result<Vec<Payment>, KernelError>;
}

pub trait DependOnPaymentQuery<Connection: Transaction>: 'static + Sync + Send {
    type PaymentQuery: PaymentQuery<Connection>;
    fn payment_query(&self) -> &Self::PaymentQuery;
}
