use crate::database::Transaction;
use crate::entity::{Payment, RentalId};
use crate::KernelError;

#[async_trait::async_trait]
pub trait PaymentModifier<Connection: Transaction>: 'static + Sync + Send {
    async fn create(
        &self,
        con: &mut Connection,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError>;

    async fn update(
        &self,
        con: &mut Connection,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError>;

    /// Clears failed attempts so a retried settlement starts clean.
    async fn delete_failed_by_rental(
        &self,
        con: &mut Connection,
        rental_id: &RentalId,
    ) -> error_stack::Result<(), KernelError>;
}

pub trait DependOnPaymentModifier<Connection: Transaction>: 'static + Sync + Send {
    type PaymentModifier: PaymentModifier<Connection>;
    fn payment_modifier(&self) -> &Self::PaymentModifier;
}
