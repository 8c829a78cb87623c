use rust_decimal::Decimal;
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::interface::query::PaymentQuery;
use kernel::interface::update::PaymentModifier;
use kernel::prelude::entity::{
    Payment, PaymentId, PaymentMethod, PaymentStatus, RentalId, TransactionId, UserId,
};
use kernel::KernelError;

use crate::database::PostgresTransaction;
use crate::error::{ConvertError, DriverError};

pub struct PostgresPaymentRepository;

#[async_trait::async_trait]
impl PaymentQuery<PostgresTransaction> for PostgresPaymentRepository {
    async fn find_by_transaction_id(
        &self,
        con: &mut PostgresTransaction,
        transaction_id: &TransactionId,
    ) -> error_stack::Result<Option<Payment>, KernelError> {
        PgPaymentInternal::find_by_transaction_id(con, transaction_id)
            .await
            .convert_error()
    }

    async fn find_by_rental_id(
        &self,
        con: &mut PostgresTransaction,
        rental_id: &RentalId,
    ) -> error_stack::Result<Vec<Payment>, KernelError> {
        PgPaymentInternal::find_by_rental_id(con, rental_id)
            .await
            .convert_error()
    }
}

#[async_trait::async_trait]
impl PaymentModifier<PostgresTransaction> for PostgresPaymentRepository {
    async fn create(
        &self,
        con: &mut PostgresTransaction,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError> {
        PgPaymentInternal::create(con, payment).await.convert_error()
    }

    async fn update(
        &self,
        con: &mut PostgresTransaction,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError> {
        PgPaymentInternal::update(con, payment).await.convert_error()
    }

    async fn delete_failed_by_rental(
        &self,
        con: &mut PostgresTransaction,
        rental_id: &RentalId,
    ) -> error_stack::Result<(), KernelError> {
        PgPaymentInternal::delete_failed_by_rental(con, rental_id)
            .await
            .convert_error()
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    rental_id: Uuid,
    payer: String,
    amount: Decimal,
    method: String,
    transaction_id: String,
    status: String,
    gateway_response: serde_json::Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DriverError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let method: PaymentMethod = row
            .method
            .parse()
            .map_err(|_| DriverError::Decode(format!("payment method {:?}", row.method)))?;
        let status: PaymentStatus = row
            .status
            .parse()
            .map_err(|_| DriverError::Decode(format!("payment status {:?}", row.status)))?;
        Ok(Payment::new(
            PaymentId::new(row.id),
            RentalId::new(row.rental_id),
            UserId::new(row.payer),
            row.amount,
            method,
            TransactionId::new(row.transaction_id),
            status,
            row.gateway_response,
            row.created_at,
            row.updated_at,
        ))
    }
}

const PAYMENT_COLUMNS: &str = r#"
    id,
    rental_id,
    payer,
    amount,
    method,
    transaction_id,
    status,
    gateway_response,
    created_at,
    updated_at
"#;

pub(in crate::database) struct PgPaymentInternal;

impl PgPaymentInternal {
    async fn find_by_transaction_id(
        con: &mut PgConnection,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, DriverError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            // language=postgresql
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE transaction_id = $1
            "#,
        ))
        .bind(transaction_id.as_ref())
        .fetch_optional(con)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_by_rental_id(
        con: &mut PgConnection,
        rental_id: &RentalId,
    ) -> Result<Vec<Payment>, DriverError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            // language=postgresql
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE rental_id = $1
            ORDER BY created_at DESC
            "#,
        ))
        .bind(rental_id.as_ref())
        .fetch_all(con)
        .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn create(con: &mut PgConnection, payment: &Payment) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            INSERT INTO payments (
                id, rental_id, payer, amount, method, transaction_id,
                status, gateway_response, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id().as_ref())
        .bind(payment.rental_id().as_ref())
        .bind(payment.payer().as_ref())
        .bind(payment.amount())
        .bind(payment.method().as_str())
        .bind(payment.transaction_id().as_ref())
        .bind(payment.status().as_str())
        .bind(payment.gateway_response())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(con)
        .await?;
        Ok(())
    }

    async fn update(con: &mut PgConnection, payment: &Payment) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            UPDATE payments
            SET status = $2,
                gateway_response = $3,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment.id().as_ref())
        .bind(payment.status().as_str())
        .bind(payment.gateway_response())
        .bind(payment.updated_at())
        .execute(con)
        .await?;
        Ok(())
    }

    async fn delete_failed_by_rental(
        con: &mut PgConnection,
        rental_id: &RentalId,
    ) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            DELETE FROM payments
            WHERE rental_id = $1 AND status = 'failed'
            "#,
        )
        .bind(rental_id.as_ref())
        .execute(con)
        .await?;
        Ok(())
    }
}
