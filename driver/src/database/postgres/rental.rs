use rust_decimal::Decimal;
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::interface::query::RentalQuery;
use kernel::interface::update::RentalModifier;
use kernel::prelude::entity::{
    CycleId, Rating, Rental, RentalId, RentalPaymentStatus, RentalStatus, UserId,
};
use kernel::KernelError;

use crate::database::PostgresTransaction;
use crate::error::{ConvertError, DriverError};

pub struct PostgresRentalRepository;

#[async_trait::async_trait]
impl RentalQuery<PostgresTransaction> for PostgresRentalRepository {
    async fn find_by_id(
        &self,
        con: &mut PostgresTransaction,
        id: &RentalId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        PgRentalInternal::find_by_id(con, id).await.convert_error()
    }

    async fn find_active_by_renter(
        &self,
        con: &mut PostgresTransaction,
        renter: &UserId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        PgRentalInternal::find_active_by_renter(con, renter)
            .await
            .convert_error()
    }

    async fn find_active_by_cycle(
        &self,
        con: &mut PostgresTransaction,
        cycle_id: &CycleId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        PgRentalInternal::find_active_by_cycle(con, cycle_id)
            .await
            .convert_error()
    }

    async fn find_by_renter(
        &self,
        con: &mut PostgresTransaction,
        renter: &UserId,
    ) -> error_stack::Result<Vec<Rental>, KernelError> {
        PgRentalInternal::find_by_renter(con, renter)
            .await
            .convert_error()
    }

    async fn find_payment_overdue(
        &self,
        con: &mut PostgresTransaction,
        threshold: OffsetDateTime,
    ) -> error_stack::Result<Vec<Rental>, KernelError> {
        PgRentalInternal::find_payment_overdue(con, threshold)
            .await
            .convert_error()
    }
}

#[async_trait::async_trait]
impl RentalModifier<PostgresTransaction> for PostgresRentalRepository {
    async fn create(
        &self,
        con: &mut PostgresTransaction,
        rental: &Rental,
    ) -> error_stack::Result<(), KernelError> {
        PgRentalInternal::create(con, rental).await.convert_error()
    }

    async fn update(
        &self,
        con: &mut PostgresTransaction,
        rental: &Rental,
    ) -> error_stack::Result<(), KernelError> {
        PgRentalInternal::update(con, rental).await.convert_error()
    }
}

#[derive(sqlx::FromRow)]
struct RentalRow {
    id: Uuid,
    cycle_id: Uuid,
    renter: String,
    owner: String,
    hourly_rate: Decimal,
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
    status: String,
    duration_minutes: Option<i64>,
    distance_km: Option<Decimal>,
    total_cost: Decimal,
    payment_status: String,
    rating: Option<i16>,
    review: Option<String>,
}

impl TryFrom<RentalRow> for Rental {
    type Error = DriverError;

    fn try_from(row: RentalRow) -> Result<Self, Self::Error> {
        let status: RentalStatus = row
            .status
            .parse()
            .map_err(|_| DriverError::Decode(format!("rental status {:?}", row.status)))?;
        let payment_status: RentalPaymentStatus = row
            .payment_status
            .parse()
            .map_err(|_| {
                DriverError::Decode(format!("rental payment status {:?}", row.payment_status))
            })?;
        let rating = row
            .rating
            .map(Rating::new)
            .transpose()
            .map_err(|_| DriverError::Decode(format!("rating {:?}", row.rating)))?;
        Ok(Rental::new(
            RentalId::new(row.id),
            CycleId::new(row.cycle_id),
            UserId::new(row.renter),
            UserId::new(row.owner),
            row.hourly_rate,
            row.started_at,
            row.ended_at,
            status,
            row.duration_minutes,
            row.distance_km,
            row.total_cost,
            payment_status,
            rating,
            row.review,
        ))
    }
}

const RENTAL_COLUMNS: &str = r#"
    id,
    cycle_id,
    renter,
    owner,
    hourly_rate,
    started_at,
    ended_at,
    status,
    duration_minutes,
    distance_km,
    total_cost,
    payment_status,
    rating,
    review
"#;

pub(in crate::database) struct PgRentalInternal;

impl PgRentalInternal {
    async fn find_by_id(
        con: &mut PgConnection,
        id: &RentalId,
    ) -> Result<Option<Rental>, DriverError> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            // language=postgresql
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE id = $1
            "#,
        ))
        .bind(id.as_ref())
        .fetch_optional(con)
        .await?;
        row.map(Rental::try_from).transpose()
    }

    async fn find_active_by_renter(
        con: &mut PgConnection,
        renter: &UserId,
    ) -> Result<Option<Rental>, DriverError> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            // language=postgresql
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE renter = $1 AND status = 'active'
            "#,
        ))
        .bind(renter.as_ref())
        .fetch_optional(con)
        .await?;
        row.map(Rental::try_from).transpose()
    }

    async fn find_active_by_cycle(
        con: &mut PgConnection,
        cycle_id: &CycleId,
    ) -> Result<Option<Rental>, DriverError> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            // language=postgresql
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE cycle_id = $1 AND status = 'active'
            "#,
        ))
        .bind(cycle_id.as_ref())
        .fetch_optional(con)
        .await?;
        row.map(Rental::try_from).transpose()
    }

    async fn find_by_renter(
        con: &mut PgConnection,
        renter: &UserId,
    ) -> Result<Vec<Rental>, DriverError> {
        let rows = sqlx::query_as::<_, RentalRow>(&format!(
            // language=postgresql
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE renter = $1
            ORDER BY started_at DESC
            "#,
        ))
        .bind(renter.as_ref())
        .fetch_all(con)
        .await?;
        rows.into_iter().map(Rental::try_from).collect()
    }

    async fn find_payment_overdue(
        con: &mut PgConnection,
        threshold: OffsetDateTime,
    ) -> Result<Vec<Rental>, DriverError> {
        let rows = sqlx::query_as::<_, RentalRow>(&format!(
            // language=postgresql
            r#"
            SELECT {RENTAL_COLUMNS}
            FROM rentals
            WHERE status = 'completed'
              AND payment_status = 'pending'
              AND ended_at < $1
            "#,
        ))
        .bind(threshold)
        .fetch_all(con)
        .await?;
        rows.into_iter().map(Rental::try_from).collect()
    }

    async fn create(con: &mut PgConnection, rental: &Rental) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            INSERT INTO rentals (
                id, cycle_id, renter, owner, hourly_rate, started_at,
                ended_at, status, duration_minutes, distance_km,
                total_cost, payment_status, rating, review
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(rental.id().as_ref())
        .bind(rental.cycle_id().as_ref())
        .bind(rental.renter().as_ref())
        .bind(rental.owner().as_ref())
        .bind(rental.hourly_rate())
        .bind(rental.started_at())
        .bind(rental.ended_at())
        .bind(rental.status().as_str())
        .bind(rental.duration_minutes())
        .bind(rental.distance_km())
        .bind(rental.total_cost())
        .bind(rental.payment_status().as_str())
        .bind(rental.rating().map(i16::from))
        .bind(rental.review())
        .execute(con)
        .await?;
        Ok(())
    }

    async fn update(con: &mut PgConnection, rental: &Rental) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            UPDATE rentals
            SET ended_at = $2,
                status = $3,
                duration_minutes = $4,
                distance_km = $5,
                total_cost = $6,
                payment_status = $7,
                rating = $8,
                review = $9
            WHERE id = $1
            "#,
        )
        .bind(rental.id().as_ref())
        .bind(rental.ended_at())
        .bind(rental.status().as_str())
        .bind(rental.duration_minutes())
        .bind(rental.distance_km())
        .bind(rental.total_cost())
        .bind(rental.payment_status().as_str())
        .bind(rental.rating().map(i16::from))
        .bind(rental.review())
        .execute(con)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use kernel::interface::database::{DatabaseConnection, Transaction};
    use kernel::interface::query::RentalQuery;
    use kernel::interface::update::{CycleModifier, RentalModifier};
    use kernel::prelude::entity::{Cycle, CycleId, Rental, RentalId, UserId};
    use kernel::KernelError;

    use crate::database::{PostgresCycleRepository, PostgresDatabase, PostgresRentalRepository};

    #[test_with::env(POSTGRES_TEST)]
    #[tokio::test]
    async fn rental_roundtrip() -> error_stack::Result<(), KernelError> {
        let db = PostgresDatabase::new().await?;
        let mut con = db.transact().await?;

        let cycle = Cycle::new(
            CycleId::new(Uuid::new_v4()),
            UserId::new("owner-2"),
            "Atlas".into(),
            "Roadster".into(),
            None,
            None,
            Decimal::new(12, 0),
            true,
            false,
            None,
            None,
            0,
            Decimal::ZERO,
            None,
            OffsetDateTime::now_utc(),
        );
        PostgresCycleRepository.create(&mut con, &cycle).await?;

        let renter = UserId::new(format!("renter-{}", Uuid::new_v4()));
        let rental = Rental::start(
            RentalId::new(Uuid::new_v4()),
            *cycle.id(),
            renter.clone(),
            cycle.owner().clone(),
            cycle.hourly_rate(),
            OffsetDateTime::now_utc(),
        );
        PostgresRentalRepository.create(&mut con, &rental).await?;

        let found = PostgresRentalRepository
            .find_active_by_renter(&mut con, &renter)
            .await?;
        assert_eq!(found.as_ref().map(Rental::id), Some(rental.id()));

        con.roll_back().await?;
        Ok(())
    }
}
