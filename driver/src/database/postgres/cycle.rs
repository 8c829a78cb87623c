use rust_decimal::Decimal;
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::interface::query::{CycleFilter, CycleQuery};
use kernel::interface::update::CycleModifier;
use kernel::prelude::entity::{Cycle, CycleId, GeoPoint, UserId};
use kernel::KernelError;

use crate::database::PostgresTransaction;
use crate::error::{ConvertError, DriverError};

pub struct PostgresCycleRepository;

#[async_trait::async_trait]
impl CycleQuery<PostgresTransaction> for PostgresCycleRepository {
    async fn find_by_id(
        &self,
        con: &mut PostgresTransaction,
        id: &CycleId,
    ) -> error_stack::Result<Option<Cycle>, KernelError> {
        PgCycleInternal::find_by_id(con, id).await.convert_error()
    }

    async fn find_available(
        &self,
        con: &mut PostgresTransaction,
        filter: &CycleFilter,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        PgCycleInternal::find_available(con, filter)
            .await
            .convert_error()
    }

    async fn find_by_owner(
        &self,
        con: &mut PostgresTransaction,
        owner: &UserId,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        PgCycleInternal::find_by_owner(con, owner)
            .await
            .convert_error()
    }

    async fn find_all(
        &self,
        con: &mut PostgresTransaction,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        PgCycleInternal::find_all(con).await.convert_error()
    }

    async fn find_orphaned_rented(
        &self,
        con: &mut PostgresTransaction,
    ) -> error_stack::Result<Vec<CycleId>, KernelError> {
        PgCycleInternal::find_orphaned_rented(con)
            .await
            .convert_error()
    }
}

#[async_trait::async_trait]
impl CycleModifier<PostgresTransaction> for PostgresCycleRepository {
    async fn create(
        &self,
        con: &mut PostgresTransaction,
        cycle: &Cycle,
    ) -> error_stack::Result<(), KernelError> {
        PgCycleInternal::create(con, cycle).await.convert_error()
    }

    async fn claim(
        &self,
        con: &mut PostgresTransaction,
        id: &CycleId,
        renter: &UserId,
        at: OffsetDateTime,
    ) -> error_stack::Result<Option<Cycle>, KernelError> {
        PgCycleInternal::claim(con, id, renter, at)
            .await
            .convert_error()
    }

    async fn release(
        &self,
        con: &mut PostgresTransaction,
        id: &CycleId,
    ) -> error_stack::Result<(), KernelError> {
        PgCycleInternal::release(con, id).await.convert_error()
    }

    async fn record_completion(
        &self,
        con: &mut PostgresTransaction,
        id: &CycleId,
        earnings: Decimal,
    ) -> error_stack::Result<(), KernelError> {
        PgCycleInternal::record_completion(con, id, earnings)
            .await
            .convert_error()
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: Uuid,
    owner_id: String,
    brand: String,
    model: String,
    description: Option<String>,
    condition: Option<String>,
    hourly_rate: Decimal,
    is_active: bool,
    is_rented: bool,
    current_renter: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    total_rentals: i64,
    total_earnings: Decimal,
    last_rented_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<CycleRow> for Cycle {
    fn from(row: CycleRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        };
        Cycle::new(
            CycleId::new(row.id),
            UserId::new(row.owner_id),
            row.brand,
            row.model,
            row.description,
            row.condition,
            row.hourly_rate,
            row.is_active,
            row.is_rented,
            row.current_renter.map(UserId::new),
            location,
            row.total_rentals,
            row.total_earnings,
            row.last_rented_at,
            row.created_at,
        )
    }
}

const CYCLE_COLUMNS: &str = r#"
    id,
    owner_id,
    brand,
    model,
    description,
    condition,
    hourly_rate,
    is_active,
    is_rented,
    current_renter,
    latitude,
    longitude,
    total_rentals,
    total_earnings,
    last_rented_at,
    created_at
"#;

pub(in crate::database) struct PgCycleInternal;

impl PgCycleInternal {
    async fn find_by_id(
        con: &mut PgConnection,
        id: &CycleId,
    ) -> Result<Option<Cycle>, DriverError> {
        let row = sqlx::query_as::<_, CycleRow>(&format!(
            // language=postgresql
            r#"
            SELECT {CYCLE_COLUMNS}
            FROM cycles
            WHERE id = $1
            "#,
        ))
        .bind(id.as_ref())
        .fetch_optional(con)
        .await?;
        Ok(row.map(Cycle::from))
    }

    async fn find_available(
        con: &mut PgConnection,
        filter: &CycleFilter,
    ) -> Result<Vec<Cycle>, DriverError> {
        let (latitude, longitude, radius_km) = match &filter.near {
            Some(circle) => (
                Some(circle.center.latitude()),
                Some(circle.center.longitude()),
                Some(circle.radius_km),
            ),
            None => (None, None, None),
        };
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            // language=postgresql
            r#"
            SELECT {CYCLE_COLUMNS}
            FROM cycles
            WHERE is_active
              AND NOT is_rented
              AND ($1::numeric IS NULL OR hourly_rate >= $1)
              AND ($2::numeric IS NULL OR hourly_rate <= $2)
              AND ($3::double precision IS NULL OR (
                    latitude IS NOT NULL
                AND longitude IS NOT NULL
                AND 2 * 6371 * asin(sqrt(
                        power(sin(radians(latitude - $3) / 2), 2)
                      + cos(radians($3)) * cos(radians(latitude))
                      * power(sin(radians(longitude - $4) / 2), 2)
                    )) <= $5
              ))
            ORDER BY created_at DESC
            "#,
        ))
        .bind(filter.min_hourly_rate)
        .bind(filter.max_hourly_rate)
        .bind(latitude)
        .bind(longitude)
        .bind(radius_km)
        .fetch_all(con)
        .await?;
        Ok(rows.into_iter().map(Cycle::from).collect())
    }

    async fn find_by_owner(
        con: &mut PgConnection,
        owner: &UserId,
    ) -> Result<Vec<Cycle>, DriverError> {
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            // language=postgresql
            r#"
            SELECT {CYCLE_COLUMNS}
            FROM cycles
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        ))
        .bind(owner.as_ref())
        .fetch_all(con)
        .await?;
        Ok(rows.into_iter().map(Cycle::from).collect())
    }

    async fn find_all(con: &mut PgConnection) -> Result<Vec<Cycle>, DriverError> {
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            // language=postgresql
            r#"
            SELECT {CYCLE_COLUMNS}
            FROM cycles
            "#,
        ))
        .fetch_all(con)
        .await?;
        Ok(rows.into_iter().map(Cycle::from).collect())
    }

    async fn find_orphaned_rented(con: &mut PgConnection) -> Result<Vec<CycleId>, DriverError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            // language=postgresql
            r#"
            SELECT c.id
            FROM cycles c
            WHERE c.is_rented
              AND NOT EXISTS (
                    SELECT 1
                    FROM rentals r
                    WHERE r.cycle_id = c.id AND r.status = 'active'
              )
            "#,
        )
        .fetch_all(con)
        .await?;
        Ok(rows.into_iter().map(|(id,)| CycleId::new(id)).collect())
    }

    async fn create(con: &mut PgConnection, cycle: &Cycle) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            INSERT INTO cycles (
                id, owner_id, brand, model, description, condition,
                hourly_rate, is_active, is_rented, current_renter,
                latitude, longitude, total_rentals, total_earnings,
                last_rented_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(cycle.id().as_ref())
        .bind(cycle.owner().as_ref())
        .bind(cycle.brand())
        .bind(cycle.model())
        .bind(cycle.description())
        .bind(cycle.condition())
        .bind(cycle.hourly_rate())
        .bind(cycle.is_active())
        .bind(cycle.is_rented())
        .bind(cycle.current_renter().map(AsRef::as_ref))
        .bind(cycle.location().map(GeoPoint::latitude))
        .bind(cycle.location().map(GeoPoint::longitude))
        .bind(cycle.total_rentals())
        .bind(cycle.total_earnings())
        .bind(cycle.last_rented_at())
        .bind(cycle.created_at())
        .execute(con)
        .await?;
        Ok(())
    }

    /// The one write that serializes competing renters. The data-modifying
    /// CTE updates under `is_active AND NOT is_rented`; the outer select
    /// still sees the statement's starting snapshot, so a matched claim
    /// hands back the pre-claim row.
    async fn claim(
        con: &mut PgConnection,
        id: &CycleId,
        renter: &UserId,
        at: OffsetDateTime,
    ) -> Result<Option<Cycle>, DriverError> {
        let row = sqlx::query_as::<_, CycleRow>(&format!(
            // language=postgresql
            r#"
            WITH claimed AS (
                UPDATE cycles
                SET is_rented = TRUE,
                    current_renter = $2,
                    last_rented_at = $3
                WHERE id = $1
                  AND is_active
                  AND NOT is_rented
                RETURNING id
            )
            SELECT {CYCLE_COLUMNS}
            FROM cycles
            WHERE id IN (SELECT id FROM claimed)
            "#,
        ))
        .bind(id.as_ref())
        .bind(renter.as_ref())
        .bind(at)
        .fetch_optional(con)
        .await?;
        Ok(row.map(Cycle::from))
    }

    async fn release(con: &mut PgConnection, id: &CycleId) -> Result<(), DriverError> {
        // No guard on the current flag: release is idempotent and must
        // succeed even when repair tooling already reset the row.
        sqlx::query(
            // language=postgresql
            r#"
            UPDATE cycles
            SET is_rented = FALSE,
                current_renter = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_ref())
        .execute(con)
        .await?;
        Ok(())
    }

    async fn record_completion(
        con: &mut PgConnection,
        id: &CycleId,
        earnings: Decimal,
    ) -> Result<(), DriverError> {
        sqlx::query(
            // language=postgresql
            r#"
            UPDATE cycles
            SET total_rentals = total_rentals + 1,
                total_earnings = total_earnings + $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_ref())
        .bind(earnings)
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
    use kernel::interface::query::CycleQuery;
    use kernel::interface::update::CycleModifier;
    use kernel::prelude::entity::{Cycle, CycleId, UserId};
    use kernel::KernelError;

    use crate::database::{PostgresCycleRepository, PostgresDatabase};

    fn fresh_cycle(owner: &str) -> Cycle {
        Cycle::new(
            CycleId::new(Uuid::new_v4()),
            UserId::new(owner),
            "Hero".into(),
            "Sprint Pro".into(),
            Some("commuter bike".into()),
            Some("good".into()),
            Decimal::new(10, 0),
            true,
            false,
            None,
            None,
            0,
            Decimal::ZERO,
            None,
            OffsetDateTime::now_utc(),
        )
    }

    #[test_with::env(POSTGRES_TEST)]
    #[tokio::test]
    async fn claim_is_single_winner() -> error_stack::Result<(), KernelError> {
        let db = PostgresDatabase::new().await?;
        let mut con = db.transact().await?;

        let cycle = fresh_cycle("owner-1");
        PostgresCycleRepository.create(&mut con, &cycle).await?;

        let renter = UserId::new("renter-1");
        let at = OffsetDateTime::now_utc();

        let first = PostgresCycleRepository
            .claim(&mut con, cycle.id(), &renter, at)
            .await?;
        assert!(first.is_some_and(|snapshot| !snapshot.is_rented()));

        let second = PostgresCycleRepository
            .claim(&mut con, cycle.id(), &renter, at)
            .await?;
        assert!(second.is_none());

        PostgresCycleRepository.release(&mut con, cycle.id()).await?;
        let reread = PostgresCycleRepository
            .find_by_id(&mut con, cycle.id())
            .await?;
        assert!(reread.is_some_and(|cycle| !cycle.is_rented()));

        con.roll_back().await?;
        Ok(())
    }
}
