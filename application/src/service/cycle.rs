use error_stack::Report;

use kernel::interface::database::{DatabaseConnection, DependOnDatabaseConnection, Transaction};
use kernel::interface::query::{CircleFilter, CycleFilter, CycleQuery, DependOnCycleQuery};
use kernel::prelude::entity::{CycleId, GeoPoint, UserId};
use kernel::KernelError;

use crate::transfer::{CycleDto, GetCycleDto, ListAvailableCyclesDto, ListOwnedCyclesDto};

/// Radius applied when a caller sends coordinates without one.
const DEFAULT_RADIUS_KM: f64 = 5.0;

#[async_trait::async_trait]
pub trait GetCycleService<Connection: Transaction>:
    'static + Sync + Send + DependOnDatabaseConnection<Connection> + DependOnCycleQuery<Connection>
{
    async fn get_cycle(&self, dto: GetCycleDto) -> error_stack::Result<CycleDto, KernelError> {
        let cycle_id = CycleId::new(dto.cycle_id);
        let mut con = self.database_connection().transact().await?;
        let cycle = self
            .cycle_query()
            .find_by_id(&mut con, &cycle_id)
            .await?
            .ok_or_else(|| {
                Report::new(KernelError::CycleNotFound).attach_printable(cycle_id.to_string())
            })?;
        con.commit().await?;
        Ok(CycleDto::from(cycle))
    }

    async fn list_available(
        &self,
        dto: ListAvailableCyclesDto,
    ) -> error_stack::Result<Vec<CycleDto>, KernelError> {
        let near = match (dto.latitude, dto.longitude) {
            (Some(latitude), Some(longitude)) => Some(CircleFilter {
                center: GeoPoint::new(latitude, longitude),
                radius_km: dto.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
            }),
            _ => None,
        };
        let filter = CycleFilter {
            near,
            min_hourly_rate: dto.min_hourly_rate,
            max_hourly_rate: dto.max_hourly_rate,
        };

        let mut con = self.database_connection().transact().await?;
        let cycles = self.cycle_query().find_available(&mut con, &filter).await?;
        con.commit().await?;
        Ok(cycles.into_iter().map(CycleDto::from).collect())
    }

    async fn list_owned(
        &self,
        dto: ListOwnedCyclesDto,
    ) -> error_stack::Result<Vec<CycleDto>, KernelError> {
        let owner = UserId::new(dto.owner);
        let mut con = self.database_connection().transact().await?;
        let cycles = self.cycle_query().find_by_owner(&mut con, &owner).await?;
        con.commit().await?;
        Ok(cycles.into_iter().map(CycleDto::from).collect())
    }
}

impl<Connection: Transaction, T> GetCycleService<Connection> for T where
    T: DependOnDatabaseConnection<Connection> + DependOnCycleQuery<Connection>
{
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;

    use crate::mock::MockModule;
    use crate::service::GetCycleService;
    use crate::transfer::ListAvailableCyclesDto;

    #[tokio::test]
    async fn listing_excludes_rented_and_inactive() {
        let module = MockModule::new();
        let available = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        module.seed_cycle("owner", Decimal::new(10, 0), true, true);
        module.seed_cycle("owner", Decimal::new(10, 0), false, false);

        let listed = module
            .list_available(ListAvailableCyclesDto::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, available);
    }

    #[tokio::test]
    async fn rate_bounds_filter_listing() {
        let module = MockModule::new();
        module.seed_cycle("owner", Decimal::new(5, 0), true, false);
        let mid = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        module.seed_cycle("owner", Decimal::new(50, 0), true, false);

        let listed = module
            .list_available(ListAvailableCyclesDto {
                min_hourly_rate: Some(Decimal::new(8, 0)),
                max_hourly_rate: Some(Decimal::new(20, 0)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mid);
    }

    #[tokio::test]
    async fn bounding_circle_filters_by_distance() {
        let module = MockModule::new();
        let near = module.seed_cycle_at("owner", Decimal::new(10, 0), 23.8103, 90.4125);
        // Chattogram, a couple hundred kilometers away.
        module.seed_cycle_at("owner", Decimal::new(10, 0), 22.3569, 91.7832);

        let listed = module
            .list_available(ListAvailableCyclesDto {
                latitude: Some(23.8100),
                longitude: Some(90.4120),
                radius_km: Some(5.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, near);
    }
}
