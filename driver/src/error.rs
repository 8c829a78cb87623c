use error_stack::Report;

use kernel::KernelError;

/// Transport-level failures, one variant per backing dependency. The
/// `ConvertError` boundary decides which of these are retryable before
/// they reach the kernel.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    SqlX(#[from] sqlx::Error),
    #[error(transparent)]
    Redis(#[from] deadpool_redis::redis::RedisError),
    #[error(transparent)]
    RedisPool(#[from] deadpool_redis::PoolError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Env(#[from] dotenvy::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("row decode: {0}")]
    Decode(String),
}

impl DriverError {
    fn kernel_context(&self) -> KernelError {
        match self {
            DriverError::SqlX(sqlx::Error::PoolTimedOut) => KernelError::TransientConflict,
            DriverError::SqlX(sqlx::Error::Database(error)) => match error.code().as_deref() {
                // serialization_failure / deadlock_detected
                Some("40001") | Some("40P01") => KernelError::TransientConflict,
                Some("23505") if error.constraint() == Some("rentals_one_active_per_renter") => {
                    KernelError::RentalLimitExceeded
                }
                Some("23505") if error.constraint() == Some("rentals_one_active_per_cycle") => {
                    KernelError::CycleUnavailable
                }
                Some("23505") => KernelError::TransientConflict,
                _ => KernelError::Internal,
            },
            DriverError::RedisPool(deadpool_redis::PoolError::Timeout(_)) => {
                KernelError::UpstreamTimeout
            }
            DriverError::Redis(error) if error.is_timeout() => KernelError::UpstreamTimeout,
            DriverError::Http(error) if error.is_timeout() => KernelError::UpstreamTimeout,
            _ => KernelError::Internal,
        }
    }
}

pub trait ConvertError {
    type Ok;
    fn convert_error(self) -> error_stack::Result<Self::Ok, KernelError>;
}

impl<T, E> ConvertError for Result<T, E>
where
    E: Into<DriverError>,
{
    type Ok = T;
    fn convert_error(self) -> error_stack::Result<T, KernelError> {
        self.map_err(|error| {
            let error: DriverError = error.into();
            let context = error.kernel_context();
            Report::new(error).change_context(context)
        })
    }
}
