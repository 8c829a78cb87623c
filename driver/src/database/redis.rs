mod mirror;

pub use self::mirror::*;

use deadpool_redis::{Config, Connection, Pool, Runtime};
use error_stack::ResultExt;

use kernel::KernelError;

use crate::env;
use crate::error::ConvertError;

const REDIS_URL: &str = "REDIS_URL";

#[derive(Clone)]
pub struct RedisDatabase {
    pool: Pool,
}

impl RedisDatabase {
    pub fn new() -> error_stack::Result<Self, KernelError> {
        let url = env(REDIS_URL)?;
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .change_context_lazy(|| KernelError::Internal)?;
        Ok(Self { pool })
    }

    pub(crate) async fn connection(&self) -> error_stack::Result<Connection, KernelError> {
        self.pool.get().await.convert_error()
    }
}
