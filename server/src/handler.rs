use std::ops::Deref;
use std::sync::Arc;

use driver::database::{
    PgChangeFeed, PostgresCycleRepository, PostgresDatabase, PostgresPaymentRepository,
    PostgresRentalRepository, PostgresTransaction, RedisDatabase, RedisLockMirror,
};
use driver::gateway::SslCommerzGateway;
use driver::identity::HttpIdentityVerifier;
use kernel::interface::database::DatabaseConnection;
use kernel::interface::gateway::DependOnPaymentGateway;
use kernel::interface::identity::DependOnIdentityVerifier;
use kernel::interface::mirror::{DependOnChangeFeed, DependOnLockMirror};
use kernel::interface::query::{DependOnCycleQuery, DependOnPaymentQuery, DependOnRentalQuery};
use kernel::interface::update::{
    DependOnCycleModifier, DependOnPaymentModifier, DependOnRentalModifier,
};
use kernel::KernelError;

/// Shared application module: one handle over every adapter the services
/// depend on. Cloning is cheap, the inner `Handler` is reference-counted.
#[derive(Clone)]
pub struct AppModule(Arc<Handler>);

impl AppModule {
    pub async fn new() -> error_stack::Result<Self, KernelError> {
        Ok(Self(Arc::new(Handler::init().await?)))
    }
}

impl Deref for AppModule {
    type Target = Handler;
    fn deref(&self) -> &Self::Target {
        Deref::deref(&self.0)
    }
}

pub struct Handler {
    pgpool: PostgresDatabase,
    mirror: RedisLockMirror,
    feed: PgChangeFeed,
    gateway: SslCommerzGateway,
    identity: HttpIdentityVerifier,
}

impl Handler {
    pub async fn init() -> error_stack::Result<Self, KernelError> {
        let pgpool = PostgresDatabase::new().await?;
        let redis = RedisDatabase::new()?;
        let mirror = RedisLockMirror::new(redis);
        let feed = PgChangeFeed::new(pgpool.clone());
        let gateway = SslCommerzGateway::from_env()?;
        let identity = HttpIdentityVerifier::from_env()?;

        Ok(Self {
            pgpool,
            mirror,
            feed,
            gateway,
            identity,
        })
    }
}

#[async_trait::async_trait]
impl DatabaseConnection<PostgresTransaction> for AppModule {
    async fn transact(&self) -> error_stack::Result<PostgresTransaction, KernelError> {
        self.0.pgpool.transact().await
    }
}

impl DependOnCycleQuery<PostgresTransaction> for AppModule {
    type CycleQuery = PostgresCycleRepository;
    fn cycle_query(&self) -> &Self::CycleQuery {
        &PostgresCycleRepository
    }
}

impl DependOnCycleModifier<PostgresTransaction> for AppModule {
    type CycleModifier = PostgresCycleRepository;
    fn cycle_modifier(&self) -> &Self::CycleModifier {
        &PostgresCycleRepository
    }
}

impl DependOnRentalQuery<PostgresTransaction> for AppModule {
    type RentalQuery = PostgresRentalRepository;
    fn rental_query(&self) -> &Self::RentalQuery {
        &PostgresRentalRepository
    }
}

impl DependOnRentalModifier<PostgresTransaction> for AppModule {
    type RentalModifier = PostgresRentalRepository;
    fn rental_modifier(&self) -> &Self::RentalModifier {
        &PostgresRentalRepository
    }
}

impl DependOnPaymentQuery<PostgresTransaction> for AppModule {
    type PaymentQuery = PostgresPaymentRepository;
    fn payment_query(&self) -> &Self::PaymentQuery {
        &PostgresPaymentRepository
    }
}

impl DependOnPaymentModifier<PostgresTransaction> for AppModule {
    type PaymentModifier = PostgresPaymentRepository;
    fn payment_modifier(&self) -> &Self::PaymentModifier {
        &PostgresPaymentRepository
    }
}

impl DependOnPaymentGateway for AppModule {
    type PaymentGateway = SslCommerzGateway;
    fn payment_gateway(&self) -> &Self::PaymentGateway {
        &self.0.gateway
    }
}

impl DependOnLockMirror for AppModule {
    type LockMirror = RedisLockMirror;
    fn lock_mirror(&self) -> &Self::LockMirror {
        &self.0.mirror
    }
}

impl DependOnChangeFeed for AppModule {
    type ChangeFeed = PgChangeFeed;
    fn change_feed(&self) -> &Self::ChangeFeed {
        &self.0.feed
    }
}

impl DependOnIdentityVerifier for AppModule {
    type IdentityVerifier = HttpIdentityVerifier;
    fn identity_verifier(&self) -> &Self::IdentityVerifier {
        &self.0.identity
    }
}
