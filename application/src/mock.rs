//! In-memory implementations of every kernel contract, letting service
//! tests exercise the full protocol without Postgres, Redis or a gateway.
//! The store sits behind one mutex, so the conditional claim really is a
//! compare-and-swap from the callers' point of view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use error_stack::Report;
use rust_decimal::Decimal;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use kernel::interface::database::{DatabaseConnection, Transaction};
use kernel::interface::gateway::{
    GatewaySession, PaymentGateway, SessionRequest, VerificationResult, VerificationStatus,
};
use kernel::interface::mirror::{
    ChangeFeed, ChangeSubscription, CycleLockChange, LockMirror, LockState,
};
use kernel::interface::query::{CycleFilter, CycleQuery, PaymentQuery, RentalQuery};
use kernel::interface::update::{CycleModifier, PaymentModifier, RentalModifier};
use kernel::prelude::entity::{
    Cycle, CycleId, GeoPoint, Payment, PaymentId, PaymentStatus, Rental, RentalId, RentalStatus,
    RentalPaymentStatus, TransactionId, UserId,
};
use kernel::KernelError;

#[derive(Default)]
struct MockState {
    cycles: HashMap<CycleId, Cycle>,
    rentals: HashMap<RentalId, Rental>,
    payments: HashMap<PaymentId, Payment>,
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, MockState> {
    state.lock().expect("mock state poisoned")
}

pub(crate) struct MockConnection {
    state: SharedState,
}

#[async_trait::async_trait]
impl Transaction for MockConnection {
    async fn commit(self) -> error_stack::Result<(), KernelError> {
        Ok(())
    }

    async fn roll_back(self) -> error_stack::Result<(), KernelError> {
        Ok(())
    }
}

pub(crate) struct MockRepository;

#[async_trait::async_trait]
impl CycleQuery<MockConnection> for MockRepository {
    async fn find_by_id(
        &self,
        con: &mut MockConnection,
        id: &CycleId,
    ) -> error_stack::Result<Option<Cycle>, KernelError> {
        Ok(lock(&con.state).cycles.get(id).cloned())
    }

    async fn find_available(
        &self,
        con: &mut MockConnection,
        filter: &CycleFilter,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .cycles
            .values()
            .filter(|cycle| cycle.is_available())
            .filter(|cycle| {
                filter
                    .min_hourly_rate
                    .map_or(true, |min| cycle.hourly_rate() >= min)
            })
            .filter(|cycle| {
                filter
                    .max_hourly_rate
                    .map_or(true, |max| cycle.hourly_rate() <= max)
            })
            .filter(|cycle| match &filter.near {
                None => true,
                Some(circle) => cycle.location().is_some_and(|location| {
                    circle.center.distance_km(location) <= circle.radius_km
                }),
            })
            .cloned()
            .collect())
    }

    async fn find_by_owner(
        &self,
        con: &mut MockConnection,
        owner: &UserId,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .cycles
            .values()
            .filter(|cycle| cycle.owner() == owner)
            .cloned()
            .collect())
    }

    async fn find_all(
        &self,
        con: &mut MockConnection,
    ) -> error_stack::Result<Vec<Cycle>, KernelError> {
        Ok(lock(&con.state).cycles.values().cloned().collect())
    }

    async fn find_orphaned_rented(
        &self,
        con: &mut MockConnection,
    ) -> error_stack::Result<Vec<CycleId>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .cycles
            .values()
            .filter(|cycle| cycle.is_rented())
            .filter(|cycle| {
                !state.rentals.values().any(|rental| {
                    rental.cycle_id() == cycle.id() && rental.status() == RentalStatus::Active
                })
            })
            .map(|cycle| *cycle.id())
            .collect())
    }
}

#[async_trait::async_trait]
impl CycleModifier<MockConnection> for MockRepository {
    async fn create(
        &self,
        con: &mut MockConnection,
        cycle: &Cycle,
    ) -> error_stack::Result<(), KernelError> {
        lock(&con.state).cycles.insert(*cycle.id(), cycle.clone());
        Ok(())
    }

    async fn claim(
        &self,
        con: &mut MockConnection,
        id: &CycleId,
        renter: &UserId,
        at: OffsetDateTime,
    ) -> error_stack::Result<Option<Cycle>, KernelError> {
        let mut state = lock(&con.state);
        let snapshot = match state.cycles.get(id) {
            Some(cycle) if cycle.is_available() => cycle.clone(),
            _ => return Ok(None),
        };
        let claimed = snapshot.clone().claimed_by(renter.clone(), at);
        state.cycles.insert(*id, claimed);
        Ok(Some(snapshot))
    }

    async fn release(
        &self,
        con: &mut MockConnection,
        id: &CycleId,
    ) -> error_stack::Result<(), KernelError> {
        let mut state = lock(&con.state);
        if let Some(cycle) = state.cycles.get(id).cloned() {
            state.cycles.insert(*id, cycle.released());
        }
        Ok(())
    }

    async fn record_completion(
        &self,
        con: &mut MockConnection,
        id: &CycleId,
        earnings: Decimal,
    ) -> error_stack::Result<(), KernelError> {
        let mut state = lock(&con.state);
        if let Some(cycle) = state.cycles.get(id).cloned() {
            state.cycles.insert(*id, cycle.with_completion(earnings));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RentalQuery<MockConnection> for MockRepository {
    async fn find_by_id(
        &self,
        con: &mut MockConnection,
        id: &RentalId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        Ok(lock(&con.state).rentals.get(id).cloned())
    }

    async fn find_active_by_renter(
        &self,
        con: &mut MockConnection,
        renter: &UserId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .rentals
            .values()
            .find(|rental| {
                rental.renter() == renter && rental.status() == RentalStatus::Active
            })
            .cloned())
    }

    async fn find_active_by_cycle(
        &self,
        con: &mut MockConnection,
        cycle_id: &CycleId,
    ) -> error_stack::Result<Option<Rental>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .rentals
            .values()
            .find(|rental| {
                rental.cycle_id() == cycle_id && rental.status() == RentalStatus::Active
            })
            .cloned())
    }

    async fn find_by_renter(
        &self,
        con: &mut MockConnection,
        renter: &UserId,
    ) -> error_stack::Result<Vec<Rental>, KernelError> {
        let state = lock(&con.state);
        let mut rentals: Vec<Rental> = state
            .rentals
            .values()
            .filter(|rental| rental.renter() == renter)
            .cloned()
            .collect();
        rentals.sort_by_key(|rental| std::cmp::Reverse(rental.started_at()));
        Ok(rentals)
    }

    async fn find_payment_overdue(
        &self,
        con: &mut MockConnection,
        threshold: OffsetDateTime,
    ) -> error_stack::Result<Vec<Rental>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .rentals
            .values()
            .filter(|rental| {
                rental.status() == RentalStatus::Completed
                    && rental.payment_status() == RentalPaymentStatus::Pending
                    && rental.ended_at().is_some_and(|ended| ended < threshold)
            })
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl RentalModifier<MockConnection> for MockRepository {
    async fn create(
        &self,
        con: &mut MockConnection,
        rental: &Rental,
    ) -> error_stack::Result<(), KernelError> {
        lock(&con.state).rentals.insert(*rental.id(), rental.clone());
        Ok(())
    }

    async fn update(
        &self,
        con: &mut MockConnection,
        rental: &Rental,
    ) -> error_stack::Result<(), KernelError> {
        lock(&con.state).rentals.insert(*rental.id(), rental.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentQuery<MockConnection> for MockRepository {
    async fn find_by_transaction_id(
        &self,
        con: &mut MockConnection,
        transaction_id: &TransactionId,
    ) -> error_stack::Result<Option<Payment>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .payments
            .values()
            .find(|payment| payment.transaction_id() == transaction_id)
            .cloned())
    }

    async fn find_by_rental_id(
        &self,
        con: &mut MockConnection,
        rental_id: &RentalId,
    ) -> error_stack::Result<Vec<Payment>, KernelError> {
        let state = lock(&con.state);
        Ok(state
            .payments
            .values()
            .filter(|payment| payment.rental_id() == rental_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl PaymentModifier<MockConnection> for MockRepository {
    async fn create(
        &self,
        con: &mut MockConnection,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError> {
        let mut state = lock(&con.state);
        if state
            .payments
            .values()
            .any(|existing| existing.transaction_id() == payment.transaction_id())
        {
            return Err(Report::new(KernelError::TransientConflict)
                .attach_printable("duplicate transaction id"));
        }
        state.payments.insert(*payment.id(), payment.clone());
        Ok(())
    }

    async fn update(
        &self,
        con: &mut MockConnection,
        payment: &Payment,
    ) -> error_stack::Result<(), KernelError> {
        lock(&con.state).payments.insert(*payment.id(), payment.clone());
        Ok(())
    }

    async fn delete_failed_by_rental(
        &self,
        con: &mut MockConnection,
        rental_id: &RentalId,
    ) -> error_stack::Result<(), KernelError> {
        lock(&con.state).payments.retain(|_, payment| {
            payment.rental_id() != rental_id || payment.status() != PaymentStatus::Failed
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockGateway {
    sessions: Arc<AtomicU32>,
    verifications: Arc<AtomicU32>,
    reject: Arc<AtomicBool>,
    time_out: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> error_stack::Result<GatewaySession, KernelError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(GatewaySession {
            session_id: format!("SESS-{n}"),
            redirect_url: format!("https://gateway.test/pay/{}", request.transaction_id),
        })
    }

    async fn verify_transaction(
        &self,
        verification_id: &str,
    ) -> error_stack::Result<VerificationResult, KernelError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if self.time_out.load(Ordering::SeqCst) {
            return Err(Report::new(KernelError::UpstreamTimeout));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Ok(VerificationResult {
                status: VerificationStatus::Invalid,
                payload: json!({"status": "INVALID", "val_id": verification_id}),
            });
        }
        Ok(VerificationResult {
            status: VerificationStatus::Valid,
            payload: json!({"status": "VALID", "val_id": verification_id}),
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryMirror {
    records: Arc<Mutex<HashMap<CycleId, LockState>>>,
}

#[async_trait::async_trait]
impl LockMirror for MemoryMirror {
    async fn set_locked(
        &self,
        id: &CycleId,
        locked: bool,
        at: OffsetDateTime,
    ) -> error_stack::Result<(), KernelError> {
        self.records
            .lock()
            .expect("mirror poisoned")
            .insert(*id, LockState { locked, updated_at: at });
        Ok(())
    }

    async fn get(&self, id: &CycleId) -> error_stack::Result<Option<LockState>, KernelError> {
        Ok(self.records.lock().expect("mirror poisoned").get(id).copied())
    }

    async fn clear(&self) -> error_stack::Result<(), KernelError> {
        self.records.lock().expect("mirror poisoned").clear();
        Ok(())
    }
}

type FeedSender = tokio::sync::mpsc::UnboundedSender<CycleLockChange>;
type FeedReceiver = tokio::sync::mpsc::UnboundedReceiver<CycleLockChange>;

/// Hand-fed change feed. Each subscribe opens a fresh channel and replaces
/// the sender `push_change` writes to, which makes reconnect behavior
/// observable in tests.
#[derive(Clone, Default)]
pub(crate) struct MockFeed {
    sender: Arc<Mutex<Option<FeedSender>>>,
}

pub(crate) struct MockSubscription(FeedReceiver);

#[async_trait::async_trait]
impl ChangeFeed for MockFeed {
    type Subscription = MockSubscription;

    async fn subscribe(&self) -> error_stack::Result<Self::Subscription, KernelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        *self.sender.lock().expect("feed poisoned") = Some(tx);
        Ok(MockSubscription(rx))
    }
}

#[async_trait::async_trait]
impl ChangeSubscription for MockSubscription {
    async fn next_change(&mut self) -> error_stack::Result<CycleLockChange, KernelError> {
        self.0.recv().await.ok_or_else(|| {
            Report::new(KernelError::Internal).attach_printable("mock feed closed")
        })
    }
}

#[derive(Clone)]
pub(crate) struct MockModule {
    state: SharedState,
    gateway: MockGateway,
    mirror: MemoryMirror,
    feed: MockFeed,
}

#[async_trait::async_trait]
impl DatabaseConnection<MockConnection> for MockModule {
    async fn transact(&self) -> error_stack::Result<MockConnection, KernelError> {
        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

macro_rules! depend_on_repository {
    ($depend:ident, $assoc:ident, $getter:ident) => {
        impl kernel::interface::query::$depend<MockConnection> for MockModule {
            type $assoc = MockRepository;
            fn $getter(&self) -> &Self::$assoc {
                &MockRepository
            }
        }
    };
    (update $depend:ident, $assoc:ident, $getter:ident) => {
        impl kernel::interface::update::$depend<MockConnection> for MockModule {
            type $assoc = MockRepository;
            fn $getter(&self) -> &Self::$assoc {
                &MockRepository
            }
        }
    };
}

depend_on_repository!(DependOnCycleQuery, CycleQuery, cycle_query);
depend_on_repository!(DependOnRentalQuery, RentalQuery, rental_query);
depend_on_repository!(DependOnPaymentQuery, PaymentQuery, payment_query);
depend_on_repository!(update DependOnCycleModifier, CycleModifier, cycle_modifier);
depend_on_repository!(update DependOnRentalModifier, RentalModifier, rental_modifier);
depend_on_repository!(update DependOnPaymentModifier, PaymentModifier, payment_modifier);

impl kernel::interface::gateway::DependOnPaymentGateway for MockModule {
    type PaymentGateway = MockGateway;
    fn payment_gateway(&self) -> &Self::PaymentGateway {
        &self.gateway
    }
}

impl kernel::interface::mirror::DependOnLockMirror for MockModule {
    type LockMirror = MemoryMirror;
    fn lock_mirror(&self) -> &Self::LockMirror {
        &self.mirror
    }
}

impl kernel::interface::mirror::DependOnChangeFeed for MockModule {
    type ChangeFeed = MockFeed;
    fn change_feed(&self) -> &Self::ChangeFeed {
        &self.feed
    }
}

impl MockModule {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            gateway: MockGateway::default(),
            mirror: MemoryMirror::default(),
            feed: MockFeed::default(),
        }
    }

    pub fn seed_cycle(&self, owner: &str, rate: Decimal, active: bool, rented: bool) -> Uuid {
        let id = Uuid::new_v4();
        let cycle = Cycle::new(
            CycleId::new(id),
            UserId::new(owner),
            "Hero".into(),
            "Sprint Pro".into(),
            None,
            Some("good".into()),
            rate,
            active,
            rented,
            rented.then(|| UserId::new("previous-renter")),
            None,
            0,
            Decimal::ZERO,
            None,
            OffsetDateTime::now_utc(),
        );
        lock(&self.state).cycles.insert(CycleId::new(id), cycle);
        id
    }

    pub fn seed_cycle_at(&self, owner: &str, rate: Decimal, latitude: f64, longitude: f64) -> Uuid {
        let id = self.seed_cycle(owner, rate, true, false);
        let mut state = lock(&self.state);
        let cycle = state.cycles.get(&CycleId::new(id)).cloned().expect("just seeded");
        let relocated = Cycle::new(
            *cycle.id(),
            cycle.owner().clone(),
            cycle.brand().into(),
            cycle.model().into(),
            cycle.description().map(str::to_string),
            cycle.condition().map(str::to_string),
            cycle.hourly_rate(),
            cycle.is_active(),
            cycle.is_rented(),
            cycle.current_renter().cloned(),
            Some(GeoPoint::new(latitude, longitude)),
            cycle.total_rentals(),
            cycle.total_earnings(),
            cycle.last_rented_at(),
            cycle.created_at(),
        );
        state.cycles.insert(CycleId::new(id), relocated);
        id
    }

    pub fn cycle_snapshot(&self, id: Uuid) -> Cycle {
        lock(&self.state)
            .cycles
            .get(&CycleId::new(id))
            .cloned()
            .expect("cycle not seeded")
    }

    pub fn rental_snapshot(&self, id: Uuid) -> Rental {
        lock(&self.state)
            .rentals
            .get(&RentalId::new(id))
            .cloned()
            .expect("rental not created")
    }

    pub fn payment_snapshot(&self, transaction_id: &str) -> Payment {
        lock(&self.state)
            .payments
            .values()
            .find(|payment| payment.transaction_id().as_ref() == transaction_id)
            .cloned()
            .expect("payment not created")
    }

    pub fn payments_for_rental(&self, rental_id: Uuid) -> Vec<Payment> {
        lock(&self.state)
            .payments
            .values()
            .filter(|payment| payment.rental_id() == &RentalId::new(rental_id))
            .cloned()
            .collect()
    }

    /// Shifts a rental's start into the past, as if it had been running
    /// for `by` already.
    pub fn backdate_rental(&self, id: Uuid, by: Duration) {
        self.rewrite_rental(id, |rental| {
            shift_rental(rental, by, false)
        });
    }

    /// Shifts a completed rental's end into the past, as if the payment
    /// window opened `by` ago.
    pub fn backdate_rental_end(&self, id: Uuid, by: Duration) {
        self.rewrite_rental(id, |rental| {
            shift_rental(rental, by, true)
        });
    }

    fn rewrite_rental(&self, id: Uuid, rewrite: impl FnOnce(&Rental) -> Rental) {
        let mut state = lock(&self.state);
        let rental = state
            .rentals
            .get(&RentalId::new(id))
            .cloned()
            .expect("rental not created");
        state.rentals.insert(*rental.id(), rewrite(&rental));
    }

    pub fn force_release_cycle(&self, id: Uuid) {
        let mut state = lock(&self.state);
        if let Some(cycle) = state.cycles.get(&CycleId::new(id)).cloned() {
            state.cycles.insert(CycleId::new(id), cycle.released());
        }
    }

    pub fn force_claim_cycle(&self, id: Uuid, renter: &str) {
        let mut state = lock(&self.state);
        if let Some(cycle) = state.cycles.get(&CycleId::new(id)).cloned() {
            state.cycles.insert(
                CycleId::new(id),
                cycle.claimed_by(UserId::new(renter), OffsetDateTime::now_utc()),
            );
        }
    }

    pub fn gateway_sessions_created(&self) -> u32 {
        self.gateway.sessions.load(Ordering::SeqCst)
    }

    pub fn gateway_verifications(&self) -> u32 {
        self.gateway.verifications.load(Ordering::SeqCst)
    }

    pub fn gateway_reject_verifications(&self) {
        self.gateway.reject.store(true, Ordering::SeqCst);
    }

    pub fn gateway_accept_verifications(&self) {
        self.gateway.reject.store(false, Ordering::SeqCst);
    }

    pub fn gateway_time_out_verifications(&self) {
        self.gateway.time_out.store(true, Ordering::SeqCst);
    }

    pub fn mirror_len(&self) -> usize {
        self.mirror.records.lock().expect("mirror poisoned").len()
    }

    pub fn mirror_locked(&self, id: Uuid) -> Option<bool> {
        self.mirror
            .records
            .lock()
            .expect("mirror poisoned")
            .get(&CycleId::new(id))
            .map(|state| state.locked)
    }

    pub fn pollute_mirror(&self, id: Uuid) {
        self.mirror.records.lock().expect("mirror poisoned").insert(
            CycleId::new(id),
            LockState {
                locked: true,
                updated_at: OffsetDateTime::now_utc(),
            },
        );
    }

    pub fn push_change(&self, change: CycleLockChange) {
        if let Some(sender) = self.feed.sender.lock().expect("feed poisoned").as_ref() {
            let _ = sender.send(change);
        }
    }
}

fn shift_rental(rental: &Rental, by: Duration, end_only: bool) -> Rental {
    Rental::new(
        *rental.id(),
        *rental.cycle_id(),
        rental.renter().clone(),
        rental.owner().clone(),
        rental.hourly_rate(),
        if end_only {
            rental.started_at()
        } else {
            rental.started_at() - by
        },
        rental.ended_at().map(|ended| ended - by),
        rental.status(),
        rental.duration_minutes(),
        rental.distance_km(),
        rental.total_cost(),
        rental.payment_status(),
        rental.rating(),
        rental.review().map(str::to_string),
    )
}
