mod availability;
mod booking;
mod conflict;
mod error;
mod mutations;
mod party;
mod queries;

pub use availability::evaluate;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{
    mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use ulid::Ulid;

use crate::index::IntervalIndex;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// A restaurant record together with the calendar of its reservations.
#[derive(Debug, Clone)]
pub struct RestaurantState {
    pub restaurant: Restaurant,
    pub index: IntervalIndex,
}

impl RestaurantState {
    pub fn new(restaurant: Restaurant) -> Self {
        let index = IntervalIndex::new(restaurant.tables);
        Self { restaurant, index }
    }
}

pub type SharedRestaurantState = Arc<RwLock<RestaurantState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL flush failed: {e}");
                }
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

pub struct Engine {
    pub(super) restaurants: DashMap<Ulid, SharedRestaurantState>,
    pub(super) diners: DashMap<Ulid, Diner>,
    /// Reverse lookup: reservation id → restaurant id
    pub(super) reservation_to_restaurant: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared while appending; compaction holds it
    /// exclusively so the snapshot it writes misses no append.
    /// Always taken before any restaurant lock.
    pub(super) wal_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub(super) lock_timeout: Duration,
}

/// Apply an event directly to a RestaurantState (caller holds the lock).
fn apply_to_restaurant(rs: &mut RestaurantState, event: &Event, reservation_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationCommitted {
            id,
            restaurant_id,
            diners,
            party_size,
            window,
            tables,
        } => {
            rs.index.insert(Reservation {
                id: *id,
                restaurant_id: *restaurant_id,
                diners: diners.clone(),
                party_size: *party_size,
                window: *window,
                tables: *tables,
            });
            reservation_map.insert(*id, *restaurant_id);
        }
        Event::ReservationCancelled { id, .. } => {
            rs.index.cancel(id);
            reservation_map.remove(id);
        }
        // Records handled at the map level, not here
        Event::RestaurantCreated { .. } | Event::DinerRegistered { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            restaurants: DashMap::new(),
            diners: DashMap::new(),
            reservation_to_restaurant: DashMap::new(),
            wal_tx,
            wal_gate: RwLock::new(()),
            notify,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        };

        // Sole owner of these Arcs during replay, so try_write never contends.
        for event in &events {
            match event {
                Event::RestaurantCreated {
                    id,
                    name,
                    tables,
                    endorsements,
                    hours,
                } => {
                    let restaurant = Restaurant {
                        id: *id,
                        name: name.clone(),
                        tables: *tables,
                        endorsements: endorsements.clone(),
                        hours: *hours,
                    };
                    engine
                        .restaurants
                        .insert(*id, Arc::new(RwLock::new(RestaurantState::new(restaurant))));
                }
                Event::DinerRegistered {
                    id,
                    name,
                    preferences,
                } => {
                    engine.diners.insert(
                        *id,
                        Diner {
                            id: *id,
                            name: name.clone(),
                            preferences: preferences.clone(),
                        },
                    );
                }
                other => {
                    if let Some(restaurant_id) = other.restaurant_id()
                        && let Some(entry) = engine.restaurants.get(&restaurant_id)
                    {
                        let rs = entry.value().clone();
                        let Ok(mut guard) = rs.try_write() else {
                            return Err(io::Error::other("replay: restaurant state contended"));
                        };
                        apply_to_restaurant(&mut guard, other, &engine.reservation_to_restaurant);
                    }
                }
            }
        }

        tracing::debug!(
            "replayed {} events: {} restaurants, {} diners, {} reservations",
            events.len(),
            engine.restaurants.len(),
            engine.diners.len(),
            engine.reservation_to_restaurant.len()
        );
        Ok(engine)
    }

    /// Bound on how long a booking or cancellation waits for a restaurant lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_restaurant_state(&self, id: &Ulid) -> Option<SharedRestaurantState> {
        self.restaurants.get(id).map(|e| e.value().clone())
    }

    pub fn get_restaurant_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_restaurant
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Handles to every restaurant, cloned out of the map so no shard lock
    /// is held across an await.
    pub(super) fn restaurant_handles(&self) -> Vec<SharedRestaurantState> {
        self.restaurants.iter().map(|e| e.value().clone()).collect()
    }

    /// Shared hold on the WAL gate, bounded by the lock timeout.
    pub(super) async fn gate_shared(&self, restaurant_id: Ulid) -> Result<RwLockReadGuard<'_, ()>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.wal_gate.read())
            .await
            .map_err(|_| self.lock_timed_out(restaurant_id))
    }

    /// Exclusive hold on the WAL gate. Record creation takes it so the
    /// existence check and the insert cannot interleave with another create.
    pub(super) async fn gate_exclusive(&self, id: Ulid) -> Result<RwLockWriteGuard<'_, ()>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.wal_gate.write())
            .await
            .map_err(|_| self.lock_timed_out(id))
    }

    pub(super) async fn read_locked(
        &self,
        restaurant_id: Ulid,
        rs: SharedRestaurantState,
    ) -> Result<OwnedRwLockReadGuard<RestaurantState>, EngineError> {
        tokio::time::timeout(self.lock_timeout, rs.read_owned())
            .await
            .map_err(|_| self.lock_timed_out(restaurant_id))
    }

    pub(super) async fn write_locked(
        &self,
        restaurant_id: Ulid,
        rs: SharedRestaurantState,
    ) -> Result<OwnedRwLockWriteGuard<RestaurantState>, EngineError> {
        tokio::time::timeout(self.lock_timeout, rs.write_owned())
            .await
            .map_err(|_| self.lock_timed_out(restaurant_id))
    }

    fn lock_timed_out(&self, restaurant_id: Ulid) -> EngineError {
        tracing::warn!(
            "lock wait on restaurant {restaurant_id} exceeded {:?}",
            self.lock_timeout
        );
        metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
        EngineError::LockTimeout(restaurant_id)
    }

    /// WAL-append + apply + notify in one call. Caller holds the write lock.
    pub(super) async fn persist_and_apply(
        &self,
        restaurant_id: Ulid,
        rs: &mut RestaurantState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_restaurant(rs, event, &self.reservation_to_restaurant);
        self.notify.send(restaurant_id, event);
        Ok(())
    }

    /// Insert into the index (capacity re-checked), then log it. A failed
    /// append rolls the insert back. Caller holds the gate and the write lock.
    pub(super) async fn commit_reservation(
        &self,
        rs: &mut RestaurantState,
        reservation: Reservation,
    ) -> Result<(), EngineError> {
        let restaurant_id = reservation.restaurant_id;
        let event = Event::committed(&reservation);
        let id = reservation.id;
        rs.index
            .commit(reservation)
            .map_err(|_| EngineError::InventoryConflict(restaurant_id))?;
        if let Err(e) = self.wal_append(&event).await {
            rs.index.cancel(&id);
            return Err(e);
        }
        self.reservation_to_restaurant.insert(id, restaurant_id);
        self.notify.send(restaurant_id, &event);
        Ok(())
    }

    /// Lookup reservation → restaurant, acquire its write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<RestaurantState>), EngineError> {
        let restaurant_id = self
            .get_restaurant_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = self.write_locked(restaurant_id, rs).await?;
        Ok((restaurant_id, guard))
    }
}
