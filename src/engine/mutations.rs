use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::CANCELLATIONS_TOTAL;

use super::conflict::{validate_endorsements, validate_name, validate_tables};
use super::{Engine, EngineError, RestaurantState, WalCommand};

impl Engine {
    pub async fn create_restaurant(
        &self,
        id: Ulid,
        name: String,
        tables: TableCounts,
        endorsements: EndorsementSet,
        hours: Hours,
    ) -> Result<(), EngineError> {
        if self.restaurants.len() >= MAX_RESTAURANTS {
            return Err(EngineError::LimitExceeded("too many restaurants"));
        }
        validate_name(&name)?;
        validate_tables(&tables)?;
        validate_endorsements(&endorsements)?;
        if !hours.is_valid() {
            return Err(EngineError::InvalidWindow("opening must be before closing"));
        }

        let _gate = self.gate_exclusive(id).await?;
        if self.restaurants.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::RestaurantCreated {
            id,
            name: name.clone(),
            tables,
            endorsements: endorsements.clone(),
            hours,
        };
        self.wal_append(&event).await?;
        let restaurant = Restaurant {
            id,
            name,
            tables,
            endorsements,
            hours,
        };
        self.restaurants
            .insert(id, Arc::new(RwLock::new(RestaurantState::new(restaurant))));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn register_diner(
        &self,
        id: Ulid,
        name: String,
        preferences: EndorsementSet,
    ) -> Result<(), EngineError> {
        if self.diners.len() >= MAX_DINERS {
            return Err(EngineError::LimitExceeded("too many diners"));
        }
        validate_name(&name)?;
        validate_endorsements(&preferences)?;

        let _gate = self.gate_exclusive(id).await?;
        if self.diners.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::DinerRegistered {
            id,
            name: name.clone(),
            preferences: preferences.clone(),
        };
        self.wal_append(&event).await?;
        self.diners.insert(
            id,
            Diner {
                id,
                name,
                preferences,
            },
        );
        Ok(())
    }

    /// Cancel a reservation, releasing its tables. Returns what was cancelled.
    pub async fn cancel(&self, reservation_id: Ulid) -> Result<Reservation, EngineError> {
        let owner = self
            .get_restaurant_for_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;
        let _gate = self.gate_shared(owner).await?;
        let (restaurant_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let reservation = guard
            .index
            .get(&reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound(reservation_id))?;
        let event = Event::ReservationCancelled {
            id: reservation_id,
            restaurant_id,
        };
        self.persist_and_apply(restaurant_id, &mut guard, &event).await?;
        metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
        info!("cancelled {reservation_id} at {restaurant_id}");
        Ok(reservation)
    }

    /// Compact the WAL by rewriting it with only the records needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.wal_gate.write().await;

        let mut events = Vec::new();
        let mut diners: Vec<Diner> = self.diners.iter().map(|e| e.value().clone()).collect();
        diners.sort_by_key(|d| d.id);
        for d in diners {
            events.push(Event::DinerRegistered {
                id: d.id,
                name: d.name,
                preferences: d.preferences,
            });
        }

        for rs in self.restaurant_handles() {
            let guard = rs.read().await;
            let r = &guard.restaurant;
            events.push(Event::RestaurantCreated {
                id: r.id,
                name: r.name.clone(),
                tables: r.tables,
                endorsements: r.endorsements.clone(),
                hours: r.hours,
            });
            events.extend(guard.index.reservations().iter().map(Event::committed));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
