use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, BOOKING_DURATION_SECONDS, INVENTORY_CONFLICTS_TOTAL};

use super::availability::evaluate;
use super::conflict::{validate_party, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// Seat `party` at a restaurant for `window`, exactly once.
    ///
    /// The table assignment is planned against a shared-lock snapshot, then
    /// hours, endorsements and packing are evaluated again under the
    /// restaurant's exclusive lock and that fresh assignment is committed.
    /// A plan that changed in between is logged as an inventory conflict; a
    /// party that no longer fits gets `NoCapacity`.
    pub async fn book(
        &self,
        restaurant_id: Ulid,
        party: &Party,
        window: Span,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.book_inner(restaurant_id, party, window).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(e) => e.kind(),
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(BOOKING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }

    async fn book_inner(
        &self,
        restaurant_id: Ulid,
        party: &Party,
        window: Span,
    ) -> Result<Reservation, EngineError> {
        validate_window(&window)?;
        validate_party(party)?;
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;

        let planned = {
            let guard = self.read_locked(restaurant_id, rs.clone()).await?;
            evaluate(&guard, party.size, &party.required, &window)?
        };

        let _gate = self.gate_shared(restaurant_id).await?;
        let mut guard = self.write_locked(restaurant_id, rs).await?;
        if guard.index.len() >= MAX_RESERVATIONS_PER_RESTAURANT {
            return Err(EngineError::LimitExceeded("too many reservations on restaurant"));
        }

        // The read-phase plan is only a hint: availability is evaluated again
        // under the exclusive lock and that result is what gets committed.
        let current = evaluate(&guard, party.size, &party.required, &window);
        if !current.as_ref().is_ok_and(|p| *p == planned) {
            metrics::counter!(INVENTORY_CONFLICTS_TOTAL).increment(1);
            debug!(
                "{}: planned {:?}, now {:?}",
                EngineError::InventoryConflict(restaurant_id),
                planned.tables,
                current.as_ref().map(|p| p.tables)
            );
        }
        let tables = current?.tables;

        let reservation = Reservation {
            id: Ulid::new(),
            restaurant_id,
            diners: party.diners.clone(),
            party_size: party.size,
            window,
            tables,
        };
        self.commit_reservation(&mut guard, reservation.clone()).await?;
        info!(
            "booked {} for {} at {restaurant_id} [{}, {}) tables {}/{}/{}",
            reservation.id,
            party.size,
            window.start,
            window.end,
            tables.two,
            tables.four,
            tables.six
        );
        Ok(reservation)
    }
}
