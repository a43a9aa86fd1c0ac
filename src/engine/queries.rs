use ulid::Ulid;

use crate::model::*;
use crate::observability::AVAILABILITY_QUERIES_TOTAL;

use super::availability::evaluate;
use super::conflict::{validate_endorsements, validate_party, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// Every restaurant that can seat `party` during `window`, closest fit first.
    ///
    /// `filter` adds endorsements the caller wants on top of the party's own.
    /// Restaurants that are closed, lack an endorsement or lack tables are left
    /// out; an empty result means no match.
    pub async fn find_available(
        &self,
        party: &Party,
        window: Span,
        filter: &EndorsementSet,
    ) -> Result<Vec<Match>, EngineError> {
        validate_window(&window)?;
        validate_party(party)?;
        validate_endorsements(filter)?;

        let required: EndorsementSet = party.required.union(filter).cloned().collect();
        let mut matches = Vec::new();
        for rs in self.restaurant_handles() {
            let guard = rs.read().await;
            if let Ok(packing) = evaluate(&guard, party.size, &required, &window) {
                matches.push(Match {
                    restaurant_id: guard.restaurant.id,
                    name: guard.restaurant.name.clone(),
                    tables: packing.tables,
                    wasted_seats: packing.wasted,
                });
            }
        }
        matches.sort_by(|a, b| {
            a.wasted_seats
                .cmp(&b.wasted_seats)
                .then(a.restaurant_id.cmp(&b.restaurant_id))
        });

        let outcome = if matches.is_empty() { "no_match" } else { "match" };
        metrics::counter!(AVAILABILITY_QUERIES_TOTAL, "outcome" => outcome).increment(1);
        Ok(matches)
    }

    /// Evaluate a single restaurant, reporting why it cannot seat the party.
    pub async fn check_restaurant(
        &self,
        restaurant_id: Ulid,
        party: &Party,
        window: Span,
    ) -> Result<Match, EngineError> {
        validate_window(&window)?;
        validate_party(party)?;
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        let packing = evaluate(&guard, party.size, &party.required, &window)?;
        Ok(Match {
            restaurant_id,
            name: guard.restaurant.name.clone(),
            tables: packing.tables,
            wasted_seats: packing.wasted,
        })
    }

    pub async fn free_capacity(&self, restaurant_id: Ulid, window: Span) -> Result<TableCounts, EngineError> {
        validate_window(&window)?;
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(guard.index.free_capacity(&window))
    }

    pub async fn get_restaurant(&self, id: &Ulid) -> Option<Restaurant> {
        let rs = self.get_restaurant_state(id)?;
        let guard = rs.read().await;
        Some(guard.restaurant.clone())
    }

    /// All restaurants, ordered by id.
    pub async fn list_restaurants(&self) -> Vec<Restaurant> {
        let mut out = Vec::with_capacity(self.restaurants.len());
        for rs in self.restaurant_handles() {
            out.push(rs.read().await.restaurant.clone());
        }
        out.sort_by_key(|r| r.id);
        out
    }

    /// Reservations at a restaurant, ordered by window start.
    pub async fn get_reservations(&self, restaurant_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        Ok(guard.index.reservations().to_vec())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let restaurant_id = self
            .get_restaurant_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_restaurant_state(&restaurant_id)
            .ok_or(EngineError::NotFound(restaurant_id))?;
        let guard = rs.read().await;
        guard.index.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }
}
