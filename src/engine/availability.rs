use crate::endorsement;
use crate::model::*;
use crate::packing::{pack, Packing};

use super::{EngineError, RestaurantState};

/// Can this restaurant seat `party_size` diners needing `required` during `window`?
///
/// Checks, in order: opening hours, endorsements, then bin-packing against the
/// tables still free for the window. The first failing check is the error.
pub fn evaluate(
    rs: &RestaurantState,
    party_size: u32,
    required: &EndorsementSet,
    window: &Span,
) -> Result<Packing, EngineError> {
    let restaurant = &rs.restaurant;
    if !restaurant.hours.contains(window) {
        return Err(EngineError::RestaurantClosed {
            restaurant_id: restaurant.id,
            window: *window,
        });
    }
    if !endorsement::matches(&restaurant.endorsements, required) {
        return Err(EngineError::EndorsementMismatch {
            restaurant_id: restaurant.id,
            missing: endorsement::missing(&restaurant.endorsements, required),
        });
    }
    let free = rs.index.free_capacity(window);
    pack(party_size, &free).ok_or(EngineError::NoCapacity {
        restaurant_id: restaurant.id,
        party_size,
        free,
    })
}
