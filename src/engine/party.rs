use rand::seq::SliceRandom;
use rand::Rng;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Build a party from registered diners. Repeated ids count once.
    pub fn assemble_party(&self, diner_ids: &[Ulid]) -> Result<Party, EngineError> {
        if diner_ids.is_empty() {
            return Err(EngineError::InvalidParty("party has no diners"));
        }
        if diner_ids.len() > MAX_DINERS_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many diners in request"));
        }
        let diners = diner_ids
            .iter()
            .map(|id| {
                self.diners
                    .get(id)
                    .map(|d| d.value().clone())
                    .ok_or(EngineError::NotFound(*id))
            })
            .collect::<Result<Vec<Diner>, _>>()?;
        Ok(Party::from_diners(&diners))
    }

    /// Pick `size` distinct registered diners at random.
    pub fn sample_party<R: Rng + ?Sized>(&self, rng: &mut R, size: usize) -> Result<Party, EngineError> {
        if size == 0 {
            return Err(EngineError::InvalidParty("party has no diners"));
        }
        if size > MAX_DINERS_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many diners in request"));
        }
        // Sorted so a seeded rng picks the same diners every time.
        let mut ids: Vec<Ulid> = self.diners.iter().map(|e| *e.key()).collect();
        if ids.len() < size {
            return Err(EngineError::InvalidParty("not enough registered diners"));
        }
        ids.sort();
        let picked: Vec<Ulid> = ids.choose_multiple(rng, size).copied().collect();
        self.assemble_party(&picked)
    }

    pub fn get_diner(&self, id: &Ulid) -> Option<Diner> {
        self.diners.get(id).map(|e| e.value().clone())
    }

    pub fn diner_count(&self) -> usize {
        self.diners.len()
    }
}
