use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::InvalidWindow("start must be before end"));
    }
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if window.duration_ms() > MAX_WINDOW_MS {
        return Err(EngineError::LimitExceeded("window too wide"));
    }
    Ok(())
}

pub(crate) fn validate_party(party: &Party) -> Result<(), EngineError> {
    if party.size == 0 {
        return Err(EngineError::InvalidParty("party has no diners"));
    }
    if party.size > MAX_PARTY_SIZE {
        return Err(EngineError::LimitExceeded("party too large"));
    }
    if !party.diners.is_empty() && party.diners.len() != party.size as usize {
        return Err(EngineError::InvalidParty("party size does not match diner count"));
    }
    validate_endorsements(&party.required)
}

pub(crate) fn validate_endorsements(tags: &EndorsementSet) -> Result<(), EngineError> {
    if tags.len() > MAX_ENDORSEMENTS {
        return Err(EngineError::LimitExceeded("too many endorsements"));
    }
    if tags.iter().any(|t| t.len() > MAX_ENDORSEMENT_LEN) {
        return Err(EngineError::LimitExceeded("endorsement too long"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_tables(tables: &TableCounts) -> Result<(), EngineError> {
    if TableSize::ALL
        .iter()
        .any(|&s| tables.get(s) > MAX_TABLES_PER_CLASS)
    {
        return Err(EngineError::LimitExceeded("too many tables in one size class"));
    }
    Ok(())
}
