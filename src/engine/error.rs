use ulid::Ulid;

use crate::model::{Endorsement, Span, TableCounts};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidWindow(&'static str),
    InvalidParty(&'static str),
    LimitExceeded(&'static str),
    RestaurantClosed {
        restaurant_id: Ulid,
        window: Span,
    },
    EndorsementMismatch {
        restaurant_id: Ulid,
        missing: Vec<Endorsement>,
    },
    NoCapacity {
        restaurant_id: Ulid,
        party_size: u32,
        free: TableCounts,
    },
    /// Another booking took the tables between the feasibility check and the commit.
    InventoryConflict(Ulid),
    /// The restaurant lock could not be acquired in time. Safe to retry.
    LockTimeout(Ulid),
    WalError(String),
}

impl EngineError {
    /// Stable snake_case label for wire responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidWindow(_) => "invalid_window",
            EngineError::InvalidParty(_) => "invalid_party",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::RestaurantClosed { .. } => "restaurant_closed",
            EngineError::EndorsementMismatch { .. } => "endorsement_mismatch",
            EngineError::NoCapacity { .. } => "no_capacity",
            EngineError::InventoryConflict(_) => "inventory_conflict",
            EngineError::LockTimeout(_) => "lock_timeout",
            EngineError::WalError(_) => "wal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidWindow(_) | EngineError::InvalidParty(_) | EngineError::LimitExceeded(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidWindow(msg) => write!(f, "invalid window: {msg}"),
            EngineError::InvalidParty(msg) => write!(f, "invalid party: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::RestaurantClosed {
                restaurant_id,
                window,
            } => write!(
                f,
                "restaurant {restaurant_id} is closed during [{}, {})",
                window.start, window.end
            ),
            EngineError::EndorsementMismatch {
                restaurant_id,
                missing,
            } => write!(
                f,
                "restaurant {restaurant_id} does not offer: {}",
                missing.join(", ")
            ),
            EngineError::NoCapacity {
                restaurant_id,
                party_size,
                free,
            } => write!(
                f,
                "restaurant {restaurant_id} cannot seat {party_size}: free two-top={} four-top={} six-top={}",
                free.two, free.four, free.six
            ),
            EngineError::InventoryConflict(id) => {
                write!(f, "tables at restaurant {id} were taken by a concurrent booking")
            }
            EngineError::LockTimeout(id) => write!(f, "timed out waiting for restaurant {id}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
