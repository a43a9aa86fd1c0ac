use crate::model::{Ms, DAY_MS};

pub const MAX_RESTAURANTS: usize = 100_000;
pub const MAX_DINERS: usize = 1_000_000;
pub const MAX_RESERVATIONS_PER_RESTAURANT: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ENDORSEMENTS: usize = 64;
pub const MAX_ENDORSEMENT_LEN: usize = 64;

/// Per size class.
pub const MAX_TABLES_PER_CLASS: u32 = 1_000;
pub const MAX_PARTY_SIZE: u32 = 256;
pub const MAX_DINERS_PER_REQUEST: usize = MAX_PARTY_SIZE as usize;

pub const MAX_WINDOW_MS: Ms = DAY_MS;
/// 1970-01-01
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
