use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Restaurant-local milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Dietary/accessibility tag, stored normalized (see `endorsement::normalize`).
pub type Endorsement = String;
pub type EndorsementSet = BTreeSet<Endorsement>;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Inventory ────────────────────────────────────────────────────

/// Seating capacity bucket a physical table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableSize {
    Two,
    Four,
    Six,
}

impl TableSize {
    /// Ascending by seats.
    pub const ALL: [TableSize; 3] = [TableSize::Two, TableSize::Four, TableSize::Six];

    pub fn seats(self) -> u32 {
        match self {
            TableSize::Two => 2,
            TableSize::Four => 4,
            TableSize::Six => 6,
        }
    }
}

/// Table counts per size class. Used for owned inventory, free capacity
/// and per-reservation assignments alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableCounts {
    pub two: u32,
    pub four: u32,
    pub six: u32,
}

impl TableCounts {
    pub const ZERO: TableCounts = TableCounts { two: 0, four: 0, six: 0 };

    pub fn new(two: u32, four: u32, six: u32) -> Self {
        Self { two, four, six }
    }

    pub fn get(&self, size: TableSize) -> u32 {
        match size {
            TableSize::Two => self.two,
            TableSize::Four => self.four,
            TableSize::Six => self.six,
        }
    }

    pub fn get_mut(&mut self, size: TableSize) -> &mut u32 {
        match size {
            TableSize::Two => &mut self.two,
            TableSize::Four => &mut self.four,
            TableSize::Six => &mut self.six,
        }
    }

    pub fn seats(&self) -> u32 {
        TableSize::ALL.iter().map(|&s| self.get(s) * s.seats()).sum()
    }

    pub fn tables(&self) -> u32 {
        self.two + self.four + self.six
    }

    pub fn is_empty(&self) -> bool {
        self.tables() == 0
    }

    /// True if every class of `self` fits within the same class of `other`.
    pub fn fits_within(&self, other: &TableCounts) -> bool {
        TableSize::ALL.iter().all(|&s| self.get(s) <= other.get(s))
    }

    pub fn saturating_sub(&self, other: &TableCounts) -> TableCounts {
        TableCounts {
            two: self.two.saturating_sub(other.two),
            four: self.four.saturating_sub(other.four),
            six: self.six.saturating_sub(other.six),
        }
    }

    pub fn add(&self, other: &TableCounts) -> TableCounts {
        TableCounts {
            two: self.two + other.two,
            four: self.four + other.four,
            six: self.six + other.six,
        }
    }
}

/// Daily opening hours as offsets from local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hours {
    AllDay,
    Daily { open: Ms, close: Ms },
}

impl Hours {
    pub fn daily(open: Ms, close: Ms) -> Self {
        Hours::Daily { open, close }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            Hours::AllDay => true,
            Hours::Daily { open, close } => 0 <= open && open < close && close <= DAY_MS,
        }
    }

    /// True if the window lies entirely inside one day's opening hours.
    /// Windows that cross local midnight only fit an all-day restaurant.
    pub fn contains(&self, window: &Span) -> bool {
        match *self {
            Hours::AllDay => true,
            Hours::Daily { open, close } => {
                if window.duration_ms() > DAY_MS {
                    return false;
                }
                let start_of_day = window.start.rem_euclid(DAY_MS);
                let end_of_day = start_of_day + window.duration_ms();
                open <= start_of_day && end_of_day <= close
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Ulid,
    pub name: String,
    pub tables: TableCounts,
    pub endorsements: EndorsementSet,
    pub hours: Hours,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diner {
    pub id: Ulid,
    pub name: String,
    pub preferences: EndorsementSet,
}

/// The group of diners asking for one reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    /// Sorted, deduplicated. Empty for anonymous parties.
    pub diners: Vec<Ulid>,
    pub size: u32,
    /// Union of every diner's preferences.
    pub required: EndorsementSet,
}

impl Party {
    /// A party known only by its size and combined requirements.
    pub fn anonymous(size: u32, required: EndorsementSet) -> Self {
        Self {
            diners: Vec::new(),
            size,
            required,
        }
    }

    pub fn from_diners<'a>(diners: impl IntoIterator<Item = &'a Diner>) -> Self {
        let mut ids = Vec::new();
        let mut required = EndorsementSet::new();
        for d in diners {
            ids.push(d.id);
            required.extend(d.preferences.iter().cloned());
        }
        ids.sort();
        ids.dedup();
        Self {
            size: ids.len() as u32,
            diners: ids,
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub restaurant_id: Ulid,
    pub diners: Vec<Ulid>,
    pub party_size: u32,
    pub window: Span,
    pub tables: TableCounts,
}

/// Flat event records. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    RestaurantCreated {
        id: Ulid,
        name: String,
        tables: TableCounts,
        endorsements: EndorsementSet,
        hours: Hours,
    },
    DinerRegistered {
        id: Ulid,
        name: String,
        preferences: EndorsementSet,
    },
    ReservationCommitted {
        id: Ulid,
        restaurant_id: Ulid,
        diners: Vec<Ulid>,
        party_size: u32,
        window: Span,
        tables: TableCounts,
    },
    ReservationCancelled {
        id: Ulid,
        restaurant_id: Ulid,
    },
}

impl Event {
    pub fn committed(r: &Reservation) -> Self {
        Event::ReservationCommitted {
            id: r.id,
            restaurant_id: r.restaurant_id,
            diners: r.diners.clone(),
            party_size: r.party_size,
            window: r.window,
            tables: r.tables,
        }
    }

    /// Restaurant an event applies to, if any.
    pub fn restaurant_id(&self) -> Option<Ulid> {
        match self {
            Event::RestaurantCreated { id, .. } => Some(*id),
            Event::ReservationCommitted { restaurant_id, .. }
            | Event::ReservationCancelled { restaurant_id, .. } => Some(*restaurant_id),
            Event::DinerRegistered { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One restaurant able to seat a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub restaurant_id: Ulid,
    pub name: String,
    pub tables: TableCounts,
    pub wasted_seats: u32,
}
