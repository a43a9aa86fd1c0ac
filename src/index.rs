use ulid::Ulid;

use crate::model::*;

/// Commit rejected: the assignment no longer fits the free tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityConflict {
    pub requested: TableCounts,
    pub free: TableCounts,
}

/// Per-restaurant calendar of committed reservations.
///
/// Reservations are kept sorted by `window.start`, which lets overlap queries
/// skip everything starting at or after the query end with a binary search.
#[derive(Debug, Clone)]
pub struct IntervalIndex {
    owned: TableCounts,
    reservations: Vec<Reservation>,
}

impl IntervalIndex {
    pub fn new(owned: TableCounts) -> Self {
        Self {
            owned,
            reservations: Vec::new(),
        }
    }

    pub fn owned(&self) -> TableCounts {
        self.owned
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    /// Reservations whose window overlaps `query`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.window.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.window.end > query.start)
    }

    /// Tables held by every reservation overlapping `window`, summed per class.
    pub fn used(&self, window: &Span) -> TableCounts {
        self.overlapping(window)
            .fold(TableCounts::ZERO, |acc, r| acc.add(&r.tables))
    }

    /// Owned tables minus those held by any overlapping reservation, floored at 0.
    pub fn free_capacity(&self, window: &Span) -> TableCounts {
        self.owned.saturating_sub(&self.used(window))
    }

    /// Would `tables` still fit during `window`?
    pub fn check_fits(&self, window: &Span, tables: &TableCounts) -> Result<(), CapacityConflict> {
        let free = self.free_capacity(window);
        if tables.fits_within(&free) {
            Ok(())
        } else {
            Err(CapacityConflict {
                requested: *tables,
                free,
            })
        }
    }

    /// Insert a reservation if its tables still fit in the window.
    pub fn commit(&mut self, reservation: Reservation) -> Result<(), CapacityConflict> {
        self.check_fits(&reservation.window, &reservation.tables)?;
        self.insert(reservation);
        Ok(())
    }

    /// Insert without a capacity check. Only for WAL replay, where the log
    /// already holds commits that passed `commit`.
    pub(crate) fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.window.start <= reservation.window.start);
        self.reservations.insert(pos, reservation);
    }

    /// Remove a reservation, freeing its tables for every window it overlapped.
    pub fn cancel(&mut self, id: &Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == *id)?;
        Some(self.reservations.remove(pos))
    }
}
