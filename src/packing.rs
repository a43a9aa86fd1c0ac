use crate::model::TableCounts;

/// A seating assignment for one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packing {
    pub tables: TableCounts,
    pub wasted: u32,
}

impl Packing {
    /// Ordering key: least waste, then fewest tables, then fewest six-tops,
    /// then fewest four-tops. Lower is better.
    fn rank(&self) -> (u32, u32, u32, u32) {
        (self.wasted, self.tables.tables(), self.tables.six, self.tables.four)
    }
}

/// Choose the minimal-waste way to seat `party_size` diners using at most
/// `free` tables of each class, or `None` if no combination has enough seats.
///
/// A party may be split across several tables. With three fixed classes the
/// search is a bounded enumeration: no optimal assignment uses more six-tops
/// than `ceil(size / 6)` (dropping one would still seat everyone with less
/// waste), likewise four-tops against the residual, and two-tops are derived.
pub fn pack(party_size: u32, free: &TableCounts) -> Option<Packing> {
    if free.seats() < party_size {
        return None;
    }

    let mut best: Option<Packing> = None;
    let max_six = free.six.min(party_size.div_ceil(6));
    for six in 0..=max_six {
        let after_six = party_size.saturating_sub(6 * six);
        let max_four = free.four.min(after_six.div_ceil(4));
        for four in 0..=max_four {
            let after_four = after_six.saturating_sub(4 * four);
            let two = after_four.div_ceil(2);
            if two > free.two {
                continue;
            }
            let tables = TableCounts::new(two, four, six);
            let candidate = Packing {
                tables,
                wasted: tables.seats() - party_size,
            };
            if best.is_none_or(|b| candidate.rank() < b.rank()) {
                best = Some(candidate);
            }
        }
    }
    best
}

/// Exact feasibility test: does any assignment seat the party?
pub fn feasible(party_size: u32, free: &TableCounts) -> bool {
    pack(party_size, free).is_some()
}
