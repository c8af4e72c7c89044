/// Time-series reconciliation.
///
/// Joins a level series and a quality series sampled on unrelated clocks.
/// Every distinct timestamp in either series becomes one record; each side
/// of the record is the nearest reading of that series within `tolerance`,
/// or absent. Lookups are binary searches over the sorted inputs, so a join
/// of n readings costs O(n log n).
///
/// Equidistant readings resolve to the earlier one, so a quality sample
/// halfway between two level samples pairs with the one already observed.

use chrono::{DateTime, Duration, Utc};

use crate::model::{JoinedRecord, Reading};

/// Nearest reading to `t` in `series` (sorted ascending), if within
/// `tolerance`. Ties go to the earlier reading.
pub fn nearest<'a>(series: &'a [Reading], t: DateTime<Utc>, tolerance: Duration) -> Option<&'a Reading> {
    let idx = series.partition_point(|r| r.timestamp < t);
    let before = idx.checked_sub(1).and_then(|i| series.get(i));
    let after = series.get(idx);

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if a.timestamp - t < t - b.timestamp {
                a
            } else {
                b
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    let distance = if best.timestamp >= t {
        best.timestamp - t
    } else {
        t - best.timestamp
    };
    (distance <= tolerance).then_some(best)
}

/// Lazy, ascending join. Built by `join`.
#[derive(Debug, Clone)]
pub struct Join {
    level: Vec<Reading>,
    quality: Vec<Reading>,
    tolerance: Duration,
    next_level: usize,
    next_quality: usize,
}

impl Join {
    /// Smallest timestamp not yet emitted, advancing both cursors past it.
    fn next_timestamp(&mut self) -> Option<DateTime<Utc>> {
        let l = self.level.get(self.next_level).map(|r| r.timestamp);
        let q = self.quality.get(self.next_quality).map(|r| r.timestamp);
        let t = match (l, q) {
            (Some(l), Some(q)) => l.min(q),
            (Some(l), None) => l,
            (None, Some(q)) => q,
            (None, None) => return None,
        };
        while self.level.get(self.next_level).is_some_and(|r| r.timestamp == t) {
            self.next_level += 1;
        }
        while self.quality.get(self.next_quality).is_some_and(|r| r.timestamp == t) {
            self.next_quality += 1;
        }
        Some(t)
    }
}

impl Iterator for Join {
    type Item = JoinedRecord;

    fn next(&mut self) -> Option<JoinedRecord> {
        loop {
            let t = self.next_timestamp()?;
            let level = nearest(&self.level, t, self.tolerance).cloned();
            let quality = nearest(&self.quality, t, self.tolerance).cloned();
            if level.is_none() && quality.is_none() {
                continue;
            }
            return Some(JoinedRecord {
                timestamp: t,
                level,
                quality,
                is_alert: false,
            });
        }
    }
}

/// Joins two series on nearest timestamp. Inputs need not be sorted.
/// A negative tolerance is treated as zero.
pub fn join(mut level: Vec<Reading>, mut quality: Vec<Reading>, tolerance: Duration) -> Join {
    level.sort_by_key(|r| r.timestamp);
    quality.sort_by_key(|r| r.timestamp);
    Join {
        level,
        quality,
        tolerance: tolerance.max(Duration::zero()),
        next_level: 0,
        next_quality: 0,
    }
}
