//! Bounded, time-ordered history of the tracked entity.
//!
//! The simulator appends one [`Position`] per tick at the newest end; once
//! the buffer holds more than `retention` entries the oldest ones fall off
//! the front. Entries are therefore always sorted by `server_time`, which
//! lets [`PositionHistory::nearest_to`] binary-search instead of scanning.
//!
//! # Tie rule
//!
//! When two entries are equally close to the target time, the one that
//! comes first in store order wins: the older entry, and for duplicate
//! server times the one appended first. This is the same answer a
//! front-to-back linear scan with a strict `<` comparison would give.
//!
//! # Sharing
//!
//! The tick loop and every session task share one history through
//! [`SharedHistory`]. Locks are held only around the in-memory work; the
//! durable mirror is written after the lock is released.

use std::collections::VecDeque;
use std::sync::Arc;

use rewind_types::Position;
use tokio::sync::RwLock;

/// History shared between the tick loop and session tasks.
pub type SharedHistory = Arc<RwLock<PositionHistory>>;

/// Errors from history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// A retention of zero would keep nothing.
    #[error("history retention must be at least 1")]
    ZeroRetention,

    /// The appended position is older than the newest stored entry.
    #[error("position at server time {server_time} is older than newest entry at {newest}")]
    OutOfOrder {
        /// Server time of the rejected position.
        server_time: i64,
        /// Server time of the newest stored entry.
        newest: i64,
    },
}

/// The entry closest to a requested time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestMatch {
    /// The stored position.
    pub position: Position,
    /// `|position.server_time - target|`, milliseconds.
    pub time_diff_ms: i64,
}

/// Ring of the most recent positions, oldest first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    entries: VecDeque<Position>,
    retention: usize,
}

impl PositionHistory {
    /// Create an empty history that keeps at most `retention` entries.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ZeroRetention`] if `retention` is 0.
    pub fn new(retention: usize) -> Result<Self, HistoryError> {
        if retention == 0 {
            return Err(HistoryError::ZeroRetention);
        }
        Ok(Self {
            entries: VecDeque::with_capacity(retention.saturating_add(1)),
            retention,
        })
    }

    /// Wrap a new history for sharing across tasks.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ZeroRetention`] if `retention` is 0.
    pub fn shared(retention: usize) -> Result<SharedHistory, HistoryError> {
        Ok(Arc::new(RwLock::new(Self::new(retention)?)))
    }

    /// Append at the newest end, evicting from the oldest end past the
    /// retention bound. Returns how many entries were evicted.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::OutOfOrder`] if `position` is older than the
    /// newest entry; the history is left unchanged.
    pub fn append(&mut self, position: Position) -> Result<usize, HistoryError> {
        if let Some(newest) = self.entries.back() {
            if position.server_time < newest.server_time {
                return Err(HistoryError::OutOfOrder {
                    server_time: position.server_time,
                    newest: newest.server_time,
                });
            }
        }

        self.entries.push_back(position);

        let mut evicted = 0_usize;
        while self.entries.len() > self.retention {
            self.entries.pop_front();
            evicted = evicted.saturating_add(1);
        }
        Ok(evicted)
    }

    /// Find the entry minimizing `|server_time - target|`.
    ///
    /// Returns `None` only when the history is empty. See the module docs
    /// for the tie rule.
    pub fn nearest_to(&self, target: i64) -> Option<NearestMatch> {
        // First entry at or after the target; the earliest of any duplicates.
        let split = self.entries.partition_point(|e| e.server_time < target);
        let after = self.entries.get(split);

        // Last entry before the target, rewound to the first of its duplicates.
        let before = split
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|last| {
                let first = self
                    .entries
                    .partition_point(|e| e.server_time < last.server_time);
                self.entries.get(first).unwrap_or(last)
            });

        let chosen = match (before, after) {
            (Some(b), Some(a)) => {
                if time_diff(a, target) < time_diff(b, target) {
                    a
                } else {
                    b
                }
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => return None,
        };

        Some(NearestMatch {
            position: *chosen,
            time_diff_ms: time_diff(chosen, target),
        })
    }

    /// The newest entry.
    pub fn latest(&self) -> Option<&Position> {
        self.entries.back()
    }

    /// The oldest entry still retained.
    pub fn oldest(&self) -> Option<&Position> {
        self.entries.front()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.entries.iter()
    }

    /// Copy of all retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<Position> {
        self.entries.iter().copied().collect()
    }
}

fn time_diff(position: &Position, target: i64) -> i64 {
    i64::try_from(position.server_time.abs_diff(target)).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rewind_types::Coordinates;

    use super::*;

    fn pos(server_time: i64, x: f64) -> Position {
        Position::new(Coordinates::new(x, 1.0, 0.0), 0, server_time)
    }

    fn filled(times: &[i64]) -> PositionHistory {
        let mut history = PositionHistory::new(times.len().max(1)).unwrap();
        for (i, t) in times.iter().enumerate() {
            history.append(pos(*t, f64::from(u32::try_from(i).unwrap()))).unwrap();
        }
        history
    }

    /// Front-to-back scan keeping the first strictly better entry.
    fn linear_nearest(history: &PositionHistory, target: i64) -> Option<NearestMatch> {
        let mut best: Option<NearestMatch> = None;
        for p in history.iter() {
            let diff = time_diff(p, target);
            if best.is_none_or(|b| diff < b.time_diff_ms) {
                best = Some(NearestMatch {
                    position: *p,
                    time_diff_ms: diff,
                });
            }
        }
        best
    }

    #[test]
    fn zero_retention_is_rejected() {
        assert!(matches!(
            PositionHistory::new(0),
            Err(HistoryError::ZeroRetention)
        ));
    }

    #[test]
    fn never_exceeds_retention_and_stays_ordered() {
        let mut history = PositionHistory::new(10).unwrap();
        for tick in 0..250_i64 {
            history.append(pos(tick * 25, 0.0)).unwrap();
            assert!(history.len() <= 10);
            let times: Vec<i64> = history.iter().map(|p| p.server_time).collect();
            assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.oldest().unwrap().server_time, 240 * 25);
        assert_eq!(history.latest().unwrap().server_time, 249 * 25);
    }

    #[test]
    fn append_reports_evictions() {
        let mut history = PositionHistory::new(2).unwrap();
        assert_eq!(history.append(pos(0, 0.0)).unwrap(), 0);
        assert_eq!(history.append(pos(1, 0.0)).unwrap(), 0);
        assert_eq!(history.append(pos(2, 0.0)).unwrap(), 1);
    }

    #[test]
    fn out_of_order_append_is_rejected_without_change() {
        let mut history = filled(&[10, 20]);
        let err = history.append(pos(15, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::OutOfOrder {
                server_time: 15,
                newest: 20
            }
        ));
        assert_eq!(history.len(), 2);
        // Equal server time is allowed (non-decreasing).
        history.append(pos(20, 9.0)).unwrap();
    }

    #[test]
    fn empty_history_has_no_nearest() {
        let history = PositionHistory::new(5).unwrap();
        assert!(history.nearest_to(100).is_none());
        assert!(history.latest().is_none());
    }

    #[test]
    fn exact_match_has_zero_difference() {
        let history = filled(&[940, 960, 980, 1000]);
        let found = history.nearest_to(980).unwrap();
        assert_eq!(found.position.server_time, 980);
        assert_eq!(found.time_diff_ms, 0);
    }

    #[test]
    fn targets_outside_the_range_clamp_to_the_ends() {
        let history = filled(&[100, 200, 300]);
        let early = history.nearest_to(-5_000).unwrap();
        assert_eq!(early.position.server_time, 100);
        assert_eq!(early.time_diff_ms, 5_100);
        let late = history.nearest_to(10_000).unwrap();
        assert_eq!(late.position.server_time, 300);
        assert_eq!(late.time_diff_ms, 9_700);
    }

    #[test]
    fn equidistant_tie_goes_to_the_older_entry() {
        let history = filled(&[100, 200]);
        let found = history.nearest_to(150).unwrap();
        assert_eq!(found.position.server_time, 100);
        assert_eq!(found.time_diff_ms, 50);
    }

    #[test]
    fn duplicate_times_resolve_to_the_first_appended() {
        // x encodes insertion index.
        let history = filled(&[100, 200, 200, 200, 300]);
        let exact = history.nearest_to(200).unwrap();
        assert!((exact.position.coordinates.x - 1.0).abs() < f64::EPSILON);
        let below = history.nearest_to(240).unwrap();
        assert!((below.position.coordinates.x - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn binary_search_agrees_with_linear_scan() {
        let layouts: [&[i64]; 5] = [
            &[0],
            &[0, 25, 50, 75, 100],
            &[10, 10, 10, 40, 41, 41, 90],
            &[-30, -10, 0, 0, 5, 100, 101, 102],
            &[7, 19, 31, 31, 31, 62, 63, 200, 200],
        ];
        for times in layouts {
            let history = filled(times);
            for target in -60..=260_i64 {
                assert_eq!(
                    history.nearest_to(target),
                    linear_nearest(&history, target),
                    "layout {times:?}, target {target}"
                );
            }
        }
    }

    #[test]
    fn extreme_targets_do_not_overflow() {
        let history = filled(&[-1, 1]);
        let found = history.nearest_to(i64::MIN).unwrap();
        assert_eq!(found.position.server_time, -1);
        let far = history.nearest_to(i64::MAX).unwrap();
        assert_eq!(far.position.server_time, 1);
    }

    #[test]
    fn snapshot_copies_in_order() {
        let history = filled(&[1, 2, 3]);
        let times: Vec<i64> = history.snapshot().iter().map(|p| p.server_time).collect();
        assert_eq!(times, vec![1, 2, 3]);
        assert_eq!(history.retention(), 3);
    }

    #[tokio::test]
    async fn shared_history_serves_concurrent_readers() {
        let shared = PositionHistory::shared(50).unwrap();
        let writer = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                for t in 0..200_i64 {
                    shared.write().await.append(pos(t, 0.0)).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let mut readers = Vec::new();
        for _ in 0..4 {
            let shared = Arc::clone(&shared);
            readers.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let guard = shared.read().await;
                    assert!(guard.len() <= 50);
                    if let Some(found) = guard.nearest_to(100) {
                        assert!(found.time_diff_ms >= 0);
                    }
                    drop(guard);
                    tokio::task::yield_now().await;
                }
            }));
        }
        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(shared.read().await.len(), 50);
    }
}
