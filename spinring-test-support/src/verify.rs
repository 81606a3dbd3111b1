//! Ordering verification for values taken from a ring.

use std::collections::HashMap;

/// Checks that each writer's sequence numbers arrive in increasing order.
///
/// Gaps are recorded, not treated as errors: overwriting and discarding
/// rings lose values, and with many readers each reader sees only part of a
/// writer's stream. A sequence at or below one already seen from the same
/// writer is out of order.
#[derive(Debug, Default)]
pub struct SequenceChecker {
    /// Next expected sequence per writer
    next_expected: HashMap<u64, u64>,
    /// Gaps detected: (writer, start, end)
    gaps: Vec<(u64, u64, u64)>,
    total_seen: u64,
    out_of_order: u64,
}

impl SequenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check sequence `seq` from `writer`
    pub fn check(&mut self, writer: u64, seq: u64) -> SequenceStatus {
        self.total_seen += 1;
        let expected = self.next_expected.entry(writer).or_insert(0);

        if seq == *expected {
            *expected = seq + 1;
            SequenceStatus::InOrder
        } else if seq < *expected {
            self.out_of_order += 1;
            SequenceStatus::OutOfOrder
        } else {
            let gap = (writer, *expected, seq - 1);
            self.gaps.push(gap);
            *expected = seq + 1;
            SequenceStatus::Gap { start: gap.1, end: gap.2 }
        }
    }

    pub fn gaps(&self) -> &[(u64, u64, u64)] {
        &self.gaps
    }

    /// Number of sequences skipped across all writers
    pub fn total_gap_size(&self) -> u64 {
        self.gaps
            .iter()
            .map(|(_, start, end)| end - start + 1)
            .sum()
    }

    pub fn stats(&self) -> SequenceStats {
        SequenceStats {
            total_seen: self.total_seen,
            writers_seen: self.next_expected.len() as u64,
            gap_count: self.gaps.len() as u64,
            total_missing: self.total_gap_size(),
            out_of_order: self.out_of_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceStatus {
    InOrder,
    OutOfOrder,
    Gap {
        start: u64,
        end: u64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub total_seen: u64,
    pub writers_seen: u64,
    pub gap_count: u64,
    pub total_missing: u64,
    pub out_of_order: u64,
}

impl SequenceStats {
    pub fn is_perfect(&self) -> bool {
        self.gap_count == 0 && self.out_of_order == 0
    }

    /// Combine stats from several readers
    pub fn merge(&mut self, other: &SequenceStats) {
        self.total_seen += other.total_seen;
        self.writers_seen = self.writers_seen.max(other.writers_seen);
        self.gap_count += other.gap_count;
        self.total_missing += other.total_missing;
        self.out_of_order += other.out_of_order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_checker_in_order() {
        let mut checker = SequenceChecker::new();
        for seq in 0..100 {
            assert_eq!(checker.check(0, seq), SequenceStatus::InOrder);
            assert_eq!(checker.check(1, seq), SequenceStatus::InOrder);
        }

        let stats = checker.stats();
        assert!(stats.is_perfect());
        assert_eq!(stats.total_seen, 200);
        assert_eq!(stats.writers_seen, 2);
    }

    #[test]
    fn test_sequence_checker_gap() {
        let mut checker = SequenceChecker::new();
        checker.check(7, 0);
        checker.check(7, 1);
        // Skip 2, 3, 4
        let status = checker.check(7, 5);

        assert_eq!(status, SequenceStatus::Gap { start: 2, end: 4 });
        assert_eq!(checker.total_gap_size(), 3);
        assert_eq!(checker.gaps(), &[(7, 2, 4)]);
    }

    #[test]
    fn test_sequence_checker_out_of_order() {
        let mut checker = SequenceChecker::new();
        checker.check(0, 0);
        checker.check(0, 2);
        assert_eq!(checker.check(0, 1), SequenceStatus::OutOfOrder);
        // other writers are independent
        assert_eq!(checker.check(1, 0), SequenceStatus::InOrder);

        let stats = checker.stats();
        assert_eq!(stats.out_of_order, 1);
        assert!(!stats.is_perfect());
    }

    #[test]
    fn test_stats_merge() {
        let mut total = SequenceStats::default();
        total.merge(&SequenceStats { total_seen: 3, writers_seen: 2, ..Default::default() });
        total.merge(&SequenceStats { total_seen: 4, writers_seen: 1, gap_count: 1, ..Default::default() });
        assert_eq!(total.total_seen, 7);
        assert_eq!(total.writers_seen, 2);
        assert_eq!(total.gap_count, 1);
    }
}
