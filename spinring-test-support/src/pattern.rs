//! Writer/reader/policy/ordering combinations a ring can be configured with.

use std::fmt;

use spinring::{ Cardinality, FullPolicy, MemoryOrder, RingBufferConfig };

/// Orderings that may publish across threads.
pub const PUBLISHING_ORDERS: [MemoryOrder; 3] = [
    MemoryOrder::Opaque,
    MemoryOrder::ReleaseAcquire,
    MemoryOrder::Volatile,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub writers: Cardinality,
    pub readers: Cardinality,
    pub policy: FullPolicy,
    pub atomic_claim: bool,
    pub memory_order: MemoryOrder,
}

impl Pattern {
    pub fn config(&self, capacity: usize) -> spinring::Result<RingBufferConfig> {
        RingBufferConfig::new(capacity)?
            .with_writers(self.writers)
            .with_readers(self.readers)
            .with_policy(self.policy)
            .with_atomic_claim(self.atomic_claim)
            .with_memory_order(self.memory_order)
    }

    /// Whether every put is guaranteed to be taken
    pub fn is_lossless(&self) -> bool {
        self.policy == FullPolicy::Blocking
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |c: Cardinality| if c.is_many() { "m" } else { "s" };
        let policy = match self.policy {
            FullPolicy::Overwriting => "overwriting",
            FullPolicy::Blocking => "blocking",
            FullPolicy::Discarding => "discarding",
        };
        write!(f, "{}p{}c-{}", side(self.writers), side(self.readers), policy)?;
        if self.atomic_claim {
            f.write_str("-cas")?;
        }
        match self.memory_order {
            MemoryOrder::ReleaseAcquire => Ok(()),
            MemoryOrder::Plain => f.write_str("-plain"),
            MemoryOrder::Opaque => f.write_str("-opaque"),
            MemoryOrder::Volatile => f.write_str("-volatile"),
        }
    }
}

/// Every combination a ring accepts, under every publishing ordering: many
/// writers with many readers only block, and compare-and-swap claim is many
/// writers, one reader, blocking.
pub fn all_patterns() -> Vec<Pattern> {
    let sides = [Cardinality::One, Cardinality::Many];
    let policies = [FullPolicy::Overwriting, FullPolicy::Blocking, FullPolicy::Discarding];

    let mut patterns = Vec::new();
    for memory_order in PUBLISHING_ORDERS {
        for writers in sides {
            for readers in sides {
                for policy in policies {
                    if writers.is_many() && readers.is_many() && policy != FullPolicy::Blocking {
                        continue;
                    }
                    patterns.push(Pattern {
                        writers,
                        readers,
                        policy,
                        atomic_claim: false,
                        memory_order,
                    });
                }
            }
        }
        patterns.push(Pattern {
            writers: Cardinality::Many,
            readers: Cardinality::One,
            policy: FullPolicy::Blocking,
            atomic_claim: true,
            memory_order,
        });
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinring::StorageKind;

    #[test]
    fn test_all_patterns_validate() {
        let patterns = all_patterns();
        assert_eq!(patterns.len(), 33);
        for pattern in patterns {
            let config = pattern.config(64).unwrap();
            assert!(config.validate(StorageKind::Object).is_ok(), "{}", pattern);
        }
    }

    #[test]
    fn test_every_ordering_is_covered() {
        let patterns = all_patterns();
        for order in PUBLISHING_ORDERS {
            assert_eq!(patterns.iter().filter(|p| p.memory_order == order).count(), 11);
        }
    }

    #[test]
    fn test_pattern_names() {
        let names: Vec<String> = all_patterns()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert!(names.contains(&"spsc-overwriting".to_string()));
        assert!(names.contains(&"mpmc-blocking".to_string()));
        assert!(names.contains(&"mpsc-blocking-cas".to_string()));
        assert!(names.contains(&"spmc-discarding-opaque".to_string()));
        assert!(names.contains(&"mpsc-blocking-cas-volatile".to_string()));
        assert!(!names.contains(&"mpmc-discarding".to_string()));
    }

    #[test]
    fn test_plain_ordering_is_rejected() {
        let pattern = Pattern {
            writers: Cardinality::One,
            readers: Cardinality::One,
            policy: FullPolicy::Blocking,
            atomic_claim: false,
            memory_order: MemoryOrder::Plain,
        };
        assert!(pattern.config(64).is_err());
    }
}
