//! # spinring-test-support
//!
//! Testing infrastructure for spinring rings.
//!
//! ## Components
//!
//! - **Pattern** - Every valid writer/reader/policy/ordering combination
//! - **StressRunner** - Time-bounded stress runs with progress and metrics
//! - **SequenceChecker** - Per-writer ordering and gap detection
//! - **drive** - Threaded writers and readers over an object ring

pub mod drive;
pub mod pattern;
pub mod stress;
pub mod verify;

pub use drive::{ drive_object_ring, DriveReport, Tagged };
pub use pattern::{ all_patterns, Pattern, PUBLISHING_ORDERS };
pub use stress::{ print_summary, StressConfig, StressCounters, StressMetrics, StressRunner };
pub use verify::{ SequenceChecker, SequenceStats, SequenceStatus };
