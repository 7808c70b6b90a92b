//! Teacher/supervisor assignment engine.
//!
//! Pure computation over an in-memory snapshot: the usage index ranks candidates, the
//! partitioner splits the required headcount across districts (or centers), and the selector
//! fills each partition by quota group without letting a workstation contribute twice.
//! Nothing here touches the database.

pub mod conflict;
pub mod history;
pub mod model;
pub mod partition;
pub mod select;

pub use conflict::{
    check_bulk, check_candidate, CheckOptions, ConflictOutcome, ExistingAssignment, JobRef,
};
pub use model::{
    normalize_sex, Candidate, CandidateKind, PartitionBy, PastAssignment, QuotaSplit, Scope,
    SelectionCriteria,
};
pub use select::{generate_draft, Draft};

/// Display-only padding for unfilled positions.
pub fn vacant_slots(total_required: usize, assigned: usize) -> usize {
    total_required.saturating_sub(assigned)
}
