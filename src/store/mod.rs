pub mod guard;
pub mod json;

use crate::app::Result;
use crate::domain::{RunMeta, ValidationReport};
use crate::normalizer::RecordSet;

pub use guard::{CommitGuard, GuardVerdict};
pub use json::JsonStore;

pub trait Store: Send + Sync {
    /// Load the persisted collection; a missing or corrupt file yields an empty set
    fn load(&self) -> Result<RecordSet>;

    /// Sort, compute metadata and write the dataset plus the recheck queue
    fn save(&self, records: &RecordSet, new_this_run: usize) -> Result<RunMeta>;

    fn write_validation(&self, report: &ValidationReport) -> Result<()>;
}

/// Save the collection, run the commit guard and record its verdict.
///
/// The dataset is written whether or not the guard passes; the verdict tells
/// the caller whether the output may be promoted.
pub fn publish(
    store: &dyn Store,
    records: &RecordSet,
    new_this_run: usize,
    guard: CommitGuard,
) -> Result<(RunMeta, GuardVerdict)> {
    let meta = store.save(records, new_this_run)?;
    let verdict = guard.evaluate(&meta);

    let all: Vec<_> = records.iter().cloned().collect();
    let report = ValidationReport::new(
        meta.clone(),
        &all,
        verdict.as_str().to_string(),
        verdict.is_pass(),
    );
    store.write_validation(&report)?;

    Ok((meta, verdict))
}
