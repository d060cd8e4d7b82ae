// Final merge of a run's batch files into one deduplicated dataset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stocktalk_common::Record;

use crate::error::StorageError;
use crate::stats::ConsolidationOutcome;
use crate::storage::{self, BatchFile};

/// Records from a set of batch files, deduplicated by id.
#[derive(Debug, Clone)]
pub struct Merged {
    pub records: Vec<Record>,
    pub duplicates_dropped: usize,
}

pub struct Consolidator {
    output_dir: PathBuf,
}

impl Consolidator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Read `files` in sequence order and keep the first record per id.
    pub fn merge(files: &[BatchFile]) -> Result<Merged, StorageError> {
        let mut ordered: Vec<&BatchFile> = files.iter().collect();
        ordered.sort_by_key(|f| f.sequence);

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates_dropped = 0;

        for file in ordered {
            for record in storage::read_records(&file.path)? {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    duplicates_dropped += 1;
                }
            }
        }

        Ok(Merged {
            records,
            duplicates_dropped,
        })
    }

    /// Merge `files` and write the result as `stock_tweets_<completed_at>.parquet`.
    /// With no files there is nothing to write and the outcome is `Empty`.
    pub fn consolidate(
        &self,
        files: &[BatchFile],
        completed_at: DateTime<Utc>,
    ) -> Result<ConsolidationOutcome, StorageError> {
        if files.is_empty() {
            warn!(dir = %self.output_dir.display(), "No batch files to consolidate; no dataset written");
            return Ok(ConsolidationOutcome::Empty);
        }

        info!(files = files.len(), "Combining batch files and deduplicating");
        let merged = Self::merge(files)?;

        let path = self
            .output_dir
            .join(storage::dataset_file_name(completed_at));
        storage::write_records(&path, &merged.records)?;

        info!(
            rows = merged.records.len(),
            duplicates_dropped = merged.duplicates_dropped,
            path = %path.display(),
            "Wrote consolidated dataset"
        );

        Ok(ConsolidationOutcome::Written {
            path,
            rows: merged.records.len(),
            duplicates_dropped: merged.duplicates_dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchSink, ParquetBatchStore};
    use crate::testing::{sorted_ids, tweet};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn write_batches(dir: &Path, batches: &[&[&str]]) -> Vec<BatchFile> {
        let mut store = ParquetBatchStore::open(dir).unwrap();
        batches
            .iter()
            .map(|ids| {
                let records: Vec<Record> = ids.iter().map(|id| tweet(id, 5)).collect();
                store.write_batch(&records).unwrap()
            })
            .collect()
    }

    #[test]
    fn merge_drops_ids_repeated_across_batches() {
        let dir = tempdir().unwrap();
        let files = write_batches(dir.path(), &[&["a", "b"], &["b", "c"], &["a", "d"]]);

        let merged = Consolidator::merge(&files).unwrap();
        assert_eq!(sorted_ids(&merged.records), vec!["a", "b", "c", "d"]);
        assert_eq!(merged.duplicates_dropped, 2);
    }

    #[test]
    fn consolidating_twice_yields_the_same_records() {
        let dir = tempdir().unwrap();
        let files = write_batches(dir.path(), &[&["a", "b", "c"], &["c", "d"]]);
        let consolidator = Consolidator::new(dir.path());

        let first_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let second_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap();
        let paths: Vec<PathBuf> = [first_at, second_at]
            .into_iter()
            .map(|at| match consolidator.consolidate(&files, at).unwrap() {
                ConsolidationOutcome::Written { path, .. } => path,
                ConsolidationOutcome::Empty => panic!("expected a dataset"),
            })
            .collect();

        let mut first = storage::read_records(&paths[0]).unwrap();
        let mut second = storage::read_records(&paths[1]).unwrap();
        first.sort_by(|a, b| a.id.cmp(&b.id));
        second.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn merge_order_does_not_depend_on_input_order() {
        let dir = tempdir().unwrap();
        let files = write_batches(dir.path(), &[&["a"], &["b"]]);
        let reversed: Vec<BatchFile> = files.iter().rev().cloned().collect();

        let forward = Consolidator::merge(&files).unwrap();
        let backward = Consolidator::merge(&reversed).unwrap();
        assert_eq!(forward.records, backward.records);
    }

    #[test]
    fn no_batches_means_no_dataset() {
        let dir = tempdir().unwrap();
        let consolidator = Consolidator::new(dir.path());

        let outcome = consolidator.consolidate(&[], Utc::now()).unwrap();
        assert_eq!(outcome, ConsolidationOutcome::Empty);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_batch_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let files = vec![BatchFile {
            sequence: 1,
            path: dir.path().join("tweets_batch_000001_20240301120000.parquet"),
        }];
        let consolidator = Consolidator::new(dir.path());
        assert!(matches!(
            consolidator.consolidate(&files, Utc::now()),
            Err(StorageError::Io(_))
        ));
    }
}
