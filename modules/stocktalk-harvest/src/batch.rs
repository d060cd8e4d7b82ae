// Batch accumulation and durable flush.
//
// BatchSink is the storage seam: ParquetBatchStore in production, in-memory
// and failing sinks in tests.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use stocktalk_common::Record;

use crate::error::StorageError;
use crate::storage::{self, BatchFile};

pub trait BatchSink: Send {
    /// Durably write one batch as a new file. Never replaces an earlier one.
    fn write_batch(&mut self, records: &[Record]) -> Result<BatchFile, StorageError>;
}

/// Writes each batch as its own Parquet file under one directory.
pub struct ParquetBatchStore {
    dir: PathBuf,
    next_sequence: u64,
}

impl ParquetBatchStore {
    /// Create `dir` if needed. Sequence numbers continue after the highest
    /// batch already present so earlier runs' files are left alone.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let next_sequence = storage::discover_batch_files(&dir)?
            .last()
            .map_or(1, |f| f.sequence + 1);
        debug!(dir = %dir.display(), next_sequence, "Opened batch store");

        Ok(Self { dir, next_sequence })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

impl BatchSink for ParquetBatchStore {
    fn write_batch(&mut self, records: &[Record]) -> Result<BatchFile, StorageError> {
        let sequence = self.next_sequence;
        let path = self
            .dir
            .join(storage::batch_file_name(sequence, Utc::now()));

        storage::write_records(&path, records)?;
        self.next_sequence += 1;

        Ok(BatchFile { sequence, path })
    }
}

/// In-memory batch with a size threshold, flushed through a [`BatchSink`].
pub struct BatchAccumulator<S: BatchSink> {
    sink: S,
    batch: Vec<Record>,
    capacity: usize,
    written: Vec<BatchFile>,
}

impl<S: BatchSink> BatchAccumulator<S> {
    /// `capacity` is the flush threshold; zero is treated as one.
    pub fn new(sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(capacity),
            capacity,
            written: Vec::new(),
        }
    }

    pub fn append(&mut self, record: Record) {
        self.batch.push(record);
    }

    pub fn should_flush(&self) -> bool {
        self.batch.len() >= self.capacity
    }

    /// Write the current batch to a new file, then clear it. On failure the
    /// records stay buffered so a later flush can retry them.
    pub fn flush(&mut self) -> Result<BatchFile, StorageError> {
        let file = self.sink.write_batch(&self.batch)?;
        info!(
            batch = file.sequence,
            rows = self.batch.len(),
            path = %file.path.display(),
            "Flushed batch"
        );
        self.batch.clear();
        self.written.push(file.clone());
        Ok(file)
    }

    /// Flush a trailing partial batch; no file is written for an empty batch.
    pub fn flush_if_non_empty(&mut self) -> Result<Option<BatchFile>, StorageError> {
        if self.batch.is_empty() {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batch files written by this accumulator, in flush order.
    pub fn written(&self) -> &[BatchFile] {
        &self.written
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
