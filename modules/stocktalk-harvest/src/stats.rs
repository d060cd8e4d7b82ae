use std::fmt;
use std::path::PathBuf;

use uuid::Uuid;

use crate::storage::BatchFile;

/// Why the collection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    SourceExhausted,
    ShutdownRequested,
    RetriesExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::SourceExhausted => write!(f, "source exhausted"),
            StopReason::ShutdownRequested => write!(f, "shutdown requested"),
            StopReason::RetriesExhausted => write!(f, "retries exhausted (partial result)"),
        }
    }
}

/// Counters from the collection loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub out_of_window: usize,
    pub malformed: usize,
    pub transient_failures: u32,
    pub reacquisitions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// Nothing was ever flushed, so no dataset was written.
    Empty,
    Written {
        path: PathBuf,
        rows: usize,
        duplicates_dropped: usize,
    },
}

impl fmt::Display for ConsolidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationOutcome::Empty => write!(f, "no dataset written (nothing collected)"),
            ConsolidationOutcome::Written {
                path,
                rows,
                duplicates_dropped,
            } => write!(
                f,
                "{} ({rows} rows, {duplicates_dropped} duplicates removed)",
                path.display()
            ),
        }
    }
}

/// Output of the collection phase, before consolidation.
#[derive(Debug, Clone)]
pub struct CollectReport {
    pub stats: HarvestStats,
    pub stop_reason: StopReason,
    pub batches: Vec<BatchFile>,
}

#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub stats: HarvestStats,
    pub stop_reason: StopReason,
    pub batches: Vec<BatchFile>,
    pub consolidation: ConsolidationOutcome,
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        writeln!(f, "Run:                {}", self.run_id)?;
        writeln!(f, "Stopped because:    {}", self.stop_reason)?;
        writeln!(f, "Records accepted:   {}", self.stats.accepted)?;
        writeln!(f, "Duplicates dropped: {}", self.stats.duplicates)?;
        writeln!(f, "Out of window:      {}", self.stats.out_of_window)?;
        writeln!(f, "Malformed dropped:  {}", self.stats.malformed)?;
        writeln!(f, "Source failures:    {}", self.stats.transient_failures)?;
        writeln!(f, "Source reopened:    {}", self.stats.reacquisitions)?;
        writeln!(f, "Batch files:        {}", self.batches.len())?;
        write!(f, "Dataset:            {}", self.consolidation)
    }
}
