pub mod analysis;
pub mod batch;
pub mod consolidate;
pub mod dedup;
pub mod error;
pub mod harvester;
pub mod query;
pub mod shutdown;
pub mod source;
pub mod sources;
pub mod stats;
pub mod storage;
pub mod window;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use batch::{BatchAccumulator, BatchSink, ParquetBatchStore};
pub use consolidate::Consolidator;
pub use error::{HarvestError, StorageError};
pub use harvester::{HarvestConfig, Harvester};
pub use query::SearchQuery;
pub use shutdown::ShutdownController;
pub use source::{RecordSource, SourceError, SourceHandle};
pub use stats::{ConsolidationOutcome, HarvestReport, HarvestStats, StopReason};
