// The collection loop: pulls records from a source, filters them, batches
// them to disk, and recovers from transient source failures by reopening the
// source with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use stocktalk_common::{Config, RawRecord, Record};

use crate::batch::{BatchAccumulator, BatchSink};
use crate::consolidate::Consolidator;
use crate::dedup::DedupIndex;
use crate::error::{HarvestError, Result};
use crate::query::SearchQuery;
use crate::shutdown::ShutdownController;
use crate::source::{RecordSource, SourceError, SourceHandle};
use crate::stats::{CollectReport, HarvestReport, HarvestStats, StopReason};
use crate::window::RecencyWindow;

const PROGRESS_LOG_INTERVAL: usize = 100;

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub target_count: usize,
    pub batch_size: usize,
    pub window: RecencyWindow,
    pub max_retries: u32,
    pub backoff_base: u32,
    /// Length of one backoff unit; attempt `n` waits `base^n` units.
    pub backoff_unit: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for HarvestConfig {
    fn from(config: &Config) -> Self {
        Self {
            target_count: config.target_count,
            batch_size: config.batch_size,
            window: RecencyWindow::hours(config.window_hours),
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_count == 0 {
            return Err(HarvestError::InvalidConfig(
                "target count must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(HarvestError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(self.backoff_base.saturating_pow(attempt))
    }
}

/// Milliseconds in `d`, clamped to `u64` for very large backoffs.
fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

enum HarvestState {
    Running(Box<dyn SourceHandle>),
    Retrying { attempt: u32 },
    Exhausted,
    Done(StopReason),
}

/// Consecutive source failures. A failure after the current handle produced
/// a newly accepted record starts a new streak.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
    progressed: bool,
}

impl FailureStreak {
    fn note_progress(&mut self) {
        self.progressed = true;
    }

    /// The backoff attempt for this failure, or None once the streak has
    /// used up `max_retries` reopens.
    fn on_failure(&mut self, max_retries: u32) -> Option<u32> {
        if self.progressed {
            self.count = 0;
            self.progressed = false;
        }
        if self.count >= max_retries {
            return None;
        }
        let attempt = self.count;
        self.count += 1;
        Some(attempt)
    }
}

pub struct Harvester {
    source: Arc<dyn RecordSource>,
    config: HarvestConfig,
    shutdown: ShutdownController,
}

impl Harvester {
    pub fn new(
        source: Arc<dyn RecordSource>,
        config: HarvestConfig,
        shutdown: ShutdownController,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            shutdown,
        })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Collect, flush the trailing batch, then consolidate this run's batches.
    pub async fn run<K: BatchSink>(
        &self,
        query: &SearchQuery,
        accumulator: &mut BatchAccumulator<K>,
        consolidator: &Consolidator,
    ) -> Result<HarvestReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("harvest", %run_id, source = self.source.name());

        async move {
            info!(query = %query, target = self.config.target_count, "Harvest starting");
            let collected = self.collect(query, accumulator).await?;
            let consolidation = consolidator.consolidate(&collected.batches, Utc::now())?;

            Ok(HarvestReport {
                run_id,
                stats: collected.stats,
                stop_reason: collected.stop_reason,
                batches: collected.batches,
                consolidation,
            })
        }
        .instrument(span)
        .await
    }

    /// Drive the source until a stop condition, then flush any partial batch.
    /// Storage failures end the run with an error; everything else ends with
    /// a stop reason.
    pub async fn collect<K: BatchSink>(
        &self,
        query: &SearchQuery,
        accumulator: &mut BatchAccumulator<K>,
    ) -> Result<CollectReport> {
        let mut stats = HarvestStats::default();
        let mut dedup = DedupIndex::new();
        let mut streak = FailureStreak::default();

        let mut state = self.acquire(query, &mut streak, &mut stats).await;

        let stop_reason = loop {
            state = match state {
                HarvestState::Running(mut handle) => {
                    if self.shutdown.is_requested() {
                        HarvestState::Done(StopReason::ShutdownRequested)
                    } else {
                        let pulled = tokio::select! {
                            biased;
                            pulled = handle.next() => Some(pulled),
                            _ = self.shutdown.requested() => None,
                        };
                        match pulled {
                            Some(Ok(Some(raw))) => {
                                if let Some(record) = self.admit(raw, &mut dedup, &mut stats) {
                                    streak.note_progress();
                                    accumulator.append(record);
                                    if accumulator.should_flush() {
                                        accumulator.flush()?;
                                    }
                                    if stats.accepted % PROGRESS_LOG_INTERVAL == 0 {
                                        info!(
                                            accepted = stats.accepted,
                                            target = self.config.target_count,
                                            "Collection progress"
                                        );
                                    }
                                }
                                if stats.accepted >= self.config.target_count {
                                    HarvestState::Done(StopReason::TargetReached)
                                } else {
                                    HarvestState::Running(handle)
                                }
                            }
                            Some(Ok(None)) => HarvestState::Done(StopReason::SourceExhausted),
                            Some(Err(e)) => self.on_failure(e, &mut streak, &mut stats),
                            None => {
                                info!("Shutdown requested while waiting on the source");
                                HarvestState::Done(StopReason::ShutdownRequested)
                            }
                        }
                    }
                }
                HarvestState::Retrying { attempt } => {
                    let wait = self.config.backoff(attempt);
                    info!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        wait_ms = whole_millis(wait),
                        "Waiting before reopening source"
                    );
                    if self.shutdown.sleep(wait).await {
                        stats.reacquisitions += 1;
                        self.acquire(query, &mut streak, &mut stats).await
                    } else {
                        HarvestState::Done(StopReason::ShutdownRequested)
                    }
                }
                HarvestState::Exhausted => {
                    error!(
                        max_retries = self.config.max_retries,
                        accepted = stats.accepted,
                        "Source kept failing, giving up with a partial result"
                    );
                    HarvestState::Done(StopReason::RetriesExhausted)
                }
                HarvestState::Done(reason) => break reason,
            };
        };

        accumulator.flush_if_non_empty()?;

        info!(
            reason = %stop_reason,
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            out_of_window = stats.out_of_window,
            malformed = stats.malformed,
            batches = accumulator.written().len(),
            "Collection finished"
        );

        Ok(CollectReport {
            stats,
            stop_reason,
            batches: accumulator.written().to_vec(),
        })
    }

    async fn acquire(
        &self,
        query: &SearchQuery,
        streak: &mut FailureStreak,
        stats: &mut HarvestStats,
    ) -> HarvestState {
        let opened = tokio::select! {
            biased;
            opened = self.source.open(query) => opened,
            _ = self.shutdown.requested() => {
                info!("Shutdown requested while opening the source");
                return HarvestState::Done(StopReason::ShutdownRequested);
            }
        };
        match opened {
            Ok(handle) => {
                debug!(source = self.source.name(), "Source opened");
                HarvestState::Running(handle)
            }
            Err(e) => self.on_failure(e, streak, stats),
        }
    }

    fn on_failure(
        &self,
        err: SourceError,
        streak: &mut FailureStreak,
        stats: &mut HarvestStats,
    ) -> HarvestState {
        stats.transient_failures += 1;
        if self.shutdown.is_requested() {
            info!(error = %err, "Source failed during shutdown, not retrying");
            return HarvestState::Done(StopReason::ShutdownRequested);
        }
        match streak.on_failure(self.config.max_retries) {
            Some(attempt) => {
                warn!(error = %err, attempt = attempt + 1, "Source failed, will reopen");
                HarvestState::Retrying { attempt }
            }
            None => {
                warn!(error = %err, "Source failed with no retries left");
                HarvestState::Exhausted
            }
        }
    }

    /// Malformed, then window, then dedup. Returns the record if it is new.
    fn admit(
        &self,
        raw: RawRecord,
        dedup: &mut DedupIndex,
        stats: &mut HarvestStats,
    ) -> Option<Record> {
        let record = match raw.into_record() {
            Ok(record) => record,
            Err(reason) => {
                stats.malformed += 1;
                debug!(%reason, "Dropping malformed record");
                return None;
            }
        };

        if !self.config.window.contains(record.timestamp, Utc::now()) {
            stats.out_of_window += 1;
            debug!(id = %record.id, timestamp = %record.timestamp, "Outside window");
            return None;
        }

        if !dedup.accept(&record.id) {
            stats.duplicates += 1;
            return None;
        }

        stats.accepted += 1;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sorted_ids, tweet, MemorySink, ScriptedSource, Step};

    fn fast_config(target: usize, batch: usize) -> HarvestConfig {
        HarvestConfig {
            target_count: target,
            batch_size: batch,
            backoff_unit: Duration::from_millis(1),
            ..HarvestConfig::default()
        }
    }

    fn harvester(source: ScriptedSource, config: HarvestConfig) -> Harvester {
        Harvester::new(Arc::new(source), config, ShutdownController::new()).unwrap()
    }

    fn query() -> SearchQuery {
        SearchQuery::last_day(["#nifty50"], Utc::now())
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = HarvestConfig::default();
        let waits: Vec<u64> = (0..5).map(|a| config.backoff(a).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let config = HarvestConfig::default();
        assert!(config.backoff(200) >= config.backoff(30));
    }

    #[test]
    fn oversized_wait_logs_as_max_millis() {
        let config = HarvestConfig {
            backoff_unit: Duration::MAX,
            ..HarvestConfig::default()
        };
        assert_eq!(whole_millis(config.backoff(3)), u64::MAX);
        assert_eq!(whole_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn zero_target_or_batch_is_rejected() {
        let mut config = HarvestConfig::default();
        config.target_count = 0;
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

        let mut config = HarvestConfig::default();
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
    }

    #[test]
    fn streak_allows_max_retries_then_exhausts() {
        let mut streak = FailureStreak::default();
        let attempts: Vec<Option<u32>> = (0..6).map(|_| streak.on_failure(5)).collect();
        assert_eq!(
            attempts,
            vec![Some(0), Some(1), Some(2), Some(3), Some(4), None]
        );
    }

    #[test]
    fn progress_resets_the_streak() {
        let mut streak = FailureStreak::default();
        assert_eq!(streak.on_failure(2), Some(0));
        assert_eq!(streak.on_failure(2), Some(1));
        streak.note_progress();
        assert_eq!(streak.on_failure(2), Some(0));
    }

    #[tokio::test]
    async fn stops_when_target_is_reached() {
        let script = (0..10).map(|i| Step::yield_tweet(&i.to_string())).collect();
        let source = ScriptedSource::new(vec![script]);
        let harvester = harvester(source, fast_config(4, 10));
        let mut acc = BatchAccumulator::new(MemorySink::default(), 10);

        let report = harvester.collect(&query(), &mut acc).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::TargetReached);
        assert_eq!(report.stats.accepted, 4);
        assert_eq!(acc.sink().batches.len(), 1);
        assert_eq!(sorted_ids(&acc.sink().batches[0]), vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn filters_are_counted_separately() {
        let source = ScriptedSource::new(vec![vec![
            Step::yield_tweet("a"),
            Step::yield_tweet("a"),
            Step::Yield(tweet("old", 25 * 60).into()),
            Step::Yield(RawRecord {
                id: None,
                ..RawRecord::from(tweet("x", 1))
            }),
            Step::yield_tweet("b"),
        ]]);
        let harvester = harvester(source, fast_config(100, 10));
        let mut acc = BatchAccumulator::new(MemorySink::default(), 10);

        let report = harvester.collect(&query(), &mut acc).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
        assert_eq!(report.stats.accepted, 2);
        assert_eq!(report.stats.duplicates, 1);
        assert_eq!(report.stats.out_of_window, 1);
        assert_eq!(report.stats.malformed, 1);
    }

    #[tokio::test]
    async fn failed_initial_open_is_retried() {
        let source = ScriptedSource::new(vec![vec![Step::yield_tweet("a")]]).failing_opens(1);
        let harvester = harvester(source, fast_config(100, 10));
        let mut acc = BatchAccumulator::new(MemorySink::default(), 10);

        let report = harvester.collect(&query(), &mut acc).await.unwrap();
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
        assert_eq!(report.stats.transient_failures, 1);
        assert_eq!(report.stats.reacquisitions, 1);
        assert_eq!(report.stats.accepted, 1);
    }

    #[tokio::test]
    async fn progress_between_failures_keeps_retrying() {
        // Every handle yields one new record then fails; with progress each
        // time the streak never grows past one.
        let scripts = (0..8)
            .map(|i| vec![Step::yield_tweet(&i.to_string()), Step::Fail])
            .collect();
        let mut config = fast_config(100, 10);
        config.max_retries = 1;
        let harvester = harvester(ScriptedSource::new(scripts), config);
        let mut acc = BatchAccumulator::new(MemorySink::default(), 10);

        let report = harvester.collect(&query(), &mut acc).await.unwrap();
        assert_eq!(report.stats.accepted, 8);
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
    }
}
