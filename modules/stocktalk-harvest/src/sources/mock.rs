// Synthetic tweet source for offline runs and demos.
//
// Each handle replays the same seeded sequence from the start, so a reopen
// after a failure re-yields ids the harvester has already accepted.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use stocktalk_common::{RawRecord, TweetPayload};

use crate::analysis::{NEGATIVE_WORDS, POSITIVE_WORDS};
use crate::query::SearchQuery;
use crate::source::{RecordSource, SourceError, SourceHandle};

const MOCK_ID_BASE: u64 = 1_790_000_000_000_000_000;
const FALLBACK_TAG: &str = "stockmarket";

pub struct MockTweetSource {
    limit: usize,
    seed: u64,
    fail_after: Option<usize>,
    opens: AtomicUsize,
}

impl MockTweetSource {
    /// `limit` records per handle, randomly seeded.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            seed: rand::random(),
            fail_after: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Make the first handle raise a transient failure after `records` items.
    pub fn failing_after(mut self, records: usize) -> Self {
        self.fail_after = Some(records);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for MockTweetSource {
    async fn open(&self, query: &SearchQuery) -> Result<Box<dyn SourceHandle>, SourceError> {
        let pass = self.opens.fetch_add(1, Ordering::SeqCst);
        info!(pass, limit = self.limit, seed = self.seed, "Generating mock tweets");

        let mut tags: Vec<String> = query
            .hashtags()
            .iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .collect();
        if tags.is_empty() {
            tags.push(FALLBACK_TAG.to_string());
        }

        Ok(Box::new(MockHandle {
            rng: StdRng::seed_from_u64(self.seed),
            position: 0,
            limit: self.limit,
            fail_at: if pass == 0 { self.fail_after } else { None },
            tags,
            anchor: Utc::now(),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockHandle {
    rng: StdRng,
    position: usize,
    limit: usize,
    fail_at: Option<usize>,
    tags: Vec<String>,
    anchor: DateTime<Utc>,
}

impl MockHandle {
    fn generate(&mut self) -> RawRecord {
        let tag_index = self.rng.random_range(0..self.tags.len());
        let tag = self.tags[tag_index].clone();
        let age = TimeDelta::minutes(self.rng.random_range(0..24 * 60));

        let content = match self.rng.random_range(0..3) {
            0 => format!(
                "This is a mock tweet about #{tag}. I am feeling very {} about this! #stockmarket #{tag}",
                pick(&mut self.rng, POSITIVE_WORDS)
            ),
            1 => format!(
                "This is a mock tweet about #{tag}. I am feeling very {} about this! #stockmarket #{tag}",
                pick(&mut self.rng, NEGATIVE_WORDS)
            ),
            _ => format!("This is a mock tweet about #{tag}. #stockmarket #{tag}"),
        };

        RawRecord {
            id: Some((MOCK_ID_BASE + self.position as u64).to_string()),
            timestamp: Some(self.anchor - age),
            payload: TweetPayload {
                username: Some(format!("user_{}", self.rng.random_range(1..=1000))),
                content,
                likes: self.rng.random_range(0..=1000),
                retweets: self.rng.random_range(0..=500),
                replies: self.rng.random_range(0..=100),
                quotes: self.rng.random_range(0..=50),
                hashtags: vec![FALLBACK_TAG.to_string(), tag],
                mentions: vec![format!("expert_{}", self.rng.random_range(1..=10))],
                language: Some("en".to_string()),
            },
        }
    }
}

fn pick<'a>(rng: &mut StdRng, words: &[&'a str]) -> &'a str {
    words[rng.random_range(0..words.len())]
}

#[async_trait]
impl SourceHandle for MockHandle {
    async fn next(&mut self) -> Result<Option<RawRecord>, SourceError> {
        if self.fail_at == Some(self.position) {
            self.fail_at = None;
            return Err(SourceError::Transient(format!(
                "injected failure after {} records",
                self.position
            )));
        }
        if self.position >= self.limit {
            return Ok(None);
        }
        let raw = self.generate();
        self.position += 1;
        Ok(Some(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::RecencyWindow;

    fn query() -> SearchQuery {
        SearchQuery::last_day(["#nifty50", "#sensex"], Utc::now())
    }

    async fn drain(handle: &mut Box<dyn SourceHandle>) -> Vec<RawRecord> {
        let mut out = Vec::new();
        while let Ok(Some(raw)) = handle.next().await {
            out.push(raw);
        }
        out
    }

    #[tokio::test]
    async fn yields_limit_records_then_ends() {
        let source = MockTweetSource::new(25).with_seed(7);
        let mut handle = source.open(&query()).await.unwrap();
        assert_eq!(drain(&mut handle).await.len(), 25);
        assert!(handle.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_are_well_formed_and_recent() {
        let source = MockTweetSource::new(50).with_seed(7);
        let mut handle = source.open(&query()).await.unwrap();
        let window = RecencyWindow::default();
        for raw in drain(&mut handle).await {
            let record = raw.into_record().unwrap();
            assert!(window.contains(record.timestamp, Utc::now()));
            assert_eq!(record.payload.hashtags[0], "stockmarket");
            assert!(["nifty50", "sensex"].contains(&record.payload.hashtags[1].as_str()));
        }
    }

    #[tokio::test]
    async fn reopening_replays_the_same_ids() {
        let source = MockTweetSource::new(10).with_seed(11);
        let mut first = source.open(&query()).await.unwrap();
        let mut second = source.open(&query()).await.unwrap();

        let ids = |rs: Vec<RawRecord>| rs.into_iter().map(|r| r.id.unwrap()).collect::<Vec<_>>();
        assert_eq!(ids(drain(&mut first).await), ids(drain(&mut second).await));
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_first_handle() {
        let source = MockTweetSource::new(10).with_seed(3).failing_after(4);

        let mut first = source.open(&query()).await.unwrap();
        for _ in 0..4 {
            assert!(first.next().await.unwrap().is_some());
        }
        assert!(matches!(first.next().await, Err(SourceError::Transient(_))));

        let mut second = source.open(&query()).await.unwrap();
        assert_eq!(drain(&mut second).await.len(), 10);
    }
}
