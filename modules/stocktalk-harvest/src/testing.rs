//! Test doubles: scripted sources and in-memory sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use stocktalk_common::{RawRecord, Record, TweetPayload};

use crate::batch::BatchSink;
use crate::error::StorageError;
use crate::query::SearchQuery;
use crate::shutdown::ShutdownController;
use crate::source::{RecordSource, SourceError, SourceHandle};
use crate::storage::BatchFile;

/// A well-formed tweet record timestamped `minutes_ago` before now.
pub fn tweet(id: &str, minutes_ago: i64) -> Record {
    Record::new(
        id,
        Utc::now() - TimeDelta::minutes(minutes_ago),
        TweetPayload {
            username: Some("tester".to_string()),
            content: format!("tweet {id} #nifty50"),
            hashtags: vec!["nifty50".to_string()],
            language: Some("en".to_string()),
            ..TweetPayload::default()
        },
    )
}

pub fn sorted_ids(records: &[Record]) -> Vec<String> {
    let mut ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
    ids.sort();
    ids
}

/// Keeps every flushed batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub batches: Vec<Vec<Record>>,
}

impl BatchSink for MemorySink {
    fn write_batch(&mut self, records: &[Record]) -> Result<BatchFile, StorageError> {
        self.batches.push(records.to_vec());
        let sequence = self.batches.len() as u64;
        Ok(BatchFile {
            sequence,
            path: format!("memory/batch_{sequence}").into(),
        })
    }
}

/// Every write fails, as if the disk were full.
#[derive(Debug, Default)]
pub struct FailingSink;

impl BatchSink for FailingSink {
    fn write_batch(&mut self, _records: &[Record]) -> Result<BatchFile, StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }
}

/// One item a scripted handle produces.
#[derive(Debug, Clone)]
pub enum Step {
    Yield(RawRecord),
    Fail,
    /// Never resolves, like an upstream call that stopped responding.
    Hang,
}

impl Step {
    /// A fresh, well-formed tweet with the given id.
    pub fn yield_tweet(id: &str) -> Self {
        Step::Yield(tweet(id, 1).into())
    }
}

/// Each `open` plays the next script. Once the scripts run out, opens return
/// an empty handle, fail if `then_always_fail` was set, or never resolve if
/// `then_hang_on_open` was set.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    failing_opens: AtomicUsize,
    always_fail_after_scripts: bool,
    hang_after_scripts: bool,
    opens: AtomicUsize,
    yielded: Arc<AtomicUsize>,
    shutdown_after: Option<(usize, ShutdownController)>,
    shutdown_on_fail: Option<ShutdownController>,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            failing_opens: AtomicUsize::new(0),
            always_fail_after_scripts: false,
            hang_after_scripts: false,
            opens: AtomicUsize::new(0),
            yielded: Arc::new(AtomicUsize::new(0)),
            shutdown_after: None,
            shutdown_on_fail: None,
        }
    }

    /// The first `n` opens fail without consuming a script.
    pub fn failing_opens(self, n: usize) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    pub fn then_always_fail(mut self) -> Self {
        self.always_fail_after_scripts = true;
        self
    }

    pub fn then_hang_on_open(mut self) -> Self {
        self.hang_after_scripts = true;
        self
    }

    /// Request shutdown right after the `n`th record is yielded, counted
    /// across all handles.
    pub fn request_shutdown_after(mut self, n: usize, controller: ShutdownController) -> Self {
        self.shutdown_after = Some((n, controller));
        self
    }

    /// Request shutdown just before any scripted failure is returned, so the
    /// failure arrives with the flag already set.
    pub fn request_shutdown_on_failure(mut self, controller: ShutdownController) -> Self {
        self.shutdown_on_fail = Some(controller);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn open(&self, _query: &SearchQuery) -> Result<Box<dyn SourceHandle>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let remaining_failures = self.failing_opens.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.failing_opens.store(remaining_failures - 1, Ordering::SeqCst);
            return Err(SourceError::Transient("scripted open failure".to_string()));
        }

        let script = self
            .scripts
            .lock()
            .map_err(|_| SourceError::Transient("script lock poisoned".to_string()))?
            .pop_front();
        let steps = match script {
            Some(steps) => steps,
            None if self.hang_after_scripts => std::future::pending().await,
            None if self.always_fail_after_scripts => {
                return Err(SourceError::Transient("source is down".to_string()));
            }
            None => Vec::new(),
        };

        Ok(Box::new(ScriptedHandle {
            steps: steps.into(),
            yielded: Arc::clone(&self.yielded),
            shutdown_after: self.shutdown_after.clone(),
            shutdown_on_fail: self.shutdown_on_fail.clone(),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedHandle {
    steps: VecDeque<Step>,
    yielded: Arc<AtomicUsize>,
    shutdown_after: Option<(usize, ShutdownController)>,
    shutdown_on_fail: Option<ShutdownController>,
}

#[async_trait]
impl SourceHandle for ScriptedHandle {
    async fn next(&mut self) -> Result<Option<RawRecord>, SourceError> {
        match self.steps.pop_front() {
            Some(Step::Yield(raw)) => {
                let count = self.yielded.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some((n, controller)) = &self.shutdown_after {
                    if count >= *n {
                        controller.request_shutdown();
                    }
                }
                Ok(Some(raw))
            }
            Some(Step::Fail) => {
                if let Some(controller) = &self.shutdown_on_fail {
                    controller.request_shutdown();
                }
                Err(SourceError::Transient("scripted failure".to_string()))
            }
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(None),
        }
    }
}
