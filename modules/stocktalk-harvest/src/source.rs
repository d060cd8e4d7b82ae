// The record-source contract the harvest loop consumes.
//
// RecordSource hands out fresh SourceHandles; a handle is a single lazy pass
// over the upstream results and is never resumed after it fails. Each call
// to `next` is one of three outcomes:
//   Ok(Some(raw))  a record
//   Ok(None)       end of stream
//   Err(_)         transient failure; reopen to continue

use async_trait::async_trait;

use stocktalk_common::RawRecord;

use crate::query::SearchQuery;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Transient source failure: {0}")]
    Transient(String),
}

impl From<apify_client::ApifyError> for SourceError {
    fn from(err: apify_client::ApifyError) -> Self {
        SourceError::Transient(err.to_string())
    }
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Start a fresh pass over the results for `query`.
    async fn open(&self, query: &SearchQuery) -> Result<Box<dyn SourceHandle>, SourceError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait SourceHandle: Send {
    async fn next(&mut self) -> Result<Option<RawRecord>, SourceError>;
}
