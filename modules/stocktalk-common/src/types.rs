use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::MalformedRecord;

// --- Identity ---

/// Stable, opaque identifier of one logical post. Equality on this is the
/// only notion of "same item" the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// --- Payload ---

/// Everything about a post besides its identity and time. Passed through
/// the harvest pipeline untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TweetPayload {
    pub username: Option<String>,
    pub content: String,
    pub likes: i64,
    pub retweets: i64,
    pub replies: i64,
    pub quotes: i64,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub language: Option<String>,
}

// --- Records ---

/// A validated, immutable post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub payload: TweetPayload,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, timestamp: DateTime<Utc>, payload: TweetPayload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }
}

/// A post as a source hands it over, before identity and time are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: TweetPayload,
}

impl RawRecord {
    /// Validate identity and timestamp. Blank ids count as missing.
    pub fn into_record(self) -> Result<Record, MalformedRecord> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or(MalformedRecord::MissingId)?;
        let timestamp = self.timestamp.ok_or(MalformedRecord::MissingTimestamp)?;
        Ok(Record {
            id: RecordId(id),
            timestamp,
            payload: self.payload,
        })
    }
}

impl From<Record> for RawRecord {
    fn from(record: Record) -> Self {
        Self {
            id: Some(record.id.0),
            timestamp: Some(record.timestamp),
            payload: record.payload,
        }
    }
}
