//! Parquet layout and file naming for batch files and consolidated datasets.
//!
//! Every file shares one fixed schema:
//!
//! | column    | type         | nullable |
//! |-----------|--------------|----------|
//! | id        | Utf8         | no       |
//! | username  | Utf8         | yes      |
//! | timestamp | Utf8 (RFC 3339, UTC) | no |
//! | content   | Utf8         | no       |
//! | likes, retweets, replies, quotes | Int64 | no |
//! | hashtags  | List<Utf8>   | no       |
//! | mentions  | List<Utf8>   | no       |
//! | language  | Utf8         | yes      |
//!
//! Files are written to a `.tmp` sibling, synced, then linked into place,
//! so a reader never observes a half-written file and an existing file is
//! never replaced.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Int64Array, ListArray, ListBuilder, RecordBatch, StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use chrono::{DateTime, SecondsFormat, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use stocktalk_common::{Record, RecordId, TweetPayload};

use crate::error::StorageError;

pub const BATCH_FILE_PREFIX: &str = "tweets_batch_";
pub const DATASET_FILE_PREFIX: &str = "stock_tweets_";
const PARQUET_SUFFIX: &str = ".parquet";

// --- File naming ---

/// A flushed batch on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub sequence: u64,
    pub path: PathBuf,
}

/// `tweets_batch_000007_20240301121500.parquet`. The zero-padded sequence
/// keeps lexicographic order equal to creation order.
pub fn batch_file_name(sequence: u64, flushed_at: DateTime<Utc>) -> String {
    format!(
        "{BATCH_FILE_PREFIX}{sequence:06}_{}{PARQUET_SUFFIX}",
        flushed_at.format("%Y%m%d%H%M%S")
    )
}

/// Sequence number encoded in a batch file name, if it is one.
pub fn parse_batch_sequence(file_name: &str) -> Option<u64> {
    let stem = file_name
        .strip_prefix(BATCH_FILE_PREFIX)?
        .strip_suffix(PARQUET_SUFFIX)?;
    let (sequence, flushed_at) = stem.split_once('_')?;
    if flushed_at.len() != 14 || !flushed_at.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    sequence.parse().ok()
}

/// `stock_tweets_20240301T121500123Z.parquet`, to the millisecond.
pub fn dataset_file_name(completed_at: DateTime<Utc>) -> String {
    format!(
        "{DATASET_FILE_PREFIX}{}{PARQUET_SUFFIX}",
        completed_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

/// All batch files in `dir`, ordered by sequence number. A missing directory
/// has no batch files.
pub fn discover_batch_files(dir: &Path) -> Result<Vec<BatchFile>, StorageError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(sequence) = name.to_str().and_then(parse_batch_sequence) {
            files.push(BatchFile {
                sequence,
                path: entry.path(),
            });
        }
    }
    files.sort_by_key(|f| f.sequence);
    Ok(files)
}

// --- Schema ---

pub fn record_schema() -> SchemaRef {
    let string_list = DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("username", DataType::Utf8, true),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("likes", DataType::Int64, false),
        Field::new("retweets", DataType::Int64, false),
        Field::new("replies", DataType::Int64, false),
        Field::new("quotes", DataType::Int64, false),
        Field::new("hashtags", string_list.clone(), false),
        Field::new("mentions", string_list, false),
        Field::new("language", DataType::Utf8, true),
    ]))
}

pub fn records_to_record_batch(
    records: &[Record],
    schema: SchemaRef,
) -> Result<RecordBatch, arrow::error::ArrowError> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut usernames: Vec<Option<&str>> = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut likes = Vec::with_capacity(len);
    let mut retweets = Vec::with_capacity(len);
    let mut replies = Vec::with_capacity(len);
    let mut quotes = Vec::with_capacity(len);
    let mut hashtags = ListBuilder::new(StringBuilder::new());
    let mut mentions = ListBuilder::new(StringBuilder::new());
    let mut languages: Vec<Option<&str>> = Vec::with_capacity(len);

    for record in records {
        let p = &record.payload;
        ids.push(record.id.as_str());
        usernames.push(p.username.as_deref());
        timestamps.push(
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
        contents.push(p.content.as_str());
        likes.push(p.likes);
        retweets.push(p.retweets);
        replies.push(p.replies);
        quotes.push(p.quotes);
        for tag in &p.hashtags {
            hashtags.values().append_value(tag);
        }
        hashtags.append(true);
        for mention in &p.mentions {
            mentions.values().append_value(mention);
        }
        mentions.append(true);
        languages.push(p.language.as_deref());
    }

    // Must match record_schema() field order
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(usernames)),
        Arc::new(StringArray::from(timestamps)),
        Arc::new(StringArray::from(contents)),
        Arc::new(Int64Array::from(likes)),
        Arc::new(Int64Array::from(retweets)),
        Arc::new(Int64Array::from(replies)),
        Arc::new(Int64Array::from(quotes)),
        Arc::new(hashtags.finish()),
        Arc::new(mentions.finish()),
        Arc::new(StringArray::from(languages)),
    ];

    RecordBatch::try_new(schema, columns)
}

fn record_batch_to_records(batch: &RecordBatch, path: &Path) -> Result<Vec<Record>, StorageError> {
    let ids = column::<StringArray>(batch, "id", path)?;
    let usernames = column::<StringArray>(batch, "username", path)?;
    let timestamps = column::<StringArray>(batch, "timestamp", path)?;
    let contents = column::<StringArray>(batch, "content", path)?;
    let likes = column::<Int64Array>(batch, "likes", path)?;
    let retweets = column::<Int64Array>(batch, "retweets", path)?;
    let replies = column::<Int64Array>(batch, "replies", path)?;
    let quotes = column::<Int64Array>(batch, "quotes", path)?;
    let hashtags = column::<ListArray>(batch, "hashtags", path)?;
    let mentions = column::<ListArray>(batch, "mentions", path)?;
    let languages = column::<StringArray>(batch, "language", path)?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let raw_timestamp = timestamps.value(row);
        let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
            .map_err(|e| schema_error(path, format!("bad timestamp {raw_timestamp:?}: {e}")))?
            .with_timezone(&Utc);

        records.push(Record {
            id: RecordId::new(ids.value(row)),
            timestamp,
            payload: TweetPayload {
                username: optional_string(usernames, row),
                content: contents.value(row).to_string(),
                likes: likes.value(row),
                retweets: retweets.value(row),
                replies: replies.value(row),
                quotes: quotes.value(row),
                hashtags: string_list(hashtags, row, "hashtags", path)?,
                mentions: string_list(mentions, row, "mentions", path)?,
                language: optional_string(languages, row),
            },
        });
    }
    Ok(records)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a T, StorageError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .ok_or_else(|| schema_error(path, format!("missing or mistyped column `{name}`")))
}

fn optional_string(col: &StringArray, row: usize) -> Option<String> {
    col.is_valid(row).then(|| col.value(row).to_string())
}

fn string_list(
    col: &ListArray,
    row: usize,
    name: &str,
    path: &Path,
) -> Result<Vec<String>, StorageError> {
    if col.is_null(row) {
        return Ok(Vec::new());
    }
    let values = col.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| schema_error(path, format!("`{name}` items are not strings")))?;
    Ok(strings.iter().flatten().map(str::to_string).collect())
}

fn schema_error(path: &Path, reason: String) -> StorageError {
    StorageError::Schema {
        path: path.to_path_buf(),
        reason,
    }
}

// --- Read / write ---

/// Write `records` to a new file at `path`. Fails with
/// [`StorageError::AlreadyExists`] rather than replacing an existing file.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), StorageError> {
    if path.exists() {
        return Err(StorageError::AlreadyExists(path.to_path_buf()));
    }

    let tmp_path = path.with_extension("parquet.tmp");
    if let Err(e) = write_parquet(&tmp_path, records) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    publish(&tmp_path, path)
}

/// Move a finished temp file to `path`. A hard link fails if the target
/// already exists, where a rename would silently replace it. The temp file
/// is removed either way.
fn publish(tmp_path: &Path, path: &Path) -> Result<(), StorageError> {
    let linked = fs::hard_link(tmp_path, path);
    let _ = fs::remove_file(tmp_path);
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(StorageError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn write_parquet(path: &Path, records: &[Record]) -> Result<(), StorageError> {
    let schema = record_schema();
    let batch = records_to_record_batch(records, Arc::clone(&schema))?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    let file = writer.into_inner()?;
    file.sync_all()?;
    Ok(())
}

/// Read every record from a batch or dataset file.
pub fn read_records(path: &Path) -> Result<Vec<Record>, StorageError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        records.extend(record_batch_to_records(&batch?, path)?);
    }
    Ok(records)
}
