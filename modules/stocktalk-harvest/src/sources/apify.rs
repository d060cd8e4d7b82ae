// Live X/Twitter source backed by the Apify tweet-search actor.
//
// Opening a handle starts a new actor run for the query and waits for it;
// the handle then pages through the run's dataset on demand.

use std::collections::VecDeque;
use std::sync::Arc;

use apify_client::{ApifyClient, Tweet};
use async_trait::async_trait;
use tracing::{info, warn};

use stocktalk_common::{RawRecord, TweetPayload};

use crate::query::SearchQuery;
use crate::source::{RecordSource, SourceError, SourceHandle};

const DEFAULT_PAGE_SIZE: usize = 100;

pub struct ApifyTweetSource {
    client: Arc<ApifyClient>,
    max_items: u32,
    page_size: usize,
}

impl ApifyTweetSource {
    pub fn new(client: ApifyClient, max_items: u32) -> Self {
        Self {
            client: Arc::new(client),
            max_items,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl RecordSource for ApifyTweetSource {
    async fn open(&self, query: &SearchQuery) -> Result<Box<dyn SourceHandle>, SourceError> {
        let terms = vec![query.to_string()];
        let run = self
            .client
            .start_tweet_search(&terms, self.max_items)
            .await?;
        let completed = self.client.wait_for_run(&run.id).await?;
        info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Tweet search run completed, streaming dataset"
        );

        Ok(Box::new(ApifyHandle {
            client: Arc::clone(&self.client),
            dataset_id: completed.default_dataset_id,
            offset: 0,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn name(&self) -> &str {
        "apify"
    }
}

struct ApifyHandle {
    client: Arc<ApifyClient>,
    dataset_id: String,
    offset: usize,
    page_size: usize,
    buffer: VecDeque<Tweet>,
    exhausted: bool,
}

#[async_trait]
impl SourceHandle for ApifyHandle {
    async fn next(&mut self) -> Result<Option<RawRecord>, SourceError> {
        if self.buffer.is_empty() && !self.exhausted {
            let page: Vec<Tweet> = self
                .client
                .get_dataset_page(&self.dataset_id, self.offset, self.page_size)
                .await
                .inspect_err(|e| warn!(dataset_id = %self.dataset_id, offset = self.offset, error = %e, "Dataset page fetch failed"))?;
            self.offset += page.len();
            self.exhausted = page.len() < self.page_size;
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front().map(tweet_to_raw))
    }
}

/// Map an Apify tweet onto the pipeline's raw record. Missing id or an
/// unparseable date is left for the harvester to reject.
pub fn tweet_to_raw(tweet: Tweet) -> RawRecord {
    let timestamp = tweet.created_at_utc();
    let hashtags = tweet.hashtags();
    let mentions = tweet.mentions();
    let content = tweet.content().unwrap_or_default().to_string();

    RawRecord {
        id: tweet.id,
        timestamp,
        payload: TweetPayload {
            username: tweet.author.and_then(|a| a.user_name),
            content,
            likes: tweet.like_count.unwrap_or(0),
            retweets: tweet.retweet_count.unwrap_or(0),
            replies: tweet.reply_count.unwrap_or(0),
            quotes: tweet.quote_count.unwrap_or(0),
            hashtags,
            mentions,
            language: tweet.lang,
        },
    }
}
