use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Twitter's legacy `created_at` layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
}

/// Input for X/Twitter keyword search via apidojo/tweet-scraper.
#[derive(Debug, Clone, Serialize)]
pub struct TweetSearchInput {
    #[serde(rename = "searchTerms")]
    pub search_terms: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
    pub sort: String,
}

/// Author info nested inside a Tweet.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashtagEntity {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MentionEntity {
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub hashtags: Vec<HashtagEntity>,
    #[serde(default)]
    pub user_mentions: Vec<MentionEntity>,
}

/// A single tweet from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "fullText", alias = "full_text")]
    pub full_text: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: Option<String>,
    pub author: Option<TweetAuthor>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<i64>,
    #[serde(rename = "retweetCount")]
    pub retweet_count: Option<i64>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<i64>,
    #[serde(rename = "quoteCount")]
    pub quote_count: Option<i64>,
    pub lang: Option<String>,
    pub entities: Option<TweetEntities>,
}

impl Tweet {
    /// Returns whichever text field is populated, preferring `full_text`.
    pub fn content(&self) -> Option<&str> {
        self.full_text.as_deref().or(self.text.as_deref())
    }

    /// Parse `created_at`, accepting both Twitter's legacy layout and RFC 3339.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_str(raw, TWITTER_DATE_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    pub fn hashtags(&self) -> Vec<String> {
        self.entities
            .as_ref()
            .map(|e| e.hashtags.iter().map(|h| h.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn mentions(&self) -> Vec<String> {
        self.entities
            .as_ref()
            .map(|e| e.user_mentions.iter().map(|m| m.screen_name.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Tweet {
        serde_json::from_value(serde_json::json!({
            "id": "1790000000000000001",
            "text": "short",
            "fullText": "Nifty rally continues #nifty50 @expert_3",
            "createdAt": "Wed Oct 10 20:19:24 +0000 2018",
            "author": { "userName": "trader_1", "name": "Trader One" },
            "likeCount": 12,
            "retweetCount": 3,
            "replyCount": 1,
            "quoteCount": 0,
            "lang": "en",
            "entities": {
                "hashtags": [{ "text": "nifty50" }],
                "user_mentions": [{ "screen_name": "expert_3" }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn content_prefers_full_text() {
        assert_eq!(
            sample().content(),
            Some("Nifty rally continues #nifty50 @expert_3")
        );
    }

    #[test]
    fn parses_legacy_twitter_date() {
        let expected = Utc.with_ymd_and_hms(2018, 10, 10, 20, 19, 24).unwrap();
        assert_eq!(sample().created_at_utc(), Some(expected));
    }

    #[test]
    fn parses_rfc3339_date() {
        let mut tweet = sample();
        tweet.created_at = Some("2024-03-01T09:15:00Z".to_string());
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        assert_eq!(tweet.created_at_utc(), Some(expected));
    }

    #[test]
    fn garbage_date_is_none() {
        let mut tweet = sample();
        tweet.created_at = Some("yesterday-ish".to_string());
        assert!(tweet.created_at_utc().is_none());
    }

    #[test]
    fn entities_flatten_to_strings() {
        let tweet = sample();
        assert_eq!(tweet.hashtags(), vec!["nifty50".to_string()]);
        assert_eq!(tweet.mentions(), vec!["expert_3".to_string()]);
    }

    #[test]
    fn missing_entities_yield_empty_lists() {
        let tweet: Tweet = serde_json::from_value(serde_json::json!({ "id": "1" })).unwrap();
        assert!(tweet.hashtags().is_empty());
        assert!(tweet.mentions().is_empty());
        assert!(tweet.content().is_none());
    }

    #[test]
    fn search_input_uses_actor_field_names() {
        let input = TweetSearchInput {
            search_terms: vec!["#sensex since:2024-03-01".to_string()],
            max_items: 50,
            sort: "Latest".to_string(),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["searchTerms"][0], "#sensex since:2024-03-01");
        assert_eq!(json["maxItems"], 50);
        assert_eq!(json["sort"], "Latest");
    }
}
