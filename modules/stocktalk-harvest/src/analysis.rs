//! Keyword sentiment over harvested posts.
//!
//! A post scores +1 for every positive keyword it contains and -1 for every
//! negative one, matched as substrings of the normalized text.

use std::fmt;

use stocktalk_common::Record;

pub const POSITIVE_WORDS: &[&str] = &["buy", "bullish", "profit", "up", "high", "rally"];
pub const NEGATIVE_WORDS: &[&str] = &["sell", "bearish", "loss", "down", "low", "crash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Lowercase and drop anything outside ASCII.
pub fn normalize_content(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn score_sentiment(text: &str) -> Sentiment {
    let text = normalize_content(text);
    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SentimentSummary {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentSummary {
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match score_sentiment(&record.payload.content) {
                Sentiment::Positive => summary.positive += 1,
                Sentiment::Negative => summary.negative += 1,
                Sentiment::Neutral => summary.neutral += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }
}

impl fmt::Display for SentimentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total().max(1) as f64;
        writeln!(f, "\n=== Sentiment Distribution ===")?;
        for (label, count) in [
            (Sentiment::Positive, self.positive),
            (Sentiment::Negative, self.negative),
            (Sentiment::Neutral, self.neutral),
        ] {
            writeln!(
                f,
                "{:<9} {:>6} ({:.0}%)",
                format!("{label}:"),
                count,
                count as f64 / total * 100.0
            )?;
        }
        write!(f, "Total:    {:>6}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stocktalk_common::TweetPayload;

    fn post(content: &str) -> Record {
        Record::new(
            "1",
            Utc::now(),
            TweetPayload {
                content: content.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn normalization_lowercases_and_strips_non_ascii() {
        assert_eq!(normalize_content("Nifty ₹ RALLY 🚀"), "nifty  rally ");
    }

    #[test]
    fn scores_by_keyword_balance() {
        assert_eq!(score_sentiment("Feeling BULLISH, time to buy"), Sentiment::Positive);
        assert_eq!(score_sentiment("market crash, sell everything"), Sentiment::Negative);
        assert_eq!(score_sentiment("buy the dip or sell the rip"), Sentiment::Neutral);
        assert_eq!(score_sentiment("sensex opens flat"), Sentiment::Neutral);
    }

    #[test]
    fn matching_is_by_substring() {
        // "support" contains "up"
        assert_eq!(score_sentiment("strong support zone"), Sentiment::Positive);
    }

    #[test]
    fn summary_counts_each_class() {
        let records = vec![
            post("bullish rally"),
            post("bearish"),
            post("nothing to see"),
            post("profit booking"),
        ];
        let summary = SentimentSummary::from_records(&records);
        assert_eq!(
            summary,
            SentimentSummary {
                positive: 2,
                negative: 1,
                neutral: 1
            }
        );
        assert_eq!(summary.total(), 4);
        assert!(summary.to_string().contains("positive:"));
    }
}
