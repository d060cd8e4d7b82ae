// Search query construction: hashtags OR'ed together, restricted by a
// since-date, optionally excluding retweets.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    hashtags: Vec<String>,
    since: NaiveDate,
    exclude_retweets: bool,
}

impl SearchQuery {
    /// Hashtags are normalized to exactly one leading `#`; blanks are dropped.
    pub fn new<I, T>(hashtags: I, since: NaiveDate) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let hashtags = hashtags
            .into_iter()
            .map(|tag| tag.as_ref().trim().trim_start_matches('#').to_string())
            .filter(|tag| !tag.is_empty())
            .map(|tag| format!("#{tag}"))
            .collect();
        Self {
            hashtags,
            since,
            exclude_retweets: true,
        }
    }

    /// Query covering the day before `now`.
    pub fn last_day<I, T>(hashtags: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self::new(hashtags, (now - TimeDelta::days(1)).date_naive())
    }

    pub fn including_retweets(mut self) -> Self {
        self.exclude_retweets = false;
        self
    }

    pub fn hashtags(&self) -> &[String] {
        &self.hashtags
    }

    pub fn since(&self) -> NaiveDate {
        self.since
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since:{}",
            self.hashtags.join(" OR "),
            self.since.format("%Y-%m-%d")
        )?;
        if self.exclude_retweets {
            write!(f, " -filter:retweets")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_or_query_with_since_and_retweet_filter() {
        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let query = SearchQuery::new(["#nifty50", "sensex"], since);
        assert_eq!(
            query.to_string(),
            "#nifty50 OR #sensex since:2024-03-01 -filter:retweets"
        );
    }

    #[test]
    fn hashtags_are_normalized() {
        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let query = SearchQuery::new(["##intraday", "  ", " banknifty "], since);
        assert_eq!(query.hashtags(), ["#intraday", "#banknifty"]);
    }

    #[test]
    fn last_day_uses_previous_utc_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 30, 0).unwrap();
        let query = SearchQuery::last_day(["#sensex"], now);
        assert_eq!(query.since(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn retweets_can_be_included() {
        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let query = SearchQuery::new(["#sensex"], since).including_retweets();
        assert_eq!(query.to_string(), "#sensex since:2024-03-01");
    }
}
